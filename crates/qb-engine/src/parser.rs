use crate::error::{QbError, QbResult};
use crate::expr::{BinaryOp, Expr, Function, UnaryOp};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    String(String),
    True,
    False,
    Null,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
        }
    }

    fn error(&self, message: impl Into<String>) -> QbError {
        QbError::compile(self.input, message)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn consume_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buf.push(ch);
            self.bump();
        }
        buf
    }

    fn next_token(&mut self) -> QbResult<Token> {
        self.consume_while(char::is_whitespace);
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        let single = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '?' => Some(Token::Question),
            ':' => Some(Token::Colon),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            return Ok(token);
        }

        match ch {
            '=' => {
                self.bump();
                // `=` and `==` both mean equality.
                self.eat('=');
                Ok(Token::Equals)
            }
            '!' => {
                self.bump();
                if self.eat('=') {
                    Ok(Token::NotEquals)
                } else {
                    Ok(Token::Bang)
                }
            }
            '<' => {
                self.bump();
                if self.eat('=') {
                    Ok(Token::LessEquals)
                } else if self.eat('>') {
                    Ok(Token::NotEquals)
                } else {
                    Ok(Token::Less)
                }
            }
            '>' => {
                self.bump();
                if self.eat('=') {
                    Ok(Token::GreaterEquals)
                } else {
                    Ok(Token::Greater)
                }
            }
            '&' => {
                self.bump();
                if self.eat('&') {
                    Ok(Token::AndAnd)
                } else {
                    Err(self.error("unexpected character '&'"))
                }
            }
            '|' => {
                self.bump();
                if self.eat('|') {
                    Ok(Token::OrOr)
                } else {
                    Err(self.error("unexpected character '|'"))
                }
            }
            '"' | '\'' => {
                let quote = ch;
                self.bump();
                let mut out = String::new();
                loop {
                    match self.bump() {
                        None => return Err(self.error("unterminated string")),
                        Some('\\') => match self.bump() {
                            Some('n') => out.push('\n'),
                            Some('t') => out.push('\t'),
                            Some(c) => out.push(c),
                            None => return Err(self.error("unterminated string")),
                        },
                        Some(c) if c == quote => break,
                        Some(c) => out.push(c),
                    }
                }
                Ok(Token::String(out))
            }
            '.' => {
                self.bump();
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    let digits = self.consume_while(|c| c.is_ascii_digit());
                    self.number(format!("0.{digits}"))
                } else {
                    Ok(Token::Dot)
                }
            }
            c if c.is_ascii_digit() => {
                let num_str = self.consume_while(|c| c.is_ascii_digit() || c == '.');
                self.number(num_str)
            }
            c if is_ident_start(c) => {
                let ident = self.consume_while(is_ident_part);
                if ident.ends_with('.') {
                    return Err(self.error(format!("identifier {ident:?} ends with '.'")));
                }
                Ok(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Identifier(ident),
                })
            }
            other => Err(self.error(format!("unexpected character {other:?}"))),
        }
    }

    fn number(&mut self, mut num_str: String) -> QbResult<Token> {
        // Exponent notation like `1e3` / `1E-3`.
        if matches!(self.peek(), Some('e' | 'E')) {
            num_str.extend(self.bump());
            if matches!(self.peek(), Some('+' | '-')) {
                num_str.extend(self.bump());
            }
            let exp_digits = self.consume_while(|c| c.is_ascii_digit());
            if exp_digits.is_empty() {
                return Err(self.error(format!(
                    "invalid number {num_str:?} (expected exponent digits)"
                )));
            }
            num_str.push_str(&exp_digits);
        }
        let num: f64 = num_str
            .parse()
            .map_err(|_| self.error(format!("invalid number {num_str:?}")))?;
        Ok(Token::Number(num))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    // Dotted paths such as `build.platform` lex as one identifier.
    c.is_alphanumeric() || c == '_' || c == '$' || c == '.'
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> QbResult<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Self { lexer, lookahead })
    }

    fn error(&self, message: impl Into<String>) -> QbError {
        self.lexer.error(message)
    }

    fn bump(&mut self) -> QbResult<Token> {
        let current = std::mem::replace(&mut self.lookahead, Token::Eof);
        self.lookahead = self.lexer.next_token()?;
        Ok(current)
    }

    fn expect(&mut self, token: Token) -> QbResult<()> {
        if self.lookahead == token {
            self.bump()?;
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}, found {:?}", self.lookahead)))
        }
    }

    fn parse(&mut self) -> QbResult<Expr> {
        let expr = self.parse_conditional()?;
        if self.lookahead != Token::Eof {
            return Err(self.error(format!("unexpected token {:?}", self.lookahead)));
        }
        Ok(expr)
    }

    /// `cond ? then : else`, right associative and looser than every binary operator.
    fn parse_conditional(&mut self) -> QbResult<Expr> {
        let cond = self.parse_expr(0)?;
        if self.lookahead != Token::Question {
            return Ok(cond);
        }
        self.bump()?;
        let then = self.parse_conditional()?;
        self.expect(Token::Colon)?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr::When {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Some(Box::new(otherwise)),
        })
    }

    fn parse_expr(&mut self, min_prec: u8) -> QbResult<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some((op, prec)) = self.infix_binding_power() {
            if prec < min_prec {
                break;
            }
            self.bump()?;
            let right = self.parse_expr(prec + 1)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> QbResult<Expr> {
        let expr = match &self.lookahead {
            Token::Minus | Token::Bang => {
                let op = if self.bump()? == Token::Minus {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Not
                };
                let expr = self.parse_expr(7)?;
                return Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(expr),
                });
            }
            Token::Number(n) => {
                let n = *n;
                self.bump()?;
                Expr::Literal(Value::number(n))
            }
            Token::String(s) => {
                let s = s.clone();
                self.bump()?;
                Expr::Literal(Value::from(s))
            }
            Token::True | Token::False | Token::Null => {
                let value = match self.bump()? {
                    Token::True => Value::Boolean(true),
                    Token::False => Value::Boolean(false),
                    _ => Value::Null,
                };
                Expr::Literal(value)
            }
            Token::Identifier(_) => self.parse_ident_like()?,
            Token::LParen => {
                self.bump()?;
                let inner = self.parse_conditional()?;
                self.expect(Token::RParen)?;
                inner
            }
            other => {
                return Err(self.error(format!("unexpected token in expression: {other:?}")))
            }
        };
        self.parse_postfix(expr)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> QbResult<Expr> {
        loop {
            match self.lookahead {
                Token::LBracket => {
                    self.bump()?;
                    let index = self.parse_conditional()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::Dot => {
                    self.bump()?;
                    let Token::Identifier(path) = self.bump()? else {
                        return Err(self.error("expected a field name after '.'"));
                    };
                    for name in path.split('.') {
                        expr = Expr::Member {
                            target: Box::new(expr),
                            name: name.to_string(),
                        };
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_ident_like(&mut self) -> QbResult<Expr> {
        let Token::Identifier(ident) = self.bump()? else {
            return Err(self.error("expected identifier"));
        };

        if self.lookahead != Token::LParen {
            return Ok(Expr::Ident(ident));
        }

        let function = Function::from_name(&ident)
            .ok_or_else(|| self.error(format!("unknown function {ident:?}")))?;
        self.bump()?;
        let mut args = Vec::new();
        if self.lookahead != Token::RParen {
            loop {
                args.push(self.parse_conditional()?);
                if self.lookahead == Token::Comma {
                    self.bump()?;
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(self.error(format!(
                "{function} does not accept {} arguments",
                args.len()
            )));
        }
        Ok(Expr::Call { function, args })
    }

    fn infix_binding_power(&self) -> Option<(BinaryOp, u8)> {
        // Higher binds tighter: * / %  >  + -  >  comparisons  >  equality  >  &&  >  ||
        match self.lookahead {
            Token::OrOr => Some((BinaryOp::Or, 1)),
            Token::AndAnd => Some((BinaryOp::And, 2)),
            Token::Equals => Some((BinaryOp::Equals, 3)),
            Token::NotEquals => Some((BinaryOp::NotEquals, 3)),
            Token::Less => Some((BinaryOp::Less, 4)),
            Token::LessEquals => Some((BinaryOp::LessEquals, 4)),
            Token::Greater => Some((BinaryOp::Greater, 4)),
            Token::GreaterEquals => Some((BinaryOp::GreaterEquals, 4)),
            Token::Plus => Some((BinaryOp::Add, 5)),
            Token::Minus => Some((BinaryOp::Subtract, 5)),
            Token::Star => Some((BinaryOp::Multiply, 6)),
            Token::Slash => Some((BinaryOp::Divide, 6)),
            Token::Percent => Some((BinaryOp::Modulo, 6)),
            _ => None,
        }
    }
}

/// Parse expression text into an unbound tree; identifiers stay [`Expr::Ident`].
pub fn parse(input: &str) -> QbResult<Expr> {
    Parser::new(input)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("a + b * 2").unwrap(),
            Expr::binary(
                BinaryOp::Add,
                ident("a"),
                Expr::binary(BinaryOp::Multiply, ident("b"), Expr::literal(2.0)),
            )
        );
    }

    #[test]
    fn dotted_identifiers_stay_whole() {
        assert_eq!(parse("build.platform").unwrap(), ident("build.platform"));
        assert_eq!(
            parse("rows[0].result.ok").unwrap(),
            Expr::Member {
                target: Box::new(Expr::Member {
                    target: Box::new(Expr::Index {
                        target: Box::new(ident("rows")),
                        index: Box::new(Expr::literal(0.0)),
                    }),
                    name: "result".into(),
                }),
                name: "ok".into(),
            }
        );
    }

    #[test]
    fn free_variables_are_the_identifiers() {
        let expr = parse("coalesce(duration, 0) > limit.max && !failed ? 'slow' : \"ok\"").unwrap();
        let vars: Vec<&str> = expr.free_variables().into_iter().collect();
        assert_eq!(vars, vec!["duration", "failed", "limit.max"]);
    }

    #[test]
    fn ternary_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        let Expr::When { otherwise, .. } = expr else {
            panic!("expected a conditional");
        };
        assert!(matches!(otherwise.as_deref(), Some(Expr::When { .. })));
    }

    #[test]
    fn numbers_strings_and_keywords() {
        assert_eq!(parse("1.5e2").unwrap(), Expr::literal(150.0));
        assert_eq!(parse(".5").unwrap(), Expr::literal(0.5));
        assert_eq!(parse("'it\\'s'").unwrap(), Expr::literal("it's"));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(
            parse("x = true").unwrap(),
            Expr::binary(BinaryOp::Equals, ident("x"), Expr::literal(true))
        );
    }

    #[test]
    fn malformed_text_is_a_compile_error() {
        for text in ["x *", "(a", "a | b", "foo(1)", "abs(1, 2)", "1e", "a."] {
            match parse(text) {
                Err(QbError::Compile { expression, .. }) => assert_eq!(expression, text),
                other => panic!("{text:?} parsed as {other:?}"),
            }
        }
    }
}
