//! Expression trees and their evaluation.
//!
//! Two front ends produce an [`Expr`]: the text grammar in `parser` (used for column values and
//! `where` strings) and [`compile_expression`], which accepts the structured JSON-shaped form
//! (`{"when": ..., "then": ..., "else": ...}`, `{"eq": ...}`, ...). Both are evaluated by the
//! same tree walker against a [`Frame`].
use crate::error::{QbError, QbResult};
use crate::value::{cmp_value, Record, Value};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A row field, looked up with [`Record::get_path`].
    Field(String),
    /// A binding supplied by the evaluation frame.
    Var(Var),
    /// An identifier the parser could not resolve on its own; replaced by [`Expr::bind`].
    Ident(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    When {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    Case {
        arms: Vec<(Expr, Expr)>,
        fallback: Option<Box<Expr>>,
    },
    /// Conjunction of `field == literal` tests.
    FieldsEqual(Vec<(String, Value)>),
    Missing(Box<Expr>),
    In {
        expr: Box<Expr>,
        values: Vec<Value>,
    },
    Prefix {
        expr: Box<Expr>,
        prefix: String,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    /// Current partition key of the edge at this position.
    Edge(usize),
    /// Rows of the current analytic group (null for excluded rows).
    Rows,
    /// Position of the current row within its analytic group (null for excluded rows).
    RowNum,
    /// The current row as an object.
    Row,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Coalesce,
    Abs,
    Round,
    Floor,
    Ceil,
    Min,
    Max,
    Length,
    Count,
    Sum,
    Average,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "coalesce" => Function::Coalesce,
            "abs" => Function::Abs,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "min" => Function::Min,
            "max" => Function::Max,
            "length" => Function::Length,
            "count" => Function::Count,
            "sum" => Function::Sum,
            "average" | "avg" => Function::Average,
            _ => return None,
        })
    }

    /// Accepted argument counts as `(min, max)`.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Function::Coalesce | Function::Min | Function::Max => (1, usize::MAX),
            Function::Abs | Function::Floor | Function::Ceil | Function::Length => (1, 1),
            Function::Count => (1, 1),
            Function::Round | Function::Sum | Function::Average => (1, 2),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Function::Coalesce => "coalesce",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Min => "min",
            Function::Max => "max",
            Function::Length => "length",
            Function::Count => "count",
            Function::Sum => "sum",
            Function::Average => "average",
        };
        f.write_str(name)
    }
}

/// Failure raised while evaluating a tree; callers attach the column and row.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EvalError(pub String);

pub type EvalResult<T> = Result<T, EvalError>;

/// Everything an expression can see while it is evaluated.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub row: &'a Record,
    /// The row as a shared object, when the caller already holds one.
    pub row_value: Option<&'a Value>,
    pub edges: &'a [Value],
    pub rows: &'a Value,
    pub rownum: &'a Value,
}

static NULL: Value = Value::Null;

impl<'a> Frame<'a> {
    pub fn new(row: &'a Record) -> Self {
        Self {
            row,
            row_value: None,
            edges: &[],
            rows: &NULL,
            rownum: &NULL,
        }
    }

    pub fn with_edges(mut self, edges: &'a [Value]) -> Self {
        self.edges = edges;
        self
    }
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Fold a list of predicates with `op`; an empty list yields `empty`.
    pub fn fold(op: BinaryOp, exprs: Vec<Expr>, empty: bool) -> Self {
        exprs
            .into_iter()
            .reduce(|left, right| Expr::binary(op, left, right))
            .unwrap_or(Expr::Literal(Value::Boolean(empty)))
    }

    /// Names of the unresolved identifiers, i.e. the variables the expression needs.
    pub fn free_variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Expr::Ident(name) = expr {
                out.insert(name.as_str());
            }
        });
        out
    }

    fn visit<'e>(&'e self, f: &mut impl FnMut(&'e Expr)) {
        f(self);
        match self {
            Expr::Literal(_)
            | Expr::Field(_)
            | Expr::Var(_)
            | Expr::Ident(_)
            | Expr::FieldsEqual(_) => {}
            Expr::Member { target, .. } => target.visit(f),
            Expr::Index { target, index } => {
                target.visit(f);
                index.visit(f);
            }
            Expr::When {
                cond,
                then,
                otherwise,
            } => {
                cond.visit(f);
                then.visit(f);
                if let Some(otherwise) = otherwise {
                    otherwise.visit(f);
                }
            }
            Expr::Case { arms, fallback } => {
                for (when, then) in arms {
                    when.visit(f);
                    then.visit(f);
                }
                if let Some(fallback) = fallback {
                    fallback.visit(f);
                }
            }
            Expr::Missing(expr)
            | Expr::In { expr, .. }
            | Expr::Prefix { expr, .. }
            | Expr::UnaryOp { expr, .. } => expr.visit(f),
            Expr::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
        }
    }

    /// Replace every identifier with what `resolve` returns for it.
    pub fn bind(self, resolve: &mut impl FnMut(&str) -> QbResult<Expr>) -> QbResult<Expr> {
        Ok(match self {
            Expr::Ident(name) => resolve(&name)?,
            expr @ (Expr::Literal(_) | Expr::Field(_) | Expr::Var(_) | Expr::FieldsEqual(_)) => {
                expr
            }
            Expr::Member { target, name } => Expr::Member {
                target: bind_boxed(target, resolve)?,
                name,
            },
            Expr::Index { target, index } => Expr::Index {
                target: bind_boxed(target, resolve)?,
                index: bind_boxed(index, resolve)?,
            },
            Expr::When {
                cond,
                then,
                otherwise,
            } => Expr::When {
                cond: bind_boxed(cond, resolve)?,
                then: bind_boxed(then, resolve)?,
                otherwise: otherwise.map(|e| bind_boxed(e, resolve)).transpose()?,
            },
            Expr::Case { arms, fallback } => Expr::Case {
                arms: arms
                    .into_iter()
                    .map(|(when, then)| -> QbResult<(Expr, Expr)> {
                        Ok((when.bind(resolve)?, then.bind(resolve)?))
                    })
                    .collect::<QbResult<_>>()?,
                fallback: fallback.map(|e| bind_boxed(e, resolve)).transpose()?,
            },
            Expr::Missing(expr) => Expr::Missing(bind_boxed(expr, resolve)?),
            Expr::In { expr, values } => Expr::In {
                expr: bind_boxed(expr, resolve)?,
                values,
            },
            Expr::Prefix { expr, prefix } => Expr::Prefix {
                expr: bind_boxed(expr, resolve)?,
                prefix,
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op,
                expr: bind_boxed(expr, resolve)?,
            },
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op,
                left: bind_boxed(left, resolve)?,
                right: bind_boxed(right, resolve)?,
            },
            Expr::Call { function, args } => Expr::Call {
                function,
                args: args
                    .into_iter()
                    .map(|arg| arg.bind(resolve))
                    .collect::<QbResult<_>>()?,
            },
        })
    }

    pub fn eval(&self, frame: &Frame<'_>) -> EvalResult<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(path) => Ok(frame.row.get_path(path).clone()),
            Expr::Var(var) => Ok(match var {
                Var::Edge(idx) => frame.edges.get(*idx).cloned().unwrap_or_default(),
                Var::Rows => frame.rows.clone(),
                Var::RowNum => frame.rownum.clone(),
                Var::Row => match frame.row_value {
                    Some(value) => value.clone(),
                    None => Value::from(frame.row.clone()),
                },
            }),
            Expr::Ident(name) => Err(EvalError(format!("unbound variable {name:?}"))),
            Expr::Member { target, name } => member(&target.eval(frame)?, name),
            Expr::Index { target, index } => element(&target.eval(frame)?, &index.eval(frame)?),
            Expr::When {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(frame)?.is_truthy() {
                    then.eval(frame)
                } else {
                    match otherwise {
                        Some(otherwise) => otherwise.eval(frame),
                        None => Ok(Value::Null),
                    }
                }
            }
            Expr::Case { arms, fallback } => {
                for (when, then) in arms {
                    if when.eval(frame)?.is_truthy() {
                        return then.eval(frame);
                    }
                }
                match fallback {
                    Some(fallback) => fallback.eval(frame),
                    None => Ok(Value::Null),
                }
            }
            Expr::FieldsEqual(terms) => Ok(Value::Boolean(
                terms
                    .iter()
                    .all(|(field, value)| frame.row.get_path(field) == value),
            )),
            Expr::Missing(expr) => Ok(Value::Boolean(expr.eval(frame)?.is_null())),
            Expr::In { expr, values } => {
                let value = expr.eval(frame)?;
                Ok(Value::Boolean(values.contains(&value)))
            }
            Expr::Prefix { expr, prefix } => Ok(Value::Boolean(
                expr.eval(frame)?
                    .as_str()
                    .is_some_and(|s| s.starts_with(prefix.as_str())),
            )),
            Expr::UnaryOp { op, expr } => {
                let value = expr.eval(frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
                    UnaryOp::Negate => match value {
                        Value::Null => Ok(Value::Null),
                        Value::Number(n) => Ok(Value::number(-n.0)),
                        other => Err(EvalError(format!("can not negate {}", other.type_name()))),
                    },
                }
            }
            Expr::BinaryOp { op, left, right } => match op {
                BinaryOp::And => Ok(Value::Boolean(
                    left.eval(frame)?.is_truthy() && right.eval(frame)?.is_truthy(),
                )),
                BinaryOp::Or => Ok(Value::Boolean(
                    left.eval(frame)?.is_truthy() || right.eval(frame)?.is_truthy(),
                )),
                _ => eval_binary(*op, left.eval(frame)?, right.eval(frame)?),
            },
            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(frame))
                    .collect::<EvalResult<Vec<_>>>()?;
                eval_call(*function, &args)
            }
        }
    }
}

fn bind_boxed(
    expr: Box<Expr>,
    resolve: &mut impl FnMut(&str) -> QbResult<Expr>,
) -> QbResult<Box<Expr>> {
    Ok(Box::new(expr.bind(resolve)?))
}

fn member(target: &Value, name: &str) -> EvalResult<Value> {
    match target {
        Value::Null => Ok(Value::Null),
        Value::Object(record) => Ok(record.get_path(name).clone()),
        Value::List(items) if name == "length" => Ok(Value::from(items.len())),
        Value::Text(s) if name == "length" => Ok(Value::from(s.chars().count())),
        other => Err(EvalError(format!(
            "{} has no field {name:?}",
            other.type_name()
        ))),
    }
}

fn element(target: &Value, index: &Value) -> EvalResult<Value> {
    match (target, index) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::List(items), Value::Number(n)) => {
            let n = n.0;
            if n.fract() != 0.0 {
                return Err(EvalError(format!("list index {n} is not an integer")));
            }
            if n < 0.0 {
                return Ok(Value::Null);
            }
            Ok(items.get(n as usize).cloned().unwrap_or_default())
        }
        (Value::Object(record), Value::Text(key)) => Ok(record.get_path(key).clone()),
        (target, index) => Err(EvalError(format!(
            "can not index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Equals => return Ok(Value::Boolean(left == right)),
        BinaryOp::NotEquals => return Ok(Value::Boolean(left != right)),
        _ => {}
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::number(l.0 + r.0)),
            (Value::Text(_), _) | (_, Value::Text(_)) => Ok(Value::from(format!("{left}{right}"))),
            _ => Err(type_error(op, &left, &right)),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            let (Value::Number(l), Value::Number(r)) = (&left, &right) else {
                return Err(type_error(op, &left, &right));
            };
            let (l, r) = (l.0, r.0);
            Ok(Value::number(match op {
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide => l / r,
                _ => l % r,
            }))
        }
        BinaryOp::Less | BinaryOp::LessEquals | BinaryOp::Greater | BinaryOp::GreaterEquals => {
            let comparable = matches!(
                (&left, &right),
                (Value::Number(_), Value::Number(_))
                    | (Value::Text(_), Value::Text(_))
                    | (Value::Boolean(_), Value::Boolean(_))
            );
            if !comparable {
                return Err(type_error(op, &left, &right));
            }
            let ord = cmp_value(&left, &right);
            Ok(Value::Boolean(match op {
                BinaryOp::Less => ord.is_lt(),
                BinaryOp::LessEquals => ord.is_le(),
                BinaryOp::Greater => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::Equals | BinaryOp::NotEquals | BinaryOp::And | BinaryOp::Or => {
            unreachable!("handled before operand coercion")
        }
    }
}

fn type_error(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError(format!(
        "can not apply {op:?} to {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn numeric_arg(function: Function, value: &Value) -> EvalResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.0)),
        other => Err(EvalError(format!(
            "{function} expects a number, found {}",
            other.type_name()
        ))),
    }
}

/// Values an aggregate function ranges over: the items of a single list argument (projected on
/// `field` when given), otherwise the arguments themselves.
fn aggregate_operands<'v>(args: &'v [Value], field: Option<&str>) -> Vec<&'v Value> {
    let items: Vec<&Value> = match (args, field) {
        ([Value::List(items)], None) | ([Value::List(items), _], Some(_)) => {
            items.iter().collect()
        }
        (_, Some(_)) => args[..1].iter().collect(),
        _ => args.iter().collect(),
    };
    match field {
        Some(field) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => record.get_path(field),
                _ => &NULL,
            })
            .collect(),
        None => items,
    }
}

fn eval_call(function: Function, args: &[Value]) -> EvalResult<Value> {
    let field = match (function, args) {
        (Function::Sum | Function::Average, [_, Value::Text(field)]) => Some(&**field),
        (Function::Sum | Function::Average, [_, other]) => {
            return Err(EvalError(format!(
                "{function} expects a field name, found {}",
                other.type_name()
            )))
        }
        _ => None,
    };

    match function {
        Function::Coalesce => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or_default()),
        Function::Abs | Function::Floor | Function::Ceil => {
            let Some(n) = numeric_arg(function, &args[0])? else {
                return Ok(Value::Null);
            };
            Ok(Value::number(match function {
                Function::Abs => n.abs(),
                Function::Floor => n.floor(),
                _ => n.ceil(),
            }))
        }
        Function::Round => {
            let Some(n) = numeric_arg(function, &args[0])? else {
                return Ok(Value::Null);
            };
            let digits = match args.get(1) {
                Some(d) => numeric_arg(function, d)?.unwrap_or(0.0),
                None => 0.0,
            };
            let scale = 10f64.powi(digits as i32);
            Ok(Value::number((n * scale).round() / scale))
        }
        Function::Min | Function::Max => {
            let operands = aggregate_operands(args, None);
            let best = operands
                .into_iter()
                .filter(|v| !v.is_null())
                .reduce(|best, v| {
                    let ord = cmp_value(v, best);
                    let better = if function == Function::Min {
                        ord.is_lt()
                    } else {
                        ord.is_gt()
                    };
                    if better {
                        v
                    } else {
                        best
                    }
                });
            Ok(best.cloned().unwrap_or_default())
        }
        Function::Length => match &args[0] {
            Value::Null => Ok(Value::Null),
            Value::List(items) => Ok(Value::from(items.len())),
            Value::Text(s) => Ok(Value::from(s.chars().count())),
            other => Err(EvalError(format!("length of {}", other.type_name()))),
        },
        Function::Count => match &args[0] {
            Value::Null => Ok(Value::from(0)),
            Value::List(items) => Ok(Value::from(items.iter().filter(|v| !v.is_null()).count())),
            _ => Ok(Value::from(1)),
        },
        Function::Sum | Function::Average => {
            let mut sum = 0.0;
            let mut count = 0usize;
            for value in aggregate_operands(args, field) {
                if let Some(n) = numeric_arg(function, value)? {
                    sum += n;
                    count += 1;
                }
            }
            match function {
                Function::Sum => Ok(Value::number(sum)),
                _ if count == 0 => Ok(Value::Null),
                _ => Ok(Value::number(sum / count as f64)),
            }
        }
    }
}

/// A compiled structured expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    expr: Expr,
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn eval(&self, row: &Record) -> QbResult<Value> {
        self.expr
            .eval(&Frame::new(row))
            .map_err(|err| QbError::Evaluation {
                column: "<expression>".to_string(),
                expression: self.source.clone(),
                row: row.to_string(),
                message: err.0,
            })
    }
}

/// Compile the structured expression form into an evaluator.
///
/// Text is a field path, scalars are constants, and objects are dispatched on their keys:
/// `literal`, `when`/`then`/`else`, `eq`, `ne`, `case`, `missing`, `exists`, `and`, `or`, `not`.
pub fn compile_expression(expr: &Value) -> QbResult<Expression> {
    Ok(Expression {
        source: expr.to_string(),
        expr: structured(expr)?,
    })
}

const OPERATORS: &[&str] = &[
    "literal", "when", "then", "else", "eq", "ne", "case", "missing", "exists", "and", "or", "not",
];

pub(crate) fn structured(expr: &Value) -> QbResult<Expr> {
    let record = match expr {
        Value::Null | Value::Boolean(_) | Value::Number(_) => {
            return Ok(Expr::Literal(expr.clone()))
        }
        Value::Text(path) => return Ok(Expr::Field(path.to_string())),
        Value::List(_) => {
            return Err(QbError::UnsupportedExpression {
                key: "[...]".into(),
                expression: expr.to_string(),
            })
        }
        Value::Object(record) => record,
    };

    let unsupported = |key: &str| QbError::UnsupportedExpression {
        key: key.to_string(),
        expression: expr.to_string(),
    };
    if let Some(key) = record.keys().find(|key| !OPERATORS.contains(key)) {
        return Err(unsupported(key));
    }

    if let Some(cond) = record.get("when") {
        return Ok(Expr::When {
            cond: Box::new(structured(cond)?),
            then: Box::new(structured(record.get_path("then"))?),
            otherwise: record
                .get("else")
                .map(|e| structured(e).map(Box::new))
                .transpose()?,
        });
    }

    let mut keys = record.iter();
    let (Some((key, operand)), None) = (keys.next(), keys.next()) else {
        let key = record.keys().next().unwrap_or("{}");
        return Err(unsupported(key));
    };
    match key {
        "literal" => Ok(Expr::Literal(operand.clone())),
        "eq" | "ne" => {
            let eq = match operand {
                Value::List(pair) if pair.len() == 2 => {
                    Expr::binary(BinaryOp::Equals, structured(&pair[0])?, structured(&pair[1])?)
                }
                Value::Object(terms) => Expr::FieldsEqual(
                    terms
                        .iter()
                        .map(|(field, value)| (field.to_string(), value.clone()))
                        .collect(),
                ),
                other => {
                    return Err(QbError::InvalidArgument(format!(
                        "{key} expects a pair or an object of field values, found {other}"
                    )))
                }
            };
            Ok(if key == "ne" { Expr::not(eq) } else { eq })
        }
        "case" => {
            let Value::List(items) = operand else {
                return Err(QbError::InvalidArgument(format!(
                    "case expects a list, found {operand}"
                )));
            };
            let mut arms = Vec::with_capacity(items.len());
            let mut fallback = None;
            for (i, item) in items.iter().enumerate() {
                match item.as_record().and_then(|r| r.get("when").map(|w| (r, w))) {
                    Some((arm, when)) => {
                        arms.push((structured(when)?, structured(arm.get_path("then"))?));
                    }
                    None if i + 1 == items.len() => fallback = Some(Box::new(structured(item)?)),
                    None => {
                        return Err(QbError::InvalidArgument(format!(
                            "only the last case element may omit \"when\": {item}"
                        )))
                    }
                }
            }
            Ok(Expr::Case { arms, fallback })
        }
        "missing" => Ok(Expr::Missing(Box::new(structured(operand)?))),
        "exists" => Ok(Expr::not(Expr::Missing(Box::new(structured(operand)?)))),
        "not" => Ok(Expr::not(structured(operand)?)),
        "and" | "or" => {
            let Value::List(items) = operand else {
                return Err(QbError::InvalidArgument(format!(
                    "{key} expects a list, found {operand}"
                )));
            };
            let terms = items.iter().map(structured).collect::<QbResult<Vec<_>>>()?;
            Ok(if key == "and" {
                Expr::fold(BinaryOp::And, terms, true)
            } else {
                Expr::fold(BinaryOp::Or, terms, false)
            })
        }
        other => Err(unsupported(other)),
    }
}
