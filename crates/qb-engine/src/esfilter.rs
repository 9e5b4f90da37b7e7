//! Structured filters in the ElasticSearch 1.x style the query service speaks
//! (`term`, `terms`, `range`, `and`, ...), translated into expression trees.
use crate::error::{QbError, QbResult};
use crate::expr::{BinaryOp, Expr};
use crate::value::Value;

pub fn compile_filter(filter: &Value) -> QbResult<Expr> {
    let unsupported = |key: &str| QbError::UnsupportedExpression {
        key: key.to_string(),
        expression: filter.to_string(),
    };
    let Some(record) = filter.as_record() else {
        return Err(QbError::InvalidArgument(format!(
            "a filter must be an object, found {filter}"
        )));
    };
    let mut entries = record.iter();
    let (Some((key, operand)), None) = (entries.next(), entries.next()) else {
        return Err(QbError::InvalidArgument(format!(
            "a filter must have exactly one operator: {filter}"
        )));
    };

    match key {
        "match_all" => Ok(Expr::literal(true)),
        "and" | "or" => {
            let Some(items) = operand.as_list() else {
                return Err(QbError::InvalidArgument(format!(
                    "{key} expects a list of filters, found {operand}"
                )));
            };
            let terms = items.iter().map(compile_filter).collect::<QbResult<Vec<_>>>()?;
            Ok(if key == "and" {
                Expr::fold(BinaryOp::And, terms, true)
            } else {
                Expr::fold(BinaryOp::Or, terms, false)
            })
        }
        "not" => Ok(Expr::not(compile_filter(operand)?)),
        "term" => {
            let terms = field_map(key, operand)?
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect();
            Ok(Expr::FieldsEqual(terms))
        }
        "terms" => {
            let mut tests = Vec::new();
            for (field, values) in field_map(key, operand)? {
                let Some(values) = values.as_list() else {
                    return Err(QbError::InvalidArgument(format!(
                        "terms expects a list of values for {field:?}, found {values}"
                    )));
                };
                tests.push(Expr::In {
                    expr: Box::new(Expr::Field(field.to_string())),
                    values: values.to_vec(),
                });
            }
            Ok(Expr::fold(BinaryOp::And, tests, true))
        }
        "range" => {
            let mut tests = Vec::new();
            for (field, bounds) in field_map(key, operand)? {
                for (op, bound) in field_map(key, bounds)? {
                    let op = match op {
                        "gt" => BinaryOp::Greater,
                        "gte" => BinaryOp::GreaterEquals,
                        "lt" => BinaryOp::Less,
                        "lte" => BinaryOp::LessEquals,
                        other => return Err(unsupported(other)),
                    };
                    tests.push(Expr::binary(
                        op,
                        Expr::Field(field.to_string()),
                        Expr::Literal(bound.clone()),
                    ));
                }
            }
            Ok(Expr::fold(BinaryOp::And, tests, true))
        }
        "prefix" => {
            let mut tests = Vec::new();
            for (field, prefix) in field_map(key, operand)? {
                let Some(prefix) = prefix.as_str() else {
                    return Err(QbError::InvalidArgument(format!(
                        "prefix of {field:?} must be text, found {prefix}"
                    )));
                };
                tests.push(Expr::Prefix {
                    expr: Box::new(Expr::Field(field.to_string())),
                    prefix: prefix.to_string(),
                });
            }
            Ok(Expr::fold(BinaryOp::And, tests, true))
        }
        "exists" | "missing" => {
            let field = match operand {
                Value::Text(field) => field.to_string(),
                Value::Object(record) => match record.get("field") {
                    Some(Value::Text(field)) => field.to_string(),
                    _ => {
                        return Err(QbError::InvalidArgument(format!(
                            "{key} expects {{\"field\": name}}, found {operand}"
                        )))
                    }
                },
                other => {
                    return Err(QbError::InvalidArgument(format!(
                        "{key} expects a field name, found {other}"
                    )))
                }
            };
            let missing = Expr::Missing(Box::new(Expr::Field(field)));
            Ok(if key == "exists" {
                Expr::not(missing)
            } else {
                missing
            })
        }
        other => Err(unsupported(other)),
    }
}

fn field_map<'v>(
    key: &str,
    operand: &'v Value,
) -> QbResult<impl Iterator<Item = (&'v str, &'v Value)>> {
    match operand.as_record() {
        Some(record) => Ok(record.iter()),
        None => Err(QbError::InvalidArgument(format!(
            "{key} expects an object, found {operand}"
        ))),
    }
}
