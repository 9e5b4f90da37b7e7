use crate::expr::{EvalError, EvalResult};
use crate::value::{cmp_value, Value};
use serde::{Deserialize, Serialize};

/// How the values of the rows landing in one cube cell are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// The last row's value wins.
    #[default]
    None,
    Count,
    Sum,
    Min,
    Max,
    #[serde(alias = "avg")]
    Average,
    List,
    /// Every row must agree on the value.
    One,
}

impl Aggregate {
    /// Value of a cell no row contributed to.
    pub fn default_value(self) -> Value {
        match self {
            Aggregate::Count => Value::from(0),
            Aggregate::List => Value::list(Vec::new()),
            _ => Value::Null,
        }
    }

    pub fn accumulator(self) -> Accumulator {
        match self {
            Aggregate::None => Accumulator::Last(Value::Null),
            Aggregate::Count => Accumulator::Count(0),
            Aggregate::Sum => Accumulator::Sum(None),
            Aggregate::Min => Accumulator::Min(Value::Null),
            Aggregate::Max => Accumulator::Max(Value::Null),
            Aggregate::Average => Accumulator::Average { sum: 0.0, count: 0 },
            Aggregate::List => Accumulator::List(Vec::new()),
            Aggregate::One => Accumulator::One(None),
        }
    }

    /// Combine two finished cell values, when the aggregate has a rule for it.
    pub fn merge(self, a: &Value, b: &Value) -> Option<Value> {
        match self {
            Aggregate::Count | Aggregate::Sum => match (a, b) {
                (Value::Number(a), Value::Number(b)) => Some(Value::number(a.0 + b.0)),
                _ => None,
            },
            Aggregate::Min => Some(if cmp_value(b, a).is_lt() && !b.is_null() || a.is_null() {
                b.clone()
            } else {
                a.clone()
            }),
            Aggregate::Max => Some(if cmp_value(b, a).is_gt() { b.clone() } else { a.clone() }),
            Aggregate::List => match (a, b) {
                (Value::List(a), Value::List(b)) => {
                    Some(Value::list(a.iter().chain(b.iter()).cloned()))
                }
                _ => None,
            },
            Aggregate::None | Aggregate::Average | Aggregate::One => None,
        }
    }
}

/// Running state of one cell while rows are folded in.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    Last(Value),
    Count(usize),
    Sum(Option<f64>),
    Min(Value),
    Max(Value),
    Average { sum: f64, count: usize },
    List(Vec<Value>),
    One(Option<Value>),
}

impl Accumulator {
    pub fn add(&mut self, value: Value) -> EvalResult<()> {
        match self {
            Accumulator::Last(last) => *last = value,
            _ if value.is_null() => {}
            Accumulator::Count(count) => *count += 1,
            Accumulator::Sum(sum) => *sum = Some(sum.unwrap_or(0.0) + number(&value)?),
            Accumulator::Min(best) => {
                if best.is_null() || cmp_value(&value, best).is_lt() {
                    *best = value;
                }
            }
            Accumulator::Max(best) => {
                if cmp_value(&value, best).is_gt() {
                    *best = value;
                }
            }
            Accumulator::Average { sum, count } => {
                *sum += number(&value)?;
                *count += 1;
            }
            Accumulator::List(items) => items.push(value),
            Accumulator::One(seen) => match seen {
                Some(existing) if *existing != value => {
                    return Err(EvalError(format!(
                        "expecting one value per cell, found {existing} and {value}"
                    )))
                }
                Some(_) => {}
                None => *seen = Some(value),
            },
        }
        Ok(())
    }

    pub fn finish(&self) -> Value {
        match self {
            Accumulator::Last(value) | Accumulator::Min(value) | Accumulator::Max(value) => {
                value.clone()
            }
            Accumulator::Count(count) => Value::from(*count),
            Accumulator::Sum(sum) => Value::from(*sum),
            Accumulator::Average { count: 0, .. } => Value::Null,
            Accumulator::Average { sum, count } => Value::number(sum / *count as f64),
            Accumulator::List(items) => Value::list(items.iter().cloned()),
            Accumulator::One(value) => value.clone().unwrap_or_default(),
        }
    }
}

fn number(value: &Value) -> EvalResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| EvalError(format!("expecting a number, found {}", value.type_name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fold(aggregate: Aggregate, values: &[Value]) -> Value {
        let mut acc = aggregate.accumulator();
        for value in values {
            acc.add(value.clone()).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn aggregates_skip_nulls() {
        let values = [Value::from(3), Value::Null, Value::from(1), Value::from(2)];
        assert_eq!(fold(Aggregate::Count, &values), Value::from(3));
        assert_eq!(fold(Aggregate::Sum, &values), Value::from(6));
        assert_eq!(fold(Aggregate::Min, &values), Value::from(1));
        assert_eq!(fold(Aggregate::Max, &values), Value::from(3));
        assert_eq!(fold(Aggregate::Average, &values), Value::from(2));
        assert_eq!(fold(Aggregate::None, &values), Value::from(2));
        assert_eq!(
            fold(Aggregate::List, &values),
            Value::from(vec![Value::from(3), Value::from(1), Value::from(2)])
        );
        assert_eq!(fold(Aggregate::Sum, &[Value::Null]), Value::Null);
    }

    #[test]
    fn one_rejects_disagreeing_rows() {
        let mut acc = Aggregate::One.accumulator();
        acc.add(Value::from("a")).unwrap();
        acc.add(Value::from("a")).unwrap();
        assert!(acc.add(Value::from("b")).is_err());
    }

    #[test]
    fn sum_rejects_text() {
        let mut acc = Aggregate::Sum.accumulator();
        assert!(acc.add(Value::from("x")).is_err());
    }

    #[test]
    fn merge_rules() {
        assert_eq!(
            Aggregate::Count.merge(&Value::from(2), &Value::from(3)),
            Some(Value::from(5))
        );
        assert_eq!(
            Aggregate::Min.merge(&Value::Null, &Value::from(3)),
            Some(Value::from(3))
        );
        assert_eq!(
            Aggregate::Min.merge(&Value::from(1), &Value::Null),
            Some(Value::from(1))
        );
        assert_eq!(Aggregate::One.merge(&Value::from(1), &Value::from(2)), None);
    }
}
