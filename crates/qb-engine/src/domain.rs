//! Edge domains: the ordered partitions a cube axis is indexed by.
use crate::error::{QbError, QbResult};
use crate::expr::{Expr, Frame};
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// One bucket of a domain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    #[serde(default, alias = "value")]
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Position of the partition along its cube axis.
    #[serde(default, alias = "data_index")]
    pub data_index: usize,
    /// Structured filter selecting the rows that belong to this partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esfilter: Option<Value>,
}

impl Partition {
    pub fn new(key: impl Into<Value>, data_index: usize) -> Self {
        Self {
            key: key.into(),
            name: None,
            data_index,
            esfilter: None,
        }
    }

    pub fn with_esfilter(mut self, filter: Value) -> Self {
        self.esfilter = Some(filter);
        self
    }
}

/// Supplies the ordered partitions of an edge and maps values onto them.
pub trait Domain: fmt::Debug + Send + Sync {
    fn name(&self) -> Option<&str>;

    /// Partitions in `data_index` order.
    fn partitions(&self) -> &[Partition];

    fn get_key<'p>(&self, part: &'p Partition) -> &'p Value {
        &part.key
    }

    /// The partition a value falls into, if any.
    fn get_part_by_key(&self, key: &Value) -> Option<&Partition>;
}

/// An explicit list of partitions, matched by key equality.
#[derive(Clone, Debug, Default)]
pub struct SetDomain {
    name: Option<String>,
    partitions: Vec<Partition>,
    index: HashMap<Value, usize>,
}

impl SetDomain {
    /// Partitions are kept in the given order and renumbered to their positions. A repeated
    /// key is dropped, the first partition carrying it wins.
    pub fn new(name: Option<String>, partitions: Vec<Partition>) -> Self {
        let mut index = HashMap::with_capacity(partitions.len());
        let mut kept = Vec::with_capacity(partitions.len());
        for mut part in partitions {
            if index.contains_key(&part.key) {
                log::warn!("duplicate partition key {}, dropped", part.key);
                continue;
            }
            let position = kept.len();
            if part.data_index != position {
                if part.data_index != 0 {
                    log::warn!(
                        "partition {} declares dataIndex {}, using position {position}",
                        part.key,
                        part.data_index
                    );
                }
                part.data_index = position;
            }
            index.insert(part.key.clone(), position);
            kept.push(part);
        }
        Self {
            name,
            partitions: kept,
            index,
        }
    }

    pub fn from_keys(keys: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let partitions = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| Partition::new(key, i))
            .collect();
        Self::new(None, partitions)
    }

    /// The distinct non-null values, in sort order.
    pub fn from_values<'v>(name: Option<String>, values: impl IntoIterator<Item = &'v Value>) -> Self {
        let distinct: BTreeSet<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
        let mut domain = Self::from_keys(distinct.into_iter().cloned());
        domain.name = name;
        domain
    }
}

impl Domain for SetDomain {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn get_part_by_key(&self, key: &Value) -> Option<&Partition> {
        self.index.get(key).map(|&i| &self.partitions[i])
    }
}

/// Numeric buckets `[min + i * interval, min + (i + 1) * interval)` covering `[min, max)`.
#[derive(Clone, Debug)]
pub struct RangeDomain {
    name: Option<String>,
    min: f64,
    interval: f64,
    partitions: Vec<Partition>,
}

impl RangeDomain {
    pub fn new(name: Option<String>, min: f64, max: f64, interval: f64) -> QbResult<Self> {
        let count = Self::bucket_count(min, max, interval)?;
        let partitions = (0..count)
            .map(|i| Partition::new(min + i as f64 * interval, i))
            .collect();
        Ok(Self {
            name,
            min,
            interval,
            partitions,
        })
    }
}

impl RangeDomain {
    /// Number of buckets `new` would build, checked before anything is allocated.
    pub fn bucket_count(min: f64, max: f64, interval: f64) -> QbResult<usize> {
        if !(min.is_finite() && max.is_finite() && interval.is_finite()) || interval <= 0.0 || max < min {
            return Err(QbError::InvalidConfiguration(format!(
                "range domain needs min <= max and a positive interval, got min={min} max={max} interval={interval}"
            )));
        }
        let count = ((max - min) / interval).ceil();
        if !count.is_finite() || count >= usize::MAX as f64 {
            return Err(QbError::InvalidConfiguration(format!(
                "range domain [{min}, {max}) by {interval} has too many buckets"
            )));
        }
        Ok(count as usize)
    }
}

impl Domain for RangeDomain {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn get_part_by_key(&self, key: &Value) -> Option<&Partition> {
        let v = key.as_f64()?;
        if v < self.min {
            return None;
        }
        let i = ((v - self.min) / self.interval).floor() as usize;
        self.partitions.get(i)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Set,
    /// Partitions are the distinct values found in the data.
    Default,
    Range,
}

/// Domain descriptor as it appears in a query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DomainKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<Partition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
}

impl DomainSpec {
    pub fn set(partitions: Vec<Partition>) -> Self {
        Self {
            kind: Some(DomainKind::Set),
            partitions,
            ..Self::default()
        }
    }

    /// Declared kind, or the one implied by the fields present.
    pub fn kind(&self) -> DomainKind {
        match self.kind {
            Some(kind) => kind,
            None if !self.partitions.is_empty() => DomainKind::Set,
            None if self.min.is_some() || self.max.is_some() => DomainKind::Range,
            None => DomainKind::Default,
        }
    }

    /// True when every partition carries a filter, so rows can be routed without a value.
    pub fn is_filter_covered(&self) -> bool {
        !self.partitions.is_empty() && self.partitions.iter().all(|p| p.esfilter.is_some())
    }

    /// Build the domain; `observed` feeds the `default` kind. Range domains with more than
    /// `max_partitions` buckets are rejected before they are built.
    pub fn resolve(&self, observed: &[Value], max_partitions: usize) -> QbResult<Arc<dyn Domain>> {
        Ok(match self.kind() {
            DomainKind::Set => Arc::new(SetDomain::new(self.name.clone(), self.partitions.clone())),
            DomainKind::Default => {
                let domain = SetDomain::from_values(self.name.clone(), observed);
                log::debug!(
                    "derived default domain {:?} with {} partitions",
                    self.name,
                    domain.partitions().len()
                );
                Arc::new(domain)
            }
            DomainKind::Range => {
                let (Some(min), Some(max)) = (self.min, self.max) else {
                    return Err(QbError::InvalidConfiguration(
                        "range domain requires min and max".into(),
                    ));
                };
                let interval = self.interval.unwrap_or(1.0);
                let count = RangeDomain::bucket_count(min, max, interval)?;
                if count > max_partitions {
                    return Err(QbError::InvalidConfiguration(format!(
                        "range domain of {count} buckets exceeds the limit of {max_partitions}"
                    )));
                }
                Arc::new(RangeDomain::new(self.name.clone(), min, max, interval)?)
            }
        })
    }
}

/// Edge descriptor as it appears in a query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    pub name: String,
    /// Expression locating the row's value; the edge name read as a field path when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_nulls: Option<bool>,
}

/// A compiled edge: a cube axis of `partitions + allow_nulls` slots.
#[derive(Clone, Debug)]
pub struct Edge {
    pub name: String,
    pub source: String,
    pub value: Expr,
    pub domain: Arc<dyn Domain>,
    pub allow_nulls: bool,
}

impl Edge {
    /// An edge reading the field named like the edge, without a null slot.
    pub fn new(name: impl Into<String>, domain: Arc<dyn Domain>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            value: Expr::Field(name.clone()),
            name,
            domain,
            allow_nulls: false,
        }
    }

    pub fn allow_nulls(mut self, allow_nulls: bool) -> Self {
        self.allow_nulls = allow_nulls;
        self
    }

    /// The row's value on this edge.
    pub fn eval(&self, row: &Record) -> QbResult<Value> {
        self.value
            .eval(&Frame::new(row))
            .map_err(|err| QbError::Evaluation {
                column: self.name.clone(),
                expression: self.source.clone(),
                row: row.to_string(),
                message: err.0,
            })
    }

    /// Extent of this edge's cube axis.
    pub fn slots(&self) -> usize {
        self.domain.partitions().len() + usize::from(self.allow_nulls)
    }

    /// Index of the trailing null slot, when there is one.
    pub fn null_index(&self) -> Option<usize> {
        self.allow_nulls.then(|| self.domain.partitions().len())
    }

    /// Partition key at an axis position; `null` for the null slot.
    pub fn key_at(&self, index: usize) -> Value {
        self.domain
            .partitions()
            .get(index)
            .map(|part| self.domain.get_key(part).clone())
            .unwrap_or_default()
    }

    /// Axis position for a value: its partition, else the null slot, else `None`.
    pub fn locate(&self, key: &Value) -> Option<usize> {
        match self.domain.get_part_by_key(key) {
            Some(part) => Some(part.data_index),
            None => self.null_index(),
        }
    }
}
