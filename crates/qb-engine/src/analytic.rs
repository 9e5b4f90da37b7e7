//! Windowed analytic columns.
//!
//! Rows are grouped by their values on the analytic's edges, each group is optionally sorted,
//! and the analytic expression is evaluated for every row with three extra bindings: `rows`
//! (the row's group, in sorted order), `rownum` (counted backward from the end of the group,
//! so the first row of a group of `n` gets `n - 1`) and `row`. Rows rejected by the analytic's
//! `where` see `rows` and `rownum` as null.
//!
//! Window state lives in side tables indexed by row position; input rows are never touched.
use crate::column::{
    compile_column, compile_where, ColumnSpec, CompiledColumn, Predicate, RowComparator, Scope,
    SortClause,
};
use crate::error::{QbError, QbResult};
use crate::expr::Frame;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticSpec {
    /// Output field.
    pub name: String,
    pub value: String,
    /// Grouping expressions; required, an empty list meaning one group.
    #[serde(default)]
    pub edges: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

/// Trie of row indices keyed level by level by the grouping values.
#[derive(Debug, Default)]
struct GroupTrie {
    rows: Vec<usize>,
    children: BTreeMap<Value, GroupTrie>,
}

impl GroupTrie {
    fn insert(&mut self, key: &[Value], row: usize) {
        match key.split_first() {
            None => self.rows.push(row),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, row),
        }
    }

    /// Groups in key order.
    fn into_groups(self, out: &mut Vec<Vec<usize>>) {
        if !self.rows.is_empty() {
            out.push(self.rows);
        }
        for (_, child) in self.children {
            child.into_groups(out);
        }
    }
}

/// One analytic, compiled against the columns in scope.
#[derive(Clone, Debug)]
pub struct Analytic {
    edges: Vec<CompiledColumn>,
    filter: Predicate,
    comparator: RowComparator,
    value: CompiledColumn,
}

impl Analytic {
    pub fn compile(spec: &AnalyticSpec, scope: &Scope) -> QbResult<Self> {
        let Some(edges) = &spec.edges else {
            return Err(QbError::InvalidConfiguration(format!(
                "analytic {:?} must declare edges, use [] for a single group",
                spec.name
            )));
        };
        let edges = edges
            .iter()
            .map(|edge| compile_column(&ColumnSpec::new(edge.as_str(), edge.as_str()), scope))
            .collect::<QbResult<Vec<_>>>()?;
        let comparator = match &spec.sort {
            Some(sort) => RowComparator::compile(sort.specs(), scope)?,
            None => RowComparator::default(),
        };
        let value = compile_column(
            &ColumnSpec::new(spec.name.as_str(), spec.value.as_str()),
            &scope.clone().with_analytic(),
        )?;
        Ok(Self {
            edges,
            filter: compile_where(spec.filter.as_ref(), scope)?,
            comparator,
            value,
        })
    }

    pub fn name(&self) -> &str {
        self.value.name()
    }

    /// The analytic's value for every row, in input order.
    pub fn evaluate(&self, rows: &[Record]) -> QbResult<Vec<Value>> {
        let mut excluded = Vec::new();
        let mut trie = GroupTrie::default();
        for (i, row) in rows.iter().enumerate() {
            if !self.filter.matches(row)? {
                excluded.push(i);
                continue;
            }
            let key = self
                .edges
                .iter()
                .map(|edge| edge.calc(row))
                .collect::<QbResult<Vec<_>>>()?;
            trie.insert(&key, i);
        }
        let mut groups = Vec::new();
        trie.into_groups(&mut groups);
        log::debug!(
            "analytic {:?}: {} groups, {} rows excluded",
            self.name(),
            groups.len(),
            excluded.len()
        );

        if !self.comparator.is_empty() {
            for group in groups.iter_mut().chain(std::iter::once(&mut excluded)) {
                self.comparator
                    .sort_by_frame(group, |&i| Frame::new(&rows[i]))?;
            }
        }

        let row_values: Vec<Value> = rows.iter().cloned().map(Value::from).collect();
        let mut window = vec![(Value::Null, Value::Null); rows.len()];
        for group in &groups {
            let list = Value::list(group.iter().map(|&i| row_values[i].clone()));
            let n = group.len();
            for (pos, &i) in group.iter().enumerate() {
                window[i] = (list.clone(), Value::from(n - 1 - pos));
            }
        }

        rows.iter()
            .zip(&row_values)
            .zip(&window)
            .map(|((row, row_value), (group, rownum))| {
                self.value.calc_in(&Frame {
                    row,
                    row_value: Some(row_value),
                    edges: &[],
                    rows: group,
                    rownum,
                })
            })
            .collect()
    }
}

/// Run the analytics in order, each seeing the columns added by the ones before it.
///
/// Returns fresh records carrying the analytic columns.
pub fn apply_analytics(
    rows: &[Record],
    analytics: &[AnalyticSpec],
    scope: &Scope,
) -> QbResult<Vec<Record>> {
    let mut out = rows.to_vec();
    let mut scope = scope.clone();
    for spec in analytics {
        let analytic = Analytic::compile(spec, &scope)?;
        let values = analytic.evaluate(&out)?;
        for (row, value) in out.iter_mut().zip(values) {
            row.insert(spec.name.clone(), value);
        }
        scope.add_column(spec.name.clone());
    }
    Ok(out)
}
