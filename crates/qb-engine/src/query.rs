use crate::aggregate::Aggregate;
use crate::analytic::{apply_analytics, AnalyticSpec};
use crate::column::{
    compile_column, compile_where, ColumnSpec, RowComparator, Scope, Select, SortClause,
};
use crate::config::EngineConfig;
use crate::cube::Cube;
use crate::domain::EdgeSpec;
use crate::error::QbResult;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Declarative query descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Name of the source table; informational, rows are passed to [`run`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analytic: Vec<AnalyticSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortClause>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn from_json_str(json: &str) -> QbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug)]
pub enum QueryResult {
    Cube(Cube),
    List(Vec<Record>),
}

impl QueryResult {
    pub fn into_cube(self) -> Option<Cube> {
        match self {
            QueryResult::Cube(cube) => Some(cube),
            QueryResult::List(_) => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Record>> {
        match self {
            QueryResult::List(rows) => Some(rows),
            QueryResult::Cube(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryResult::Cube(cube) => cube.to_json(),
            QueryResult::List(rows) => rows.iter().map(Record::to_json).collect(),
        }
    }
}

/// Run `query` over `rows`.
///
/// The `where` clause filters the rows, analytics are added in order, then the rows are
/// either folded into a cube (when the query has edges, or selects aggregates) or projected,
/// sorted and truncated into a list.
///
/// Identifiers that name no edge or analytic read fields, so a field absent from every row
/// (or an empty input) evaluates as null rather than failing to compile.
pub fn run(query: &Query, rows: &[Record], config: &EngineConfig) -> QbResult<QueryResult> {
    config.validate()?;
    log::debug!(
        "running query over {} rows from {}",
        rows.len(),
        query.from.as_deref().unwrap_or("<rows>")
    );

    let mut scope = Scope::open();
    let predicate = compile_where(query.filter.as_ref(), &scope)?;
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if predicate.matches(row)? {
            kept.push(row.clone());
        }
    }
    let rows = apply_analytics(&kept, &query.analytic, &scope)?;
    for analytic in &query.analytic {
        scope.add_column(analytic.name.clone());
    }

    let aggregates = query
        .select
        .as_ref()
        .is_some_and(|select| select.columns().iter().any(|c| c.aggregate != Aggregate::None));
    if !query.edges.is_empty() || aggregates {
        if query.limit.is_some() || query.sort.is_some() {
            log::warn!("sort and limit do not apply to cube results, ignored");
        }
        let select = query.select.clone().unwrap_or_else(|| {
            Select::One(ColumnSpec::new("count", 1).aggregate(Aggregate::Count))
        });
        return Ok(QueryResult::Cube(Cube::from_rows(
            &query.edges,
            &select,
            &scope,
            &rows,
            config,
        )?));
    }

    let mut rows = rows;
    if let Some(sort) = &query.sort {
        RowComparator::compile(sort.specs(), &scope)?.sort_records(&mut rows)?;
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    let Some(select) = &query.select else {
        return Ok(QueryResult::List(rows));
    };
    let columns = select
        .columns()
        .iter()
        .map(|column| compile_column(column, &scope))
        .collect::<QbResult<Vec<_>>>()?;
    let projected = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| Ok((column.name().to_string(), column.calc(row)?)))
                .collect::<QbResult<Record>>()
        })
        .collect::<QbResult<Vec<_>>>()?;
    Ok(QueryResult::List(projected))
}
