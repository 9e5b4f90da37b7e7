//! Column, where and sort compilation.
//!
//! Text expressions are parsed once, then every identifier is bound against a [`Scope`]: the
//! source columns of the rows, the edges of the cube being built and, inside analytic
//! expressions, the `rows`/`rownum`/`row` window bindings. Anything else is a compile error.
use crate::aggregate::Aggregate;
use crate::domain::{DomainSpec, Edge};
use crate::error::{QbError, QbResult};
use crate::esfilter::compile_filter;
use crate::expr::{structured, Expr, Frame, Var};
use crate::parser;
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Result column descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Expression text, a structured expression, or a literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Cell value before any row is folded in.
    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.aggregate.default_value())
    }
}

/// A query's `select`: one column (cells hold scalars) or a list (cells hold objects).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Select {
    One(ColumnSpec),
    Many(Vec<ColumnSpec>),
}

impl Select {
    pub fn columns(&self) -> &[ColumnSpec] {
        match self {
            Select::One(column) => std::slice::from_ref(column),
            Select::Many(columns) => columns,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Select::One(_))
    }
}

/// Sort direction keyword.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Sort {
    #[default]
    Ascending,
    Descending,
    None,
}

impl Sort {
    /// Accepts `"ascending"`, `"descending"`, `"none"`, `1`, `-1` and `0`.
    pub fn parse(value: &Value) -> QbResult<Self> {
        match value {
            Value::Text(s) => match s.as_ref() {
                "ascending" => Ok(Sort::Ascending),
                "descending" => Ok(Sort::Descending),
                "none" => Ok(Sort::None),
                _ => Err(bad_sort(value)),
            },
            Value::Number(n) if n.0 == 1.0 => Ok(Sort::Ascending),
            Value::Number(n) if n.0 == -1.0 => Ok(Sort::Descending),
            Value::Number(n) if n.0 == 0.0 => Ok(Sort::None),
            _ => Err(bad_sort(value)),
        }
    }

    pub fn sort_order(self) -> i8 {
        match self {
            Sort::Ascending => 1,
            Sort::Descending => -1,
            Sort::None => 0,
        }
    }
}

fn bad_sort(value: &Value) -> QbError {
    QbError::InvalidConfiguration(format!(
        "sort must be one of \"ascending\", \"descending\", \"none\", 1, -1, 0; found {value}"
    ))
}

impl TryFrom<Value> for Sort {
    type Error = QbError;

    fn try_from(value: Value) -> QbResult<Self> {
        Sort::parse(&value)
    }
}

impl From<Sort> for Value {
    fn from(sort: Sort) -> Self {
        Value::text(match sort {
            Sort::Ascending => "ascending",
            Sort::Descending => "descending",
            Sort::None => "none",
        })
    }
}

/// One entry of a `sort` clause: a bare expression, or an expression with a direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Value(String),
    Keyed {
        #[serde(alias = "field")]
        value: String,
        #[serde(default)]
        sort: Sort,
    },
}

impl SortSpec {
    pub fn value(&self) -> &str {
        match self {
            SortSpec::Value(value) | SortSpec::Keyed { value, .. } => value,
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            SortSpec::Value(_) => Sort::Ascending,
            SortSpec::Keyed { sort, .. } => *sort,
        }
    }
}

/// A `sort` clause: one key or a list of keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortClause {
    One(SortSpec),
    Many(Vec<SortSpec>),
}

impl SortClause {
    pub fn specs(&self) -> &[SortSpec] {
        match self {
            SortClause::One(spec) => std::slice::from_ref(spec),
            SortClause::Many(specs) => specs,
        }
    }
}

/// The names an expression may refer to.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    columns: HashSet<String>,
    edges: Vec<(String, Option<String>)>,
    analytic: bool,
    open: bool,
}

impl Scope {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A scope that reads every identifier as a field path.
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    /// Bind edge names, and the names of their domains, to the current partition keys.
    pub fn with_edges(mut self, edges: &[Edge]) -> Self {
        self.edges = edges
            .iter()
            .map(|edge| (edge.name.clone(), edge.domain.name().map(str::to_string)))
            .collect();
        self
    }

    /// Make the `rows`, `rownum` and `row` window bindings visible.
    pub fn with_analytic(mut self) -> Self {
        self.analytic = true;
        self
    }

    pub fn add_column(&mut self, name: impl Into<String>) {
        self.columns.insert(name.into());
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    fn lookup(&self, name: &str) -> Option<Expr> {
        if self.analytic {
            match name {
                "rows" => return Some(Expr::Var(Var::Rows)),
                "rownum" => return Some(Expr::Var(Var::RowNum)),
                "row" => return Some(Expr::Var(Var::Row)),
                _ => {}
            }
        }
        if let Some(i) = self
            .edges
            .iter()
            .position(|(edge, domain)| edge == name || domain.as_deref() == Some(name))
        {
            return Some(Expr::Var(Var::Edge(i)));
        }
        self.columns
            .contains(name)
            .then(|| Expr::Field(name.to_string()))
    }

    /// Resolve a dotted identifier against the longest prefix that names something in scope.
    fn resolve(&self, ident: &str, source: &str) -> QbResult<Expr> {
        let mut end = ident.len();
        loop {
            let prefix = &ident[..end];
            if let Some(root) = self.lookup(prefix) {
                let rest = ident[end..].split('.').filter(|s| !s.is_empty());
                return Ok(rest.fold(root, |target, name| Expr::Member {
                    target: Box::new(target),
                    name: name.to_string(),
                }));
            }
            match prefix.rfind('.') {
                Some(dot) => end = dot,
                None => break,
            }
        }
        if self.open {
            return Ok(Expr::Field(ident.to_string()));
        }
        Err(QbError::compile(source, format!("unknown variable {ident:?}")))
    }

    /// Parse expression text and bind its free variables.
    pub fn compile_text(&self, source: &str) -> QbResult<Expr> {
        parser::parse(source)?.bind(&mut |ident| self.resolve(ident, source))
    }
}

/// Distinct top-level field names of `rows`, in first-seen order.
pub fn columns_from_rows(rows: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for row in rows {
        for key in row.keys() {
            if seen.insert(key) {
                columns.push(key.to_string());
            }
        }
    }
    columns
}

/// A column ready to evaluate rows.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledColumn {
    name: String,
    source: String,
    expr: Expr,
    sort: Sort,
}

impl CompiledColumn {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression text, for diagnostics.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn calc(&self, row: &Record) -> QbResult<Value> {
        self.calc_in(&Frame::new(row))
    }

    /// Evaluate with edge keys or window bindings in the frame.
    pub fn calc_in(&self, frame: &Frame<'_>) -> QbResult<Value> {
        let value = self
            .expr
            .eval(frame)
            .map_err(|err| self.evaluation_error(frame.row, err.0))?;
        if let Value::Number(n) = &value {
            if !n.0.is_finite() {
                return Err(self.evaluation_error(frame.row, format!("produced {}", n.0)));
            }
        }
        Ok(value)
    }

    pub(crate) fn evaluation_error(&self, row: &Record, message: String) -> QbError {
        QbError::Evaluation {
            column: self.name.clone(),
            expression: self.source.clone(),
            row: row.to_string(),
            message,
        }
    }
}

/// A first-match switch over partition filters returning the partition key, when every
/// partition of `domain` carries a filter.
pub(crate) fn partition_switch(domain: Option<&DomainSpec>) -> QbResult<Option<Expr>> {
    let Some(domain) = domain.filter(|d| d.is_filter_covered()) else {
        return Ok(None);
    };
    let arms = domain
        .partitions
        .iter()
        .filter_map(|part| part.esfilter.as_ref().map(|filter| (filter, &part.key)))
        .map(|(filter, key)| Ok((compile_filter(filter)?, Expr::Literal(key.clone()))))
        .collect::<QbResult<Vec<_>>>()?;
    Ok(Some(Expr::Case {
        arms,
        fallback: None,
    }))
}

/// Compile a result column.
///
/// Numeric and boolean literals are compiled from their text form. Without a value, a domain
/// whose partitions all carry filters yields the matching partition's key; otherwise the
/// column is always null.
pub fn compile_column(spec: &ColumnSpec, scope: &Scope) -> QbResult<CompiledColumn> {
    let (source, expr) = match &spec.value {
        Some(Value::Text(text)) => (text.to_string(), scope.compile_text(text)?),
        Some(literal @ (Value::Number(_) | Value::Boolean(_))) => {
            let text = literal.to_string();
            let expr = scope.compile_text(&text)?;
            (text, expr)
        }
        Some(value @ Value::Object(_)) => (value.to_string(), structured(value)?),
        Some(value @ Value::List(_)) => {
            return Err(QbError::InvalidArgument(format!(
                "column {:?} has a list as its value: {value}",
                spec.name
            )))
        }
        None | Some(Value::Null) => match partition_switch(spec.domain.as_ref())? {
            Some(switch) => {
                log::debug!(
                    "column {:?} has no value, switching on its partition filters",
                    spec.name
                );
                ("<partition switch>".to_string(), switch)
            }
            None => {
                log::debug!("column {:?} has no value, it is always null", spec.name);
                ("null".to_string(), Expr::Literal(Value::Null))
            }
        },
    };
    Ok(CompiledColumn {
        name: spec.name.clone(),
        source,
        expr,
        sort: spec.sort.unwrap_or_default(),
    })
}

/// A compiled row predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    pub fn always() -> Self {
        Self {
            source: "true".to_string(),
            expr: Expr::literal(true),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, row: &Record) -> QbResult<bool> {
        self.matches_in(&Frame::new(row))
    }

    pub fn matches_in(&self, frame: &Frame<'_>) -> QbResult<bool> {
        self.expr
            .eval(frame)
            .map(|value| value.is_truthy())
            .map_err(|err| QbError::Evaluation {
                column: "where".to_string(),
                expression: self.source.clone(),
                row: frame.row.to_string(),
                message: err.0,
            })
    }
}

/// Compile a `where` clause. Absent or null clauses accept every row; text uses the expression
/// grammar and objects are structured filters.
pub fn compile_where(clause: Option<&Value>, scope: &Scope) -> QbResult<Predicate> {
    let expr = match clause {
        None | Some(Value::Null) => return Ok(Predicate::always()),
        Some(Value::Text(text)) => scope.compile_text(text)?,
        Some(Value::Boolean(b)) => Expr::literal(*b),
        Some(filter @ Value::Object(_)) => compile_filter(filter)?,
        Some(other) => {
            return Err(QbError::InvalidArgument(format!(
                "a where clause must be text or a filter, found {}",
                other.type_name()
            )))
        }
    };
    Ok(Predicate {
        source: clause.map(Value::to_string).unwrap_or_default(),
        expr,
    })
}

/// Multi-key row ordering; each key sorts in its own direction, ties keep input order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowComparator {
    keys: Vec<CompiledColumn>,
}

impl RowComparator {
    pub fn new(keys: Vec<CompiledColumn>) -> Self {
        Self { keys }
    }

    pub fn compile(specs: &[SortSpec], scope: &Scope) -> QbResult<Self> {
        let keys = specs
            .iter()
            .map(|spec| {
                let column = ColumnSpec {
                    name: spec.value().to_string(),
                    value: Some(Value::text(spec.value())),
                    sort: Some(spec.sort()),
                    ..ColumnSpec::default()
                };
                compile_column(&column, scope)
            })
            .collect::<QbResult<_>>()?;
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Evaluate every key for one row.
    pub fn keys(&self, frame: &Frame<'_>) -> QbResult<Vec<Value>> {
        self.keys.iter().map(|key| key.calc_in(frame)).collect()
    }

    pub fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((key, a), b) in self.keys.iter().zip(a).zip(b) {
            let ord = match key.sort() {
                Sort::Ascending => a.cmp(b),
                Sort::Descending => b.cmp(a),
                Sort::None => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `items`, each evaluated through `frame`.
    pub fn sort_by_frame<'f, T>(
        &self,
        items: &mut Vec<T>,
        frame: impl Fn(&T) -> Frame<'f>,
    ) -> QbResult<()> {
        self.sort_by_keys(items, |item| self.keys(&frame(item)))
    }

    pub fn sort_records(&self, rows: &mut Vec<Record>) -> QbResult<()> {
        self.sort_by_keys(rows, |row| self.keys(&Frame::new(row)))
    }

    fn sort_by_keys<T>(
        &self,
        items: &mut Vec<T>,
        keys: impl Fn(&T) -> QbResult<Vec<Value>>,
    ) -> QbResult<()> {
        if self.keys.is_empty() {
            return Ok(());
        }
        let mut keyed = items
            .drain(..)
            .map(|item| Ok((keys(&item)?, item)))
            .collect::<QbResult<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| self.compare_keys(a, b));
        items.extend(keyed.into_iter().map(|(_, item)| item));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Partition, SetDomain};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn row(json: serde_json::Value) -> Record {
        Record::from_json(json).unwrap()
    }

    #[test]
    fn column_over_source_columns() {
        let scope = Scope::new(["x"]);
        let column = compile_column(&ColumnSpec::new("y", "x*2"), &scope).unwrap();
        assert_eq!(column.calc(&row(json!({"x": 5}))).unwrap(), Value::from(10));
    }

    #[test]
    fn unknown_variable_is_a_compile_error() {
        let scope = Scope::new(["x"]);
        let err = compile_column(&ColumnSpec::new("y", "x + z"), &scope).unwrap_err();
        assert!(matches!(err, QbError::Compile { expression, .. } if expression == "x + z"));
    }

    #[test]
    fn dotted_identifiers_bind_the_longest_known_prefix() {
        let scope = Scope::new(["build", "run.suite"]);
        let column = compile_column(&ColumnSpec::new("c", "build.platform + '/' + run.suite"), &scope)
            .unwrap();
        let r = row(json!({"build": {"platform": "linux"}, "run.suite": "mochitest"}));
        assert_eq!(column.calc(&r).unwrap(), Value::from("linux/mochitest"));
    }

    #[test]
    fn literals_are_compiled_from_text() {
        let scope = Scope::new(Vec::<String>::new());
        let column = compile_column(&ColumnSpec::new("c", 42), &scope).unwrap();
        assert_eq!(column.source(), "42");
        assert_eq!(column.calc(&Record::new()).unwrap(), Value::from(42));
    }

    #[test]
    fn missing_value_switches_on_partition_filters() {
        let domain = DomainSpec::set(vec![
            Partition::new("fast", 0).with_esfilter(Value::from_json(
                json!({"range": {"duration": {"lt": 10}}}),
            )),
            Partition::new("slow", 1).with_esfilter(Value::from_json(
                json!({"range": {"duration": {"gte": 10}}}),
            )),
        ]);
        let spec = ColumnSpec {
            name: "speed".into(),
            domain: Some(domain),
            ..ColumnSpec::default()
        };
        let column = compile_column(&spec, &Scope::new(["duration"])).unwrap();
        assert_eq!(column.calc(&row(json!({"duration": 3}))).unwrap(), Value::from("fast"));
        assert_eq!(column.calc(&row(json!({"duration": 30}))).unwrap(), Value::from("slow"));
        assert_eq!(column.calc(&row(json!({}))).unwrap(), Value::Null);

        let plain = ColumnSpec {
            name: "nothing".into(),
            ..ColumnSpec::default()
        };
        let column = compile_column(&plain, &Scope::new(["duration"])).unwrap();
        assert_eq!(column.calc(&row(json!({"duration": 3}))).unwrap(), Value::Null);
    }

    #[test]
    fn evaluation_errors_name_column_and_row() {
        let column = compile_column(&ColumnSpec::new("ratio", "a / b"), &Scope::new(["a", "b"]))
            .unwrap();
        match column.calc(&row(json!({"a": 1, "b": 0}))).unwrap_err() {
            QbError::Evaluation {
                column,
                expression,
                row,
                ..
            } => {
                assert_eq!(column, "ratio");
                assert_eq!(expression, "a / b");
                assert_eq!(row, r#"{"a":1,"b":0}"#);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let text = compile_column(&ColumnSpec::new("bad", "a * 2"), &Scope::new(["a"])).unwrap();
        assert!(text.calc(&row(json!({"a": "x"}))).is_err());
    }

    #[test]
    fn edge_and_domain_names_bind_to_partition_keys() {
        let domain = SetDomain::new(Some("platforms".into()), vec![Partition::new("linux", 0)]);
        let edges = [Edge::new("platform", Arc::new(domain))];
        let scope = Scope::new(["n"]).with_edges(&edges);
        let column =
            compile_column(&ColumnSpec::new("c", "platforms + ':' + platform"), &scope).unwrap();
        let r = Record::new();
        let keys = [Value::from("linux")];
        let frame = Frame::new(&r).with_edges(&keys);
        assert_eq!(column.calc_in(&frame).unwrap(), Value::from("linux:linux"));
    }

    #[test]
    fn where_defaults_to_true() {
        let scope = Scope::new(["x"]);
        let predicate = compile_where(None, &scope).unwrap();
        assert!(predicate.matches(&Record::new()).unwrap());
        let predicate = compile_where(Some(&Value::from("x > 2")), &scope).unwrap();
        assert!(predicate.matches(&row(json!({"x": 3}))).unwrap());
        assert!(!predicate.matches(&row(json!({"x": null}))).unwrap());
        let filter = Value::from_json(json!({"term": {"x": 1}}));
        let predicate = compile_where(Some(&filter), &scope).unwrap();
        assert!(predicate.matches(&row(json!({"x": 1}))).unwrap());
    }

    #[test]
    fn sort_keywords() {
        for (json, order) in [
            (json!("ascending"), 1),
            (json!("descending"), -1),
            (json!("none"), 0),
            (json!(1), 1),
            (json!(-1), -1),
            (json!(0), 0),
        ] {
            assert_eq!(Sort::parse(&Value::from_json(json)).unwrap().sort_order(), order);
        }
        let err = Sort::parse(&Value::from("sideways")).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(serde_json::from_value::<Sort>(json!(2)).is_err());
    }

    #[test]
    fn comparator_sorts_by_several_keys() {
        let specs: Vec<SortSpec> = serde_json::from_value(json!([
            "a",
            {"value": "b", "sort": "descending"},
        ]))
        .unwrap();
        let comparator = RowComparator::compile(&specs, &Scope::new(["a", "b"])).unwrap();
        let mut rows = vec![
            row(json!({"a": 2, "b": 1})),
            row(json!({"a": 1, "b": 1})),
            row(json!({"a": 1, "b": 5})),
            row(json!({"b": 0})),
        ];
        comparator.sort_records(&mut rows).unwrap();
        let pairs: Vec<String> = rows.iter().map(Record::to_string).collect();
        assert_eq!(
            pairs,
            vec![
                r#"{"b":0}"#,
                r#"{"a":1,"b":5}"#,
                r#"{"a":1,"b":1}"#,
                r#"{"a":2,"b":1}"#,
            ]
        );
    }

    #[test]
    fn comparator_sorts_indices_through_borrowed_frames() {
        let rows = [
            row(json!({"v": 3})),
            row(json!({"v": 1})),
            row(json!({"v": 2})),
            row(json!({"v": 1, "tie": true})),
        ];
        let specs: Vec<SortSpec> = serde_json::from_value(json!(["v"])).unwrap();
        let comparator = RowComparator::compile(&specs, &Scope::new(["v"])).unwrap();
        let mut order: Vec<usize> = (0..rows.len()).collect();
        comparator
            .sort_by_frame(&mut order, |&i| Frame::new(&rows[i]))
            .unwrap();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn columns_are_collected_in_first_seen_order() {
        let rows = [row(json!({"b": 1, "a": 2})), row(json!({"c": 3, "a": 4}))];
        assert_eq!(columns_from_rows(&rows), vec!["a", "b", "c"]);
    }
}
