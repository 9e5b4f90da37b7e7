mod aggregate;
mod analytic;
mod column;
mod config;
mod cube;
mod domain;
mod error;
mod esfilter;
mod expr;
mod matrix;
mod parser;
mod query;
mod value;

pub use crate::aggregate::{Accumulator, Aggregate};
pub use crate::analytic::{apply_analytics, Analytic, AnalyticSpec};
pub use crate::column::{
    columns_from_rows, compile_column, compile_where, ColumnSpec, CompiledColumn, Predicate,
    RowComparator, Scope, Select, Sort, SortClause, SortSpec,
};
pub use crate::config::EngineConfig;
pub use crate::cube::Cube;
pub use crate::domain::{
    Domain, DomainKind, DomainSpec, Edge, EdgeSpec, Partition, RangeDomain, SetDomain,
};
pub use crate::error::{QbError, QbResult};
pub use crate::esfilter::compile_filter;
pub use crate::expr::{
    compile_expression, BinaryOp, EvalError, Expr, Expression, Frame, Function, UnaryOp, Var,
};
pub use crate::matrix::{Coordinates, Matrix, Nested};
pub use crate::parser::parse;
pub use crate::query::{run, Query, QueryResult};
pub use crate::value::{cmp_key, cmp_value, Record, Value};
