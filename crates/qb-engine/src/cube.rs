//! Dense cubes: one [`Matrix`] per select column, one axis per edge.
use crate::aggregate::Accumulator;
use crate::column::{compile_column, partition_switch, ColumnSpec, Scope, Select};
use crate::config::EngineConfig;
use crate::domain::{DomainKind, Edge, EdgeSpec, SetDomain};
use crate::error::{QbError, QbResult};
use crate::expr::{structured, Expr, Frame};
use crate::matrix::Matrix;
use crate::value::{Record, Value};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Cube {
    edges: Vec<Edge>,
    select: Vec<ColumnSpec>,
    single: bool,
    columns: Vec<Matrix<Value>>,
}

impl Cube {
    /// A cube with every cell holding its column's default.
    pub fn new_instance(edges: Vec<Edge>, select: Select) -> Self {
        let dims: Vec<usize> = edges.iter().map(Edge::slots).collect();
        let columns = select
            .columns()
            .iter()
            .map(|column| Matrix::new(&dims, column.default_value()))
            .collect();
        Self {
            edges,
            single: select.is_single(),
            select: select.columns().to_vec(),
            columns,
        }
    }

    /// Route every row to its cell and fold the select values in with their aggregates.
    ///
    /// A row whose value matches no partition lands in the null slot of that edge, or is
    /// skipped when the edge does not allow nulls.
    pub fn from_rows(
        edges: &[EdgeSpec],
        select: &Select,
        scope: &Scope,
        rows: &[Record],
        config: &EngineConfig,
    ) -> QbResult<Self> {
        let edges = edges
            .iter()
            .map(|spec| compile_edge(spec, scope, rows, config))
            .collect::<QbResult<Vec<_>>>()?;
        let cells = edges
            .iter()
            .try_fold(1usize, |cells, edge| cells.checked_mul(edge.slots()));
        match cells {
            Some(cells) if cells <= config.max_cube_cells => {}
            _ => {
                return Err(QbError::InvalidConfiguration(format!(
                    "cube of {cells:?} cells exceeds the limit of {}",
                    config.max_cube_cells
                )))
            }
        }

        let column_scope = scope.clone().with_edges(&edges);
        let compiled = select
            .columns()
            .iter()
            .map(|column| compile_column(column, &column_scope))
            .collect::<QbResult<Vec<_>>>()?;
        let dims: Vec<usize> = edges.iter().map(Edge::slots).collect();
        let mut accumulators: Vec<Matrix<Option<Accumulator>>> =
            compiled.iter().map(|_| Matrix::new(&dims, None)).collect();

        let mut coord = vec![0; edges.len()];
        let mut keys = vec![Value::Null; edges.len()];
        'rows: for row in rows {
            for (i, edge) in edges.iter().enumerate() {
                let value = edge.eval(row)?;
                let Some(index) = edge.locate(&value) else {
                    log::trace!("edge {:?} has no partition for {value}, row skipped", edge.name);
                    continue 'rows;
                };
                coord[i] = index;
                keys[i] = edge.key_at(index);
            }
            let frame = Frame::new(row).with_edges(&keys);
            for ((column, spec), cells) in compiled
                .iter()
                .zip(select.columns())
                .zip(&mut accumulators)
            {
                let value = column.calc_in(&frame)?;
                cells
                    .get_mut(&coord)?
                    .get_or_insert_with(|| spec.aggregate.accumulator())
                    .add(value)
                    .map_err(|err| column.evaluation_error(row, err.0))?;
            }
        }

        let columns = accumulators
            .iter()
            .zip(select.columns())
            .map(|(cells, spec)| {
                let default = spec.default_value();
                cells.map(|cell, _| match cell {
                    Some(acc) => acc.finish(),
                    None => default.clone(),
                })
            })
            .collect();
        Ok(Self {
            edges,
            select: select.columns().to_vec(),
            single: select.is_single(),
            columns,
        })
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn select(&self) -> &[ColumnSpec] {
        &self.select
    }

    /// Cells hold a scalar rather than an object of columns.
    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn dims(&self) -> Vec<usize> {
        self.edges.iter().map(Edge::slots).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Matrix<Value>> {
        self.select
            .iter()
            .position(|column| column.name == name)
            .map(|i| &self.columns[i])
    }

    pub fn cell(&self, coord: &[usize]) -> QbResult<Value> {
        if self.single {
            if let Some(column) = self.columns.first() {
                return column.get(coord).cloned();
            }
        }
        let mut record = Record::new();
        for (spec, column) in self.select.iter().zip(&self.columns) {
            record.insert(spec.name.clone(), column.get(coord)?.clone());
        }
        Ok(Value::from(record))
    }

    /// All cells as one matrix.
    pub fn data(&self) -> Matrix<Value> {
        if self.single {
            if let Some(column) = self.columns.first() {
                return column.clone();
            }
        }
        let mut offset = 0;
        Matrix::from_fn(&self.dims(), |_| {
            let record: Record = self
                .select
                .iter()
                .zip(&self.columns)
                .map(|(spec, column)| (spec.name.clone(), column.values()[offset].clone()))
                .collect();
            offset += 1;
            Value::from(record)
        })
    }

    /// Reorder edges and select columns by name.
    pub fn transpose(&self, edges: &[&str], select: &[&str]) -> QbResult<Cube> {
        if edges.len() != self.edges.len() {
            return Err(QbError::InvalidArgument(format!(
                "transpose needs all {} edges, got {}",
                self.edges.len(),
                edges.len()
            )));
        }
        let order = edges
            .iter()
            .map(|&name| {
                self.edges
                    .iter()
                    .position(|edge| edge.name == name)
                    .ok_or_else(|| QbError::Remap {
                        kind: "edge",
                        name: name.to_string(),
                    })
            })
            .collect::<QbResult<Vec<_>>>()?;
        let picks = select
            .iter()
            .map(|&name| {
                self.select
                    .iter()
                    .position(|column| column.name == name)
                    .ok_or_else(|| QbError::Remap {
                        kind: "column",
                        name: name.to_string(),
                    })
            })
            .collect::<QbResult<Vec<_>>>()?;

        Ok(Cube {
            edges: order.iter().map(|&i| self.edges[i].clone()).collect(),
            select: picks.iter().map(|&i| self.select[i].clone()).collect(),
            single: self.single && picks.len() == 1,
            columns: picks
                .iter()
                .map(|&i| self.columns[i].permute_axes(&order))
                .collect::<QbResult<_>>()?,
        })
    }

    /// One record per partition of the single edge: the edge name bound to the partition key,
    /// plus every select column.
    pub fn to_list(&self) -> QbResult<Vec<Record>> {
        let [edge] = self.edges.as_slice() else {
            return Err(QbError::UnsupportedShape(format!(
                "to_list needs exactly one edge, this cube has {}",
                self.edges.len()
            )));
        };
        let mut out = Vec::with_capacity(edge.domain.partitions().len());
        for part in edge.domain.partitions() {
            let mut record = Record::new().with(edge.name.clone(), edge.domain.get_key(part).clone());
            for (spec, column) in self.select.iter().zip(&self.columns) {
                record.insert(spec.name.clone(), column.get(&[part.data_index])?.clone());
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Combine two cubes of the same shape cell by cell.
    ///
    /// A cell still holding its column default takes the other side's value; otherwise the
    /// column aggregate merges the two, and columns without a merge rule must agree.
    pub fn union(&self, other: &Cube) -> QbResult<Cube> {
        let names = |cube: &Cube| cube.edges.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
        if names(self) != names(other) {
            return Err(QbError::InvalidArgument(format!(
                "can not union cubes over edges {:?} and {:?}",
                names(self),
                names(other)
            )));
        }
        let dims = self.dims();
        if dims != other.dims() {
            return Err(QbError::InvalidArgument(format!(
                "can not union cubes of shapes {dims:?} and {:?}",
                other.dims()
            )));
        }
        let columns = |cube: &Cube| cube.select.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        if columns(self) != columns(other) {
            return Err(QbError::InvalidArgument(format!(
                "can not union cubes selecting {:?} and {:?}",
                columns(self),
                columns(other)
            )));
        }

        let mut merged = Vec::with_capacity(self.columns.len());
        for ((spec, a), b) in self.select.iter().zip(&self.columns).zip(&other.columns) {
            let default = spec.default_value();
            let data = a
                .values()
                .iter()
                .zip(b.values())
                .map(|(a, b)| merge_cell(spec, &default, a, b))
                .collect::<QbResult<Vec<_>>>()?;
            merged.push(Matrix::from_parts(&dims, data)?);
        }
        Ok(Cube {
            edges: self.edges.clone(),
            select: self.select.clone(),
            single: self.single,
            columns: merged,
        })
    }

    /// `{"edges": [...], "select": ..., "cube": nested lists}`.
    pub fn to_json(&self) -> serde_json::Value {
        let edges: Vec<serde_json::Value> = self
            .edges
            .iter()
            .map(|edge| {
                serde_json::json!({
                    "name": edge.name,
                    "allowNulls": edge.allow_nulls,
                    "domain": {
                        "partitions": edge.domain.partitions(),
                    },
                })
            })
            .collect();
        let select = if self.single {
            serde_json::json!(self.select.first())
        } else {
            serde_json::json!(self.select)
        };
        serde_json::json!({
            "edges": edges,
            "select": select,
            "cube": self.data().to_value().to_json(),
        })
    }
}

fn merge_cell(spec: &ColumnSpec, default: &Value, a: &Value, b: &Value) -> QbResult<Value> {
    if a == default {
        return Ok(b.clone());
    }
    if b == default {
        return Ok(a.clone());
    }
    if let Some(merged) = spec.aggregate.merge(a, b) {
        return Ok(merged);
    }
    if a == b {
        return Ok(a.clone());
    }
    Err(QbError::InvalidConfiguration(format!(
        "column {:?} has conflicting values {a} and {b} and no rule to merge them",
        spec.name
    )))
}

fn compile_edge(
    spec: &EdgeSpec,
    scope: &Scope,
    rows: &[Record],
    config: &EngineConfig,
) -> QbResult<Edge> {
    let (source, value) = match &spec.value {
        Some(Value::Text(text)) => (text.to_string(), scope.compile_text(text)?),
        Some(value @ Value::Object(_)) => (value.to_string(), structured(value)?),
        None | Some(Value::Null) => match partition_switch(spec.domain.as_ref())? {
            Some(switch) => {
                log::debug!("edge {:?} routes rows by its partition filters", spec.name);
                ("<partition switch>".to_string(), switch)
            }
            None => (spec.name.clone(), Expr::Field(spec.name.clone())),
        },
        Some(other) => {
            return Err(QbError::InvalidArgument(format!(
                "edge {:?} value must be an expression, found {other}",
                spec.name
            )))
        }
    };

    let domain = spec.domain.clone().unwrap_or_default();
    let mut edge = Edge {
        name: spec.name.clone(),
        source,
        value,
        domain: Arc::new(SetDomain::default()),
        allow_nulls: spec.allow_nulls.unwrap_or(config.default_allow_nulls),
    };
    let observed = if domain.kind() == DomainKind::Default {
        rows.iter()
            .map(|row| edge.eval(row))
            .collect::<QbResult<Vec<_>>>()?
    } else {
        Vec::new()
    };
    edge.domain = domain.resolve(&observed, config.max_cube_cells)?;
    Ok(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn edge(name: &str, keys: &[&str]) -> Edge {
        Edge::new(name, Arc::new(SetDomain::from_keys(keys.iter().copied())))
    }

    #[test]
    fn new_instance_fills_defaults() {
        let select = Select::Many(vec![
            ColumnSpec::new("c", "x").aggregate(Aggregate::Count),
            ColumnSpec::new("l", "x").aggregate(Aggregate::List),
            ColumnSpec::new("v", "x"),
        ]);
        let cube = Cube::new_instance(vec![edge("a", &["1", "2"])], select);
        assert_eq!(
            cube.cell(&[1]).unwrap().to_json(),
            json!({"c": 0, "l": [], "v": null})
        );
        assert!(cube.cell(&[2]).is_err());
    }

    #[test]
    fn null_slot_extends_the_axis() {
        let with_nulls = edge("a", &["x", "y"]).allow_nulls(true);
        let cube = Cube::new_instance(vec![with_nulls], Select::One(ColumnSpec::new("n", "n")));
        assert_eq!(cube.dims(), vec![3]);
    }

    #[test]
    fn to_list_needs_one_edge() {
        let select = Select::One(ColumnSpec::new("n", "n"));
        let cube = Cube::new_instance(vec![edge("a", &["x"]), edge("b", &["y"])], select.clone());
        assert!(matches!(cube.to_list(), Err(QbError::UnsupportedShape(_))));

        let cube = Cube::new_instance(vec![edge("a", &["x", "y"])], select);
        let list = cube.to_list().unwrap();
        assert_eq!(
            list.iter().map(Record::to_json).collect::<Vec<_>>(),
            vec![json!({"a": "x", "n": null}), json!({"a": "y", "n": null})]
        );
    }

    #[test]
    fn transpose_rejects_unknown_names() {
        let cube = Cube::new_instance(
            vec![edge("a", &["x"]), edge("b", &["y"])],
            Select::One(ColumnSpec::new("n", "n")),
        );
        let err = cube.transpose(&["b", "c"], &["n"]).unwrap_err();
        assert!(matches!(err, QbError::Remap { kind: "edge", .. }));
        let err = cube.transpose(&["b", "a"], &["m"]).unwrap_err();
        assert!(matches!(err, QbError::Remap { kind: "column", .. }));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn union_prefers_non_default_then_merges() {
        let select = Select::One(ColumnSpec::new("n", "n").aggregate(Aggregate::Sum));
        let mut a = Cube::new_instance(vec![edge("e", &["x", "y"])], select.clone());
        let mut b = Cube::new_instance(vec![edge("e", &["x", "y"])], select);
        a.columns[0].set(&[0], Value::from(1)).unwrap();
        b.columns[0].set(&[0], Value::from(2)).unwrap();
        b.columns[0].set(&[1], Value::from(5)).unwrap();
        let merged = a.union(&b).unwrap();
        assert_eq!(merged.data().to_value().to_json(), json!([3, 5]));
        assert_eq!(merged.union(&merged).unwrap().data().to_value().to_json(), json!([6, 10]));

        let plain = Select::One(ColumnSpec::new("n", "n"));
        let mut a = Cube::new_instance(vec![edge("e", &["x"])], plain.clone());
        let mut b = Cube::new_instance(vec![edge("e", &["x"])], plain);
        a.columns[0].set(&[0], Value::from(1)).unwrap();
        b.columns[0].set(&[0], Value::from(2)).unwrap();
        assert!(a.union(&b).unwrap_err().is_configuration_error());

        let other = Cube::new_instance(
            vec![edge("f", &["x"])],
            Select::One(ColumnSpec::new("n", "n")),
        );
        assert!(matches!(a.union(&other), Err(QbError::InvalidArgument(_))));
    }

    #[test]
    fn cell_limit_is_enforced() {
        let rows = vec![Record::new().with("e", "x")];
        let spec: EdgeSpec = serde_json::from_value(json!({"name": "e"})).unwrap();
        let config = EngineConfig {
            max_cube_cells: 1,
            ..EngineConfig::default()
        };
        let err = Cube::from_rows(
            &[spec],
            &Select::One(ColumnSpec::new("n", "e")),
            &Scope::new(["e"]),
            &rows,
            &config,
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
