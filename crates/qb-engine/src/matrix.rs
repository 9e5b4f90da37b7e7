//! Dense N-dimensional arrays.
//!
//! A [`Matrix`] stores its elements in one row-major buffer together with the extent of every
//! axis. Dimensionality is a runtime property: the same type backs a one-edge cube, a
//! three-edge cube, and the zero-edge case (a single cell addressed by the empty coordinate).
use crate::error::{QbError, QbResult};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

/// Ragged nested lists, produced when a traversal drops elements.
#[derive(Clone, Debug, PartialEq)]
pub enum Nested<T> {
    Leaf(T),
    List(Vec<Nested<T>>),
}

impl<T: Clone> Matrix<T> {
    pub fn new(dims: &[usize], fill: T) -> Self {
        Self {
            dims: dims.to_vec(),
            data: vec![fill; dims.iter().product()],
        }
    }

    /// Reorder the axes: axis `i` of the result is axis `order[i]` of `self`.
    pub fn permute_axes(&self, order: &[usize]) -> QbResult<Self> {
        let num = self.dims.len();
        let mut seen = vec![false; num];
        if order.len() != num
            || order
                .iter()
                .any(|&axis| axis >= num || std::mem::replace(&mut seen[axis], true))
        {
            return Err(QbError::InvalidArgument(format!(
                "{order:?} is not a permutation of {num} axes"
            )));
        }

        let new_dims: Vec<usize> = order.iter().map(|&axis| self.dims[axis]).collect();
        let strides = strides(&self.dims);
        let mut old = vec![0; num];
        Ok(Matrix::from_fn(&new_dims, |coord| {
            for (i, &axis) in order.iter().enumerate() {
                old[axis] = coord[i];
            }
            let offset: usize = old.iter().zip(&strides).map(|(c, s)| c * s).sum();
            self.data[offset].clone()
        }))
    }
}

impl<T> Matrix<T> {
    /// Allocate a matrix of known shape, computing every element from its coordinate.
    pub fn from_fn(dims: &[usize], mut init: impl FnMut(&[usize]) -> T) -> Self {
        let len: usize = dims.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut coord = vec![0; dims.len()];
        for _ in 0..len {
            data.push(init(&coord));
            advance(&mut coord, dims);
        }
        Self {
            dims: dims.to_vec(),
            data,
        }
    }

    /// Wrap a row-major buffer; its length must match the extents.
    pub fn from_parts(dims: &[usize], data: Vec<T>) -> QbResult<Self> {
        let len: usize = dims.iter().product();
        if data.len() != len {
            return Err(QbError::InvalidArgument(format!(
                "extents {dims:?} hold {len} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            dims: dims.to_vec(),
            data,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of axes.
    pub fn num(&self) -> usize {
        self.dims.len()
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All leaves in traversal order.
    pub fn values(&self) -> &[T] {
        &self.data
    }

    pub fn into_values(self) -> Vec<T> {
        self.data
    }

    fn offset(&self, coord: &[usize]) -> QbResult<usize> {
        if coord.len() != self.dims.len() {
            return Err(QbError::InvalidArgument(format!(
                "expecting a coordinate with {} values, got {}",
                self.dims.len(),
                coord.len()
            )));
        }
        let mut offset = 0;
        for (axis, (&c, &extent)) in coord.iter().zip(&self.dims).enumerate() {
            if c >= extent {
                return Err(QbError::InvalidArgument(format!(
                    "coordinate {coord:?} is out of range on axis {axis} (extent {extent})"
                )));
            }
            offset = offset * extent + c;
        }
        Ok(offset)
    }

    pub fn get(&self, coord: &[usize]) -> QbResult<&T> {
        let offset = self.offset(coord)?;
        Ok(&self.data[offset])
    }

    pub fn get_mut(&mut self, coord: &[usize]) -> QbResult<&mut T> {
        let offset = self.offset(coord)?;
        Ok(&mut self.data[offset])
    }

    pub fn set(&mut self, coord: &[usize], value: T) -> QbResult<()> {
        *self.get_mut(coord)? = value;
        Ok(())
    }

    /// Visit every leaf, outermost axis first, ascending index on each axis.
    ///
    /// The coordinate slice is reused between calls; copy it to keep it.
    pub fn forall(&self, mut visit: impl FnMut(&T, &[usize])) {
        let mut coord = vec![0; self.dims.len()];
        for value in &self.data {
            visit(value, &coord);
            advance(&mut coord, &self.dims);
        }
    }

    /// Same shape, every leaf transformed.
    pub fn map<U>(&self, mut transform: impl FnMut(&T, &[usize]) -> U) -> Matrix<U> {
        let mut coord = vec![0; self.dims.len()];
        let mut data = Vec::with_capacity(self.data.len());
        for value in &self.data {
            data.push(transform(value, &coord));
            advance(&mut coord, &self.dims);
        }
        Matrix {
            dims: self.dims.clone(),
            data,
        }
    }

    /// Descend `depth` axes and, inside every list found there, keep the elements for which
    /// `select` returns `Some`.
    ///
    /// `select` receives the element's block of leaves (a single leaf when `depth` is the last
    /// axis), its index along axis `depth` and the coordinate prefix leading to the list.
    pub fn filter<U>(
        &self,
        depth: usize,
        mut select: impl FnMut(&[T], usize, &[usize]) -> Option<U>,
    ) -> QbResult<Nested<U>> {
        if depth >= self.dims.len() {
            return Err(QbError::InvalidArgument(format!(
                "can not filter at depth {depth} of a {}-dimensional matrix",
                self.dims.len()
            )));
        }
        let strides = strides(&self.dims);
        let mut prefix = Vec::with_capacity(depth);
        Ok(self.filter_level(0, 0, depth, &strides, &mut prefix, &mut select))
    }

    fn filter_level<U>(
        &self,
        axis: usize,
        offset: usize,
        depth: usize,
        strides: &[usize],
        prefix: &mut Vec<usize>,
        select: &mut impl FnMut(&[T], usize, &[usize]) -> Option<U>,
    ) -> Nested<U> {
        let stride = strides[axis];
        if axis == depth {
            let kept = (0..self.dims[axis])
                .filter_map(|i| {
                    let start = offset + i * stride;
                    select(&self.data[start..start + stride], i, &prefix[..])
                })
                .map(Nested::Leaf)
                .collect();
            return Nested::List(kept);
        }
        let mut out = Vec::with_capacity(self.dims[axis]);
        for i in 0..self.dims[axis] {
            prefix.push(i);
            out.push(self.filter_level(axis + 1, offset + i * stride, depth, strides, prefix, select));
            prefix.pop();
        }
        Nested::List(out)
    }

    /// Every coordinate of the cartesian product, in traversal order.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(&self.dims)
    }
}

impl Matrix<Value> {
    /// Build from a nested-list literal.
    ///
    /// Extents are read by descending into the first element of every level until a non-list
    /// value is found; every other branch must then have the same extents.
    pub fn from_value(value: &Value) -> QbResult<Self> {
        if !matches!(value, Value::List(_)) {
            return Err(QbError::InvalidArgument(format!(
                "expecting a nested list, found {}",
                value.type_name()
            )));
        }
        let mut dims = Vec::new();
        let mut probe = value;
        while let Value::List(items) = probe {
            dims.push(items.len());
            match items.first() {
                Some(first) => probe = first,
                None => break,
            }
        }

        let mut data = Vec::with_capacity(dims.iter().product());
        collect_leaves(value, &dims, &mut data)?;
        Ok(Self { dims, data })
    }

    /// Convert back into nested lists.
    pub fn to_value(&self) -> Value {
        fn build(data: &[Value], dims: &[usize]) -> Value {
            let Some((&extent, rest)) = dims.split_first() else {
                return data[0].clone();
            };
            let block: usize = rest.iter().product();
            Value::list((0..extent).map(|i| build(&data[i * block..(i + 1) * block], rest)))
        }
        if self.data.is_empty() {
            // Some axis has extent zero; rebuild the shape down to that axis.
            fn empty(dims: &[usize]) -> Value {
                match dims.split_first() {
                    Some((0, _)) | None => Value::list(Vec::new()),
                    Some((&extent, rest)) => Value::list((0..extent).map(|_| empty(rest))),
                }
            }
            return empty(&self.dims);
        }
        build(&self.data, &self.dims)
    }
}

fn collect_leaves(value: &Value, dims: &[usize], out: &mut Vec<Value>) -> QbResult<()> {
    let Some((&extent, rest)) = dims.split_first() else {
        out.push(value.clone());
        return Ok(());
    };
    match value {
        Value::List(items) if items.len() == extent => {
            for item in items.iter() {
                collect_leaves(item, rest, out)?;
            }
            Ok(())
        }
        other => Err(QbError::InvalidArgument(format!(
            "nested list is not rectangular: expecting {extent} elements, found {other}"
        ))),
    }
}

impl<T> From<Nested<T>> for Value
where
    T: Into<Value>,
{
    fn from(nested: Nested<T>) -> Self {
        match nested {
            Nested::Leaf(value) => value.into(),
            Nested::List(items) => Value::list(items.into_iter().map(Value::from)),
        }
    }
}

fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Odometer increment, innermost axis fastest.
fn advance(coord: &mut [usize], dims: &[usize]) {
    for axis in (0..coord.len()).rev() {
        coord[axis] += 1;
        if coord[axis] < dims[axis] {
            return;
        }
        coord[axis] = 0;
    }
}

/// Iterator over a cartesian product of extents.
#[derive(Clone, Debug)]
pub struct Coordinates {
    dims: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Coordinates {
    pub fn new(dims: &[usize]) -> Self {
        let next = (!dims.contains(&0)).then(|| vec![0; dims.len()]);
        Self {
            dims: dims.to_vec(),
            next,
        }
    }
}

impl Iterator for Coordinates {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        advance(&mut following, &self.dims);
        if following.iter().any(|&c| c != 0) {
            self.next = Some(following);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn literal(json: serde_json::Value) -> Value {
        Value::from_json(json)
    }

    #[test]
    fn extents_are_inferred_from_nested_literal() {
        let m = Matrix::from_value(&literal(json!([[1, 2, 3], [4, 5, 6]]))).unwrap();
        assert_eq!(m.dims(), &[2, 3]);
        assert_eq!(m.get(&[1, 2]).unwrap(), &Value::from(6));
    }

    #[test]
    fn ragged_literal_is_rejected() {
        let err = Matrix::from_value(&literal(json!([[1, 2], [3]]))).unwrap_err();
        assert!(matches!(err, QbError::InvalidArgument(_)));

        let err = Matrix::from_value(&Value::from(3)).unwrap_err();
        assert!(matches!(err, QbError::InvalidArgument(_)));
    }

    #[test]
    fn coordinate_length_must_match_dimensionality() {
        let mut m = Matrix::new(&[2, 2], 0);
        assert!(matches!(m.get(&[1]), Err(QbError::InvalidArgument(_))));
        assert!(matches!(m.set(&[0, 0, 0], 1), Err(QbError::InvalidArgument(_))));
        assert!(matches!(m.get(&[2, 0]), Err(QbError::InvalidArgument(_))));
        m.set(&[1, 0], 7).unwrap();
        assert_eq!(m.values(), &[0, 0, 7, 0]);
    }

    #[test]
    fn forall_visits_row_major() {
        let m = Matrix::from_fn(&[2, 2], |c| c[0] * 10 + c[1]);
        let mut seen = Vec::new();
        m.forall(|v, coord| seen.push((*v, coord.to_vec())));
        assert_eq!(
            seen,
            vec![
                (0, vec![0, 0]),
                (1, vec![0, 1]),
                (10, vec![1, 0]),
                (11, vec![1, 1]),
            ]
        );
    }

    #[test]
    fn identity_map_round_trips_the_literal() {
        let source = literal(json!([[[1], [2]], [[3], [4]], [[5], [6]]]));
        let m = Matrix::from_value(&source).unwrap();
        assert_eq!(m.map(|v, _| v.clone()).to_value(), source);
    }

    #[test]
    fn filter_keeps_selected_elements_of_the_inner_lists() {
        let m = Matrix::from_fn(&[2, 3], |c| (c[0] * 3 + c[1]) as i64);
        let odd = m
            .filter(1, |block, _, _| (block[0] % 2 == 1).then_some(block[0]))
            .unwrap();
        assert_eq!(Value::from(odd), literal(json!([[1], [3, 5]])));

        let rows = m
            .filter(0, |block, i, prefix| {
                assert!(prefix.is_empty());
                (i == 1).then(|| block.iter().sum::<i64>())
            })
            .unwrap();
        assert_eq!(rows, Nested::List(vec![Nested::Leaf(12)]));

        assert!(m.filter(2, |_, _, _| Some(0)).is_err());
    }

    #[test]
    fn permute_axes_swaps_extents() {
        let m = Matrix::from_fn(&[2, 3], |c| (c[0], c[1]));
        let t = m.permute_axes(&[1, 0]).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.get(&[2, 1]).unwrap(), &(1, 2));
        assert_eq!(t.permute_axes(&[1, 0]).unwrap(), m);
        assert!(m.permute_axes(&[0, 0]).is_err());
    }

    #[test]
    fn zero_dimensional_matrix_has_one_cell() {
        let m = Matrix::new(&[], Value::from("only"));
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&[]).unwrap(), &Value::from("only"));
        assert_eq!(m.coordinates().collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(m.to_value(), Value::from("only"));
    }

    #[test]
    fn empty_axis_yields_no_coordinates() {
        let m = Matrix::new(&[2, 0], 0);
        assert!(m.is_empty());
        assert_eq!(m.coordinates().count(), 0);
        assert_eq!(m.map(|v, _| Value::from(*v)).to_value(), literal(json!([[], []])));
    }
}
