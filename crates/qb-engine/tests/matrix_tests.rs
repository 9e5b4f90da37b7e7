use proptest::prelude::*;
use qb_engine::{Matrix, Nested, QbError, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn forall_visits_the_cartesian_product_once(dims in proptest::collection::vec(0usize..5, 0..4)) {
        let matrix = Matrix::new(&dims, 0u8);
        let mut visited = Vec::new();
        matrix.forall(|_, coord| visited.push(coord.to_vec()));
        for coord in &visited {
            prop_assert_eq!(coord.len(), dims.len());
            prop_assert!(coord.iter().zip(&dims).all(|(c, d)| c < d));
        }
        let seen: HashSet<&Vec<usize>> = visited.iter().collect();
        let product: usize = dims.iter().product();
        prop_assert_eq!(visited.len(), product);
        prop_assert_eq!(seen.len(), product);
        prop_assert_eq!(matrix.coordinates().count(), product);
    }

    #[test]
    fn identity_map_reproduces_the_nested_lists(dims in proptest::collection::vec(1usize..4, 1..4)) {
        let mut n = 0;
        let matrix = Matrix::from_fn(&dims, |_| {
            n += 1;
            Value::from(n)
        });
        let nested = matrix.to_value();
        let rebuilt = Matrix::from_value(&nested).unwrap();
        prop_assert_eq!(rebuilt.map(|v, _| v.clone()).to_value(), nested);
        prop_assert_eq!(rebuilt.dims(), &dims[..]);
    }
}

#[test]
fn forall_is_row_major() {
    let matrix = Matrix::from_value(&Value::from_json(json!([[1, 2, 3], [4, 5, 6]]))).unwrap();
    assert_eq!(matrix.dims(), &[2, 3]);
    let mut order = Vec::new();
    matrix.forall(|value, coord| order.push((value.to_string(), coord.to_vec())));
    assert_eq!(
        order,
        vec![
            ("1".to_string(), vec![0, 0]),
            ("2".to_string(), vec![0, 1]),
            ("3".to_string(), vec![0, 2]),
            ("4".to_string(), vec![1, 0]),
            ("5".to_string(), vec![1, 1]),
            ("6".to_string(), vec![1, 2]),
        ]
    );
}

#[test]
fn coordinates_must_match_dimensionality() {
    let mut matrix = Matrix::new(&[2, 2], Value::Null);
    assert!(matches!(matrix.get(&[0]), Err(QbError::InvalidArgument(_))));
    assert!(matches!(matrix.get(&[0, 2]), Err(QbError::InvalidArgument(_))));
    matrix.set(&[1, 0], Value::from("x")).unwrap();
    assert_eq!(matrix.get(&[1, 0]).unwrap(), &Value::from("x"));
    assert!(matrix.set(&[0, 0, 0], Value::Null).is_err());
}

#[test]
fn non_list_and_ragged_literals_are_rejected() {
    assert!(matches!(
        Matrix::from_value(&Value::from(3)),
        Err(QbError::InvalidArgument(_))
    ));
    assert!(Matrix::from_value(&Value::from_json(json!([[1, 2], [3]]))).is_err());
}

#[test]
fn filter_selects_a_slice() {
    let matrix = Matrix::from_value(&Value::from_json(json!([[1, 2, 3], [4, 5, 6]]))).unwrap();
    // Keep column 1 of every row.
    let slice = matrix
        .filter(1, |block, i, _| (i == 1).then(|| block[0].clone()))
        .unwrap();
    assert_eq!(
        Value::from(slice),
        Value::from_json(json!([[2], [5]]))
    );
    let rows = matrix
        .filter(0, |block, i, prefix| {
            assert!(prefix.is_empty());
            (i == 0).then(|| block.len())
        })
        .unwrap();
    assert_eq!(rows, Nested::List(vec![Nested::Leaf(3)]));
    assert!(matrix.filter(2, |_, _, _| Some(())).is_err());
}

#[test]
fn permute_axes_swaps_extents() {
    let matrix = Matrix::from_value(&Value::from_json(json!([[1, 2, 3], [4, 5, 6]]))).unwrap();
    let swapped = matrix.permute_axes(&[1, 0]).unwrap();
    assert_eq!(swapped.to_value(), Value::from_json(json!([[1, 4], [2, 5], [3, 6]])));
    assert!(matrix.permute_axes(&[0, 0]).is_err());
}
