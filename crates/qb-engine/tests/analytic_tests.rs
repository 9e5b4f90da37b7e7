mod common;

use common::{rows, scope_of};
use pretty_assertions::assert_eq;
use qb_engine::{apply_analytics, run, AnalyticSpec, EngineConfig, Query, Value};
use serde_json::json;

fn analytic(json: serde_json::Value) -> AnalyticSpec {
    serde_json::from_value(json).unwrap()
}

fn column(rows: &[qb_engine::Record], name: &str) -> Vec<Value> {
    rows.iter().map(|row| row.get_path(name).clone()).collect()
}

#[test]
fn zero_edges_is_one_group() {
    let data = rows(json!([{"v": 1}, {"v": 2}, {"v": 3}]));
    let out = apply_analytics(
        &data,
        &[analytic(json!({"name": "size", "value": "rows.length", "edges": []}))],
        &scope_of(&data),
    )
    .unwrap();
    assert_eq!(column(&out, "size"), vec![Value::from(3); 3]);
}

#[test]
fn rownum_counts_backward_through_the_sorted_group() {
    let data = rows(json!([{"id": "b"}, {"id": "c"}, {"id": "a"}]));
    let out = apply_analytics(
        &data,
        &[analytic(json!({
            "name": "rank",
            "value": "rownum",
            "edges": [],
            "sort": "id",
        }))],
        &scope_of(&data),
    )
    .unwrap();
    // Sorted order is a, b, c.
    assert_eq!(
        column(&out, "rank"),
        vec![Value::from(1), Value::from(0), Value::from(2)]
    );
}

#[test]
fn descending_sort_and_group_lookups() {
    let data = rows(json!([
        {"suite": "a", "t": 10},
        {"suite": "a", "t": 30},
        {"suite": "b", "t": 5},
        {"suite": "a", "t": 20},
    ]));
    let out = apply_analytics(
        &data,
        &[
            analytic(json!({
                "name": "slowest",
                "value": "rows[0].t",
                "edges": ["suite"],
                "sort": {"value": "t", "sort": "descending"},
            })),
            analytic(json!({
                "name": "behind",
                "value": "slowest - t",
                "edges": ["suite"],
            })),
        ],
        &scope_of(&data),
    )
    .unwrap();
    assert_eq!(
        column(&out, "slowest"),
        vec![Value::from(30), Value::from(30), Value::from(5), Value::from(30)]
    );
    assert_eq!(
        column(&out, "behind"),
        vec![Value::from(20), Value::from(0), Value::from(0), Value::from(10)]
    );
}

#[test]
fn excluded_rows_get_null_rownum() {
    let data = rows(json!([{"v": 1, "ok": true}, {"v": 2, "ok": false}, {"v": 3, "ok": true}]));
    let out = apply_analytics(
        &data,
        &[analytic(json!({
            "name": "n",
            "value": "rownum",
            "edges": [],
            "where": {"term": {"ok": true}},
            "sort": "v",
        }))],
        &scope_of(&data),
    )
    .unwrap();
    assert_eq!(
        column(&out, "n"),
        vec![Value::from(1), Value::Null, Value::from(0)]
    );
}

#[test]
fn inputs_are_left_untouched() {
    let data = rows(json!([{"v": 1}, {"v": 2}]));
    let before = data.clone();
    let query: Query = serde_json::from_value(json!({
        "analytic": [{"name": "pos", "value": "rownum", "edges": []}],
        "sort": "pos",
    }))
    .unwrap();
    let list = run(&query, &data, &EngineConfig::default())
        .unwrap()
        .into_list()
        .unwrap();
    assert_eq!(data, before);
    assert_eq!(
        list.iter().map(|row| row.to_json()).collect::<Vec<_>>(),
        vec![json!({"v": 2, "pos": 0}), json!({"v": 1, "pos": 1})]
    );
}

#[test]
fn analytic_without_edges_fails() {
    let data = rows(json!([{"v": 1}]));
    let err = apply_analytics(
        &data,
        &[analytic(json!({"name": "n", "value": "rownum"}))],
        &scope_of(&data),
    )
    .unwrap_err();
    assert!(err.is_configuration_error());
}
