#![allow(dead_code)]

use qb_engine::{Record, Scope};

/// Rows from a JSON array of objects.
pub fn rows(json: serde_json::Value) -> Vec<Record> {
    let serde_json::Value::Array(items) = json else {
        panic!("expected an array of rows, got {json}");
    };
    items
        .into_iter()
        .map(|row| Record::from_json(row).unwrap())
        .collect()
}

pub fn scope_of(rows: &[Record]) -> Scope {
    Scope::new(qb_engine::columns_from_rows(rows))
}

pub fn to_json(rows: &[Record]) -> Vec<serde_json::Value> {
    rows.iter().map(Record::to_json).collect()
}
