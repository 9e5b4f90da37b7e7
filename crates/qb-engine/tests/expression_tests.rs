use pretty_assertions::assert_eq;
use qb_engine::{compile_column, compile_expression, compile_where, ColumnSpec, QbError, Record, Scope, Value};
use serde_json::json;

fn compile(json: serde_json::Value) -> qb_engine::Expression {
    compile_expression(&Value::from_json(json)).unwrap()
}

#[test]
fn literal_is_constant_for_any_row() {
    let five = compile(json!({"literal": 5}));
    for row in [json!({}), json!({"literal": 6}), json!({"x": null})] {
        let row = Record::from_json(row).unwrap();
        assert_eq!(five.eval(&row).unwrap(), Value::from(5));
    }
}

#[test]
fn when_then_else() {
    let row = Record::new();
    for (cond, expected) in [(json!(true), "A"), (json!(false), "B"), (json!(null), "B")] {
        let expr = compile(json!({"when": cond, "then": {"literal": "A"}, "else": {"literal": "B"}}));
        assert_eq!(expr.eval(&row).unwrap(), Value::from(expected));
    }
}

#[test]
fn unknown_shape_names_the_key() {
    let err = compile_expression(&Value::from_json(json!({"gte": {"a": 1}}))).unwrap_err();
    assert!(matches!(err, QbError::UnsupportedExpression { ref key, .. } if key == "gte"));
    assert!(err.to_string().contains("gte"));
}

#[test]
fn column_doubles_its_source() {
    let scope = Scope::new(["x"]);
    let column = compile_column(&ColumnSpec::new("y", "x*2"), &scope).unwrap();
    let row = Record::new().with("x", 5);
    assert_eq!(column.calc(&row).unwrap(), Value::from(10));
}

#[test]
fn text_grammar_end_to_end() {
    let scope = Scope::new(["result", "duration", "tags"]);
    let cases = [
        ("result.ok ? 'pass' : 'fail'", Value::from("pass")),
        ("round(duration / 3, 2)", Value::from(3.33)),
        ("coalesce(result.missing, -1)", Value::from(-1)),
        ("length(tags) + count(tags)", Value::from(5)),
        ("tags[1] == 'b' && !(duration < 5)", Value::from(true)),
        ("max(tags)", Value::from("b")),
        ("duration % 4 + 1e1", Value::from(12)),
    ];
    let row = Record::from_json(json!({
        "result": {"ok": true},
        "duration": 10,
        "tags": ["a", "b", null],
    }))
    .unwrap();
    for (source, expected) in cases {
        let column = compile_column(&ColumnSpec::new("c", source), &scope).unwrap();
        assert_eq!(column.calc(&row).unwrap(), expected, "{source}");
    }
}

#[test]
fn malformed_text_is_a_compile_error() {
    let scope = Scope::new(["x"]);
    for source in ["x +", "x ? 1", "frobnicate(x)", "abs(x, x)", "(x"] {
        let err = compile_column(&ColumnSpec::new("c", source), &scope).unwrap_err();
        assert!(
            matches!(&err, QbError::Compile { expression, .. } if expression == source),
            "{source}: {err:?}"
        );
    }
}

#[test]
fn missing_where_accepts_every_row() {
    let predicate = compile_where(None, &Scope::new(["x"])).unwrap();
    for row in [json!({}), json!({"x": false}), json!({"x": null})] {
        assert!(predicate.matches(&Record::from_json(row).unwrap()).unwrap());
    }
}

#[test]
fn open_scope_reads_any_field() {
    let column = compile_column(&ColumnSpec::new("c", "a.b + 1"), &Scope::open()).unwrap();
    let row = Record::from_json(json!({"a": {"b": 1}})).unwrap();
    assert_eq!(column.calc(&row).unwrap(), Value::from(2));
}
