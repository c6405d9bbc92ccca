use docsql::dialect::{Dialect, DialectKind};
use docsql::errors::DbError;
use docsql::query::{
    Condition, Filter, FindOptions, PlanMode, QueryBuilder, SortSpec, compile_filter,
    eval_condition, parse_match,
};
use docsql::types::{Document, SqlValue};
use serde_json::{Value, json};

fn filter(v: Value) -> Filter {
    Filter::from_json(v).unwrap()
}

fn doc(v: Value) -> Document {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {other}"),
    }
}

#[test]
fn every_sql_dialect_compiles_the_same_filter() {
    let f = filter(json!({
        "$or": [{"age": {"$gte": 21, "$lt": 65}}, {"vip": true}],
        "name": {"$nin": ["x", null]},
        "addr.city": {"$exists": true}
    }));
    for kind in [DialectKind::Sqlite, DialectKind::Mysql, DialectKind::Postgres] {
        let d = kind.dialect();
        let c = compile_filter(d.as_ref(), &f).unwrap().unwrap();
        assert_eq!(c.params.len(), 4, "{kind}: {}", c.sql);
        assert!(
            !c.sql.contains("21") && !c.sql.contains("65"),
            "{kind}: literal inlined in {}",
            c.sql
        );
    }
}

#[test]
fn postgres_placeholders_follow_text_order() {
    let qb = QueryBuilder::new(DialectKind::Postgres.dialect());
    let f = filter(json!({"a": {"$in": [1, 2]}, "b": "s"}));
    let opts = FindOptions {
        sort: Some(vec![SortSpec::asc("a")]),
        limit: Some(3),
        ..FindOptions::default()
    };
    let plan = qb.build_select("t", &f, &opts).unwrap();
    let sql = &plan.statement.sql;
    let positions: Vec<usize> = (1..=4)
        .map(|i| sql.find(&format!("${i}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{sql}");
    assert_eq!(plan.statement.params.last(), Some(&SqlValue::Integer(3)));
}

#[test]
fn identifiers_and_paths_are_quoted() {
    let qb = QueryBuilder::new(DialectKind::Sqlite.dialect());
    assert_eq!(
        qb.build_create_table("we\"ird"),
        "CREATE TABLE IF NOT EXISTS \"we\"\"ird\" (\"document\" TEXT NOT NULL)"
    );
    assert_eq!(
        qb.create_path_selector("it's.x").unwrap(),
        "json_extract(\"document\", '$.\"it''s\".\"x\"')"
    );
    assert!(qb.create_path_selector("a\"b").is_err());
    assert!(qb.create_path_selector("").is_err());
    let text = QueryBuilder::new(DialectKind::Text.dialect());
    assert!(matches!(
        text.create_path_selector("a"),
        Err(DbError::CompilationError(_))
    ));
}

#[test]
fn predicates_always_scan() {
    for kind in [
        DialectKind::Sqlite,
        DialectKind::Mysql,
        DialectKind::Postgres,
        DialectKind::Text,
    ] {
        let qb = QueryBuilder::new(kind.dialect());
        let plan = qb
            .build_select("t", &Filter::predicate(|_| true), &FindOptions::default())
            .unwrap();
        assert!(matches!(plan.mode, PlanMode::Scan { .. }), "{kind}");
        assert!(plan.statement.params.is_empty());
    }
}

#[test]
fn parsed_conditions_evaluate_in_process() {
    let cond = parse_match(&doc(json!({"a": {"$gt": 1, "$lte": 3}}))).unwrap();
    assert!(matches!(cond, Condition::And(ref cs) if cs.len() == 2));
    assert!(eval_condition(&doc(json!({"a": 3})), &cond));
    assert!(!eval_condition(&doc(json!({"a": "3"})), &cond));
    assert!(!eval_condition(&doc(json!({})), &cond));
}

#[test]
fn malformed_filters_are_rejected() {
    let d: &dyn Dialect = &docsql::dialect::SqliteDialect;
    for bad in [
        json!({"a": {"$gt": null}}),
        json!({"a": {"b": 1}}),
        json!({"a": [1]}),
        json!({"a": {"$in": 3}}),
        json!({"a": {"$in": [[1]]}}),
        json!({"a": {"$exists": 1}}),
        json!({"$and": []}),
        json!({"$or": {"a": 1}}),
        json!({"$where": "1"}),
        json!({"a": {"$gt": 1, "b": 2}}),
    ] {
        let res = compile_filter(d, &filter(bad.clone()));
        assert!(
            matches!(res, Err(DbError::CompilationError(_))),
            "accepted {bad}"
        );
    }
    assert!(Filter::parse_json("[1]").is_err());
    assert!(Filter::parse_json("{oops").is_err());
}
