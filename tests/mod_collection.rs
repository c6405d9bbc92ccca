use docsql::Database;
use docsql::collection::Collection;
use docsql::connection::{Connection, SqliteConnection};
use docsql::dialect::DialectKind;
use docsql::errors::DbError;
use docsql::id::SequentialIdGenerator;
use docsql::query::{Filter, FindOptions, Projection, QueryBuilder, SortSpec};
use docsql::types::{Document, SqlValue, Statement};
use docsql::utils::sqllog;
use serde_json::{Value, json};
use std::sync::Arc;

fn doc(v: Value) -> Document {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {other}"),
    }
}

fn filter(v: Value) -> Filter {
    Filter::from_json(v).unwrap()
}

fn memory_db() -> Database {
    Database::open_in_memory()
        .unwrap()
        .with_id_generator(Arc::new(SequentialIdGenerator::new("id")))
}

fn all(col: &Collection<'_>, opts: &FindOptions) -> Vec<Document> {
    col.find(&Filter::all(), opts).unwrap().to_vec().unwrap()
}

fn find_one(col: &Collection<'_>, f: Value) -> Option<Document> {
    col.find_one(&filter(f), &FindOptions::default()).unwrap()
}

fn names(docs: &[Document]) -> Vec<&str> {
    docs.iter().filter_map(|d| d.get("name").and_then(Value::as_str)).collect()
}

#[test]
fn insert_find_update_delete_roundtrip() {
    let db = memory_db();
    let col = db.collection("people").unwrap();
    let a = col.insert_one(doc(json!({"name": "a", "age": 5}))).unwrap();
    col.insert_one(doc(json!({"name": "b", "age": 10}))).unwrap();

    let found = col
        .find(&filter(json!({"age": {"$gt": 6}})), &FindOptions::default())
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(names(&found), vec!["b"]);

    let r = col
        .update_one(&filter(json!({"name": "a"})), &doc(json!({"age": 6})))
        .unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    let one = find_one(&col, json!({"name": "a"})).unwrap();
    assert_eq!(Value::Object(one), json!({"_id": a, "name": "a", "age": 6}));

    col.delete_many(&Filter::all()).unwrap();
    assert_eq!(col.count(&Filter::all()).unwrap(), 0);
}

#[test]
fn generated_and_supplied_ids() {
    let db = memory_db();
    let col = db.collection("ids").unwrap();
    assert_eq!(col.insert_one(doc(json!({"x": 1}))).unwrap(), "id000001");
    assert_eq!(
        col.insert_one(doc(json!({"x": 2, "_id": "mine"}))).unwrap(),
        "mine"
    );
    assert!(matches!(
        col.insert_one(doc(json!({"_id": 7}))),
        Err(DbError::CompilationError(_))
    ));
    let stored = find_one(&col, json!({"_id": "mine"})).unwrap();
    assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
}

#[test]
fn projection_keeps_only_named_fields_and_id() {
    let db = memory_db();
    let col = db.collection("proj").unwrap();
    col.insert_one(doc(json!({"name": "a", "age": 5, "addr": {"city": "x", "zip": 1}})))
        .unwrap();
    let opts = FindOptions {
        projection: Some(Projection::fields(["name", "addr.city"])),
        ..FindOptions::default()
    };
    let d = col.find_one(&Filter::all(), &opts).unwrap().unwrap();
    assert_eq!(
        Value::Object(d),
        json!({"_id": "id000001", "name": "a", "addr": {"city": "x"}})
    );
    let opts = FindOptions {
        projection: Some(Projection::fields(["age"]).without_id()),
        ..FindOptions::default()
    };
    let d = col.find_one(&Filter::all(), &opts).unwrap().unwrap();
    assert_eq!(Value::Object(d), json!({"age": 5}));
}

#[test]
fn sort_skip_limit_pushdown() {
    let db = memory_db();
    let col = db.collection("page").unwrap();
    for (n, g) in [("c", 2), ("a", 1), ("e", 2), ("b", 1), ("d", 3)] {
        col.insert_one(doc(json!({"name": n, "g": g}))).unwrap();
    }
    let sort = vec![SortSpec::desc("g"), SortSpec::asc("name")];
    let sorted = FindOptions {
        sort: Some(sort.clone()),
        ..FindOptions::default()
    };
    assert_eq!(names(&all(&col, &sorted)), vec!["d", "c", "e", "a", "b"]);

    let page = FindOptions {
        sort: Some(sort.clone()),
        skip: Some(1),
        limit: Some(2),
        ..FindOptions::default()
    };
    let cursor = col.find(&Filter::all(), &page).unwrap();
    assert!(cursor.is_pushdown());
    assert_eq!(names(&cursor.to_vec().unwrap()), vec!["c", "e"]);

    let unbounded = FindOptions {
        sort: Some(sort),
        skip: Some(3),
        limit: Some(0),
        ..FindOptions::default()
    };
    assert_eq!(names(&all(&col, &unbounded)), vec!["a", "b"]);
}

#[test]
fn missing_fields_sort_first_ascending() {
    let db = memory_db();
    let col = db.collection("nulls").unwrap();
    col.insert_one(doc(json!({"name": "x", "k": 2}))).unwrap();
    col.insert_one(doc(json!({"name": "y"}))).unwrap();
    col.insert_one(doc(json!({"name": "z", "k": 1}))).unwrap();
    let asc = FindOptions {
        sort: Some(vec![SortSpec::asc("k")]),
        ..FindOptions::default()
    };
    assert_eq!(names(&all(&col, &asc)), vec!["y", "z", "x"]);
    let desc = FindOptions {
        sort: Some(vec![SortSpec::desc("k")]),
        ..FindOptions::default()
    };
    assert_eq!(names(&all(&col, &desc)), vec!["x", "z", "y"]);
}

#[test]
fn operators_match_in_sql() {
    let db = memory_db();
    let col = db.collection("ops").unwrap();
    col.insert_many([
        doc(json!({"name": "a", "age": 5, "tags": {"vip": true}})),
        doc(json!({"name": "b", "age": "10"})),
        doc(json!({"name": "c", "age": null})),
        doc(json!({"name": "d"})),
    ])
    .unwrap();
    let q = |f: Value| {
        let docs = col
            .find(&filter(f), &FindOptions::default())
            .unwrap()
            .to_vec()
            .unwrap();
        names(&docs).into_iter().map(str::to_owned).collect::<Vec<_>>()
    };
    assert_eq!(q(json!({"age": {"$gte": 5}})), vec!["a"]);
    assert_eq!(q(json!({"age": {"$gt": "1"}})), vec!["b"]);
    assert_eq!(q(json!({"age": null})), vec!["c", "d"]);
    assert_eq!(q(json!({"age": {"$ne": null}})), vec!["a", "b"]);
    assert_eq!(q(json!({"age": {"$exists": true}})), vec!["a", "b", "c"]);
    assert_eq!(q(json!({"age": {"$ne": 5}})), vec!["b", "c", "d"]);
    assert_eq!(q(json!({"age": {"$in": []}})), Vec::<String>::new());
    assert_eq!(q(json!({"age": {"$nin": []}})), vec!["a", "b", "c", "d"]);
    assert_eq!(q(json!({"age": {"$in": [5, "10"]}})), vec!["a", "b"]);
    assert_eq!(q(json!({"tags.vip": true})), vec!["a"]);
    assert_eq!(
        q(json!({"$or": [{"name": "d"}, {"age": {"$lt": 6}}]})),
        vec!["a", "d"]
    );
    assert_eq!(q(json!({"$not": {"age": {"$gt": 1}}})), vec!["b", "c", "d"]);
    assert_eq!(
        q(json!({"age": {"$not": {"$gt": 1}}, "name": {"$ne": "d"}})),
        vec!["b", "c"]
    );
}

#[test]
fn predicate_filters_agree_with_match_documents() {
    let db = memory_db();
    let col = db.collection("pred").unwrap();
    for i in 0..10 {
        col.insert_one(doc(json!({"n": i, "name": format!("n{i}")}))).unwrap();
    }
    let pred = Filter::predicate(|d| {
        d.get("n")
            .and_then(Value::as_i64)
            .is_some_and(|n| n % 2 == 0)
    });
    let decl = filter(json!({"n": {"$in": [0, 2, 4, 6, 8]}}));
    let opts = FindOptions {
        sort: Some(vec![SortSpec::desc("n")]),
        skip: Some(1),
        limit: Some(2),
        ..FindOptions::default()
    };

    let scanned = col.find(&pred, &opts).unwrap();
    assert!(!scanned.is_pushdown());
    let scanned = scanned.to_vec().unwrap();
    let pushed = col.find(&decl, &opts).unwrap().to_vec().unwrap();
    assert_eq!(scanned, pushed);
    assert_eq!(names(&scanned), vec!["n6", "n4"]);
    assert_eq!(col.count(&pred).unwrap(), 5);
    assert_eq!(col.count(&decl).unwrap(), 5);
}

#[test]
fn count_equals_find_length() {
    let db = memory_db();
    let col = db.collection("cnt").unwrap();
    for i in 0..7 {
        col.insert_one(doc(json!({"i": i}))).unwrap();
    }
    for f in [
        json!({}),
        json!({"i": {"$lt": 3}}),
        json!({"i": {"$in": [1, 100]}}),
        json!({"j": 1}),
    ] {
        let f = filter(f);
        let n = col.find(&f, &FindOptions::default()).unwrap().count() as u64;
        assert_eq!(col.count(&f).unwrap(), n);
    }
}

#[test]
fn operator_updates_and_replace() {
    let db = memory_db();
    let col = db.collection("upd").unwrap();
    let id = col
        .insert_one(doc(json!({"name": "a", "stats": {"visits": 1}, "tmp": true})))
        .unwrap();
    col.insert_one(doc(json!({"name": "b"}))).unwrap();

    let inc = doc(json!({"$inc": {"stats.visits": 2}, "$unset": ["tmp"]}));
    let r = col.update_many(&filter(json!({"name": "a"})), &inc).unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    let a = find_one(&col, json!({"_id": id})).unwrap();
    assert_eq!(
        Value::Object(a),
        json!({"_id": id, "name": "a", "stats": {"visits": 3}})
    );

    let r = col.update_many(&Filter::all(), &doc(json!({"name": "a"}))).unwrap();
    assert_eq!((r.matched, r.modified), (2, 1));

    let r = col
        .replace_many(&filter(json!({"_id": id})), &doc(json!({"fresh": 1})))
        .unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    let a = find_one(&col, json!({"_id": id})).unwrap();
    assert_eq!(Value::Object(a), json!({"_id": id, "fresh": 1}));
    assert!(col.replace_one(&Filter::all(), &doc(json!({"_id": "x"}))).is_err());
}

#[test]
fn malformed_input_fails_before_any_statement() {
    let db = memory_db();
    let col = db.collection("strict").unwrap();
    col.insert_one(doc(json!({"a": 1}))).unwrap();
    let _g = sqllog::enable_thread_sink();

    let bad_filter = filter(json!({"a": {"$regex": "x"}}));
    assert!(matches!(
        col.find(&bad_filter, &FindOptions::default()),
        Err(DbError::CompilationError(_))
    ));
    assert!(col.count(&bad_filter).is_err());
    assert!(col.delete_many(&bad_filter).is_err());
    let mixed = doc(json!({"$set": {"a": 2}, "b": 1}));
    assert!(col.update_many(&Filter::all(), &mixed).is_err());
    let id_write = doc(json!({"$set": {"_id": "z"}}));
    assert!(col.update_many(&Filter::all(), &id_write).is_err());
    let operators = doc(json!({"$set": {"a": 2}}));
    assert!(col.replace_many(&Filter::all(), &operators).is_err());
    let bad_sort = FindOptions {
        sort: Some(vec![SortSpec::asc("$bad")]),
        ..FindOptions::default()
    };
    assert!(col.find(&Filter::all(), &bad_sort).is_err());
    assert!(sqllog::drain().is_empty());

    col.count(&Filter::all()).unwrap();
    assert_eq!(sqllog::drain().len(), 1);
}

#[test]
fn delete_many_pushdown_is_one_statement() {
    let db = memory_db();
    let col = db.collection("del").unwrap();
    for i in 0..5 {
        col.insert_one(doc(json!({"i": i}))).unwrap();
    }
    let _g = sqllog::enable_thread_sink();
    let report = col.delete_many(&filter(json!({"i": {"$gte": 2}}))).unwrap();
    assert_eq!(report.deleted, 3);
    let issued = sqllog::drain();
    assert_eq!(issued.len(), 1);
    assert!(issued[0].starts_with("DELETE FROM \"del\" WHERE"));

    assert_eq!(col.delete_one(&Filter::all()).unwrap().deleted, 1);
    assert_eq!(col.delete_many(&Filter::predicate(|_| true)).unwrap().deleted, 1);
    assert_eq!(col.count(&Filter::all()).unwrap(), 0);
}

#[test]
fn corrupt_rows_surface_decode_errors() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let qb = QueryBuilder::new(DialectKind::Sqlite.dialect());
    conn.execute(&Statement::new(qb.build_create_table("bad"))).unwrap();
    let mut insert = Statement::new("INSERT INTO \"bad\" (\"document\") VALUES (?)");
    for text in ["{\"_id\":\"1\",\"n\":1}", "[1,2,3]", "{\"_id\":\"3\",\"n\":3}"] {
        insert.params = vec![SqlValue::Text(text.to_owned())];
        conn.execute(&insert).unwrap();
    }
    let db = Database::with_connection(Box::new(conn), DialectKind::Sqlite.dialect());
    let col = db.collection("bad").unwrap();
    let items: Vec<_> = col.find(&Filter::all(), &FindOptions::default()).unwrap().collect();
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok() && items[2].is_ok());
    assert!(matches!(items[1], Err(DbError::DecodeError(_))));
    assert!(col.find(&Filter::all(), &FindOptions::default()).unwrap().to_vec().is_err());
    assert!(matches!(col.count(&Filter::predicate(|_| true)), Err(DbError::DecodeError(_))));
}

#[test]
fn invalid_utf8_rows_surface_decode_errors() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let qb = QueryBuilder::new(DialectKind::Sqlite.dialect());
    conn.execute(&Statement::new(qb.build_create_table("bytes"))).unwrap();
    let mut insert = Statement::new("INSERT INTO \"bytes\" (\"document\") VALUES (?)");
    insert.params = vec![SqlValue::Blob(b"{\"_id\":\"1\",\"s\":\"a\xFFb\"}".to_vec())];
    conn.execute(&insert).unwrap();
    let db = Database::with_connection(Box::new(conn), DialectKind::Sqlite.dialect());
    let col = db.collection("bytes").unwrap();
    let items: Vec<_> = col.find(&Filter::all(), &FindOptions::default()).unwrap().collect();
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(DbError::DecodeError(_))));
}

#[test]
fn duplicate_ids_are_rejected() {
    let db = memory_db();
    let col = db.collection("dup").unwrap();
    assert_eq!(col.insert_one(doc(json!({"_id": "same", "n": 1}))).unwrap(), "same");
    assert!(matches!(
        col.insert_one(doc(json!({"_id": "same", "n": 2}))),
        Err(DbError::DuplicateId(_))
    ));
    assert_eq!(col.count(&Filter::all()).unwrap(), 1);

    let res = col.insert_many([
        doc(json!({"_id": "b"})),
        doc(json!({"_id": "b"})),
        doc(json!({"_id": "c"})),
    ]);
    assert!(matches!(res, Err(DbError::DuplicateId(_))));
    assert_eq!(col.count(&Filter::all()).unwrap(), 2);

    col.insert_one(doc(json!({"_id": "other", "n": 2}))).unwrap();
    let r = col.update_one(&filter(json!({"n": 1})), &doc(json!({"x": 9}))).unwrap();
    assert_eq!((r.matched, r.modified), (1, 1));
    assert_eq!(col.count(&filter(json!({"x": 9}))).unwrap(), 1);
    assert_eq!(col.delete_one(&Filter::all()).unwrap().deleted, 1);
    assert_eq!(col.count(&Filter::all()).unwrap(), 2);
}

#[test]
fn text_dialect_rejects_duplicate_ids() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let db = Database::with_connection(Box::new(conn), DialectKind::Text.dialect());
    let col = db.collection("plain_dup").unwrap();
    col.insert_one(doc(json!({"_id": "k", "v": 1}))).unwrap();
    assert!(matches!(
        col.insert_one(doc(json!({"_id": "k", "v": 1}))),
        Err(DbError::DuplicateId(_))
    ));
    assert_eq!(col.count(&Filter::all()).unwrap(), 1);
}

#[test]
fn text_dialect_scans_and_addresses_rows_by_content() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let db = Database::with_connection(Box::new(conn), DialectKind::Text.dialect())
        .with_id_generator(Arc::new(SequentialIdGenerator::new("t")));
    let col = db.collection("plain").unwrap();
    col.insert_many([
        doc(json!({"name": "a", "age": 5})),
        doc(json!({"name": "b", "age": 10})),
    ])
    .unwrap();

    let cursor = col.find(&filter(json!({"age": {"$gt": 6}})), &FindOptions::default()).unwrap();
    assert!(!cursor.is_pushdown());
    assert_eq!(names(&cursor.to_vec().unwrap()), vec!["b"]);

    let r = col.update_one(&filter(json!({"name": "a"})), &doc(json!({"age": 6}))).unwrap();
    assert_eq!(r.modified, 1);
    let a = col.find_one(&filter(json!({"name": "a"})), &FindOptions::default()).unwrap().unwrap();
    assert_eq!(a["age"], json!(6));
    assert_eq!(col.delete_many(&filter(json!({"age": {"$lt": 7}}))).unwrap().deleted, 1);
    assert_eq!(col.count(&Filter::all()).unwrap(), 1);
}

#[test]
fn drop_removes_the_table() {
    let db = memory_db();
    let col = db.collection("gone").unwrap();
    col.insert_one(doc(json!({"x": 1}))).unwrap();
    col.drop().unwrap();
    assert_eq!(db.collection("gone").unwrap().count(&Filter::all()).unwrap(), 0);
}

#[test]
fn file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    {
        let db = Database::open(&path).unwrap();
        db.collection("keep").unwrap().insert_one(doc(json!({"_id": "k", "v": 1}))).unwrap();
    }
    let db = Database::open(&path).unwrap();
    let col = db.collection("keep").unwrap();
    let d = find_one(&col, json!({})).unwrap();
    assert_eq!(d["v"], json!(1));
}
