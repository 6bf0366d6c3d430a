//! Integration tests against a live MongoDB server.
//!
//! These tests require a running MongoDB instance.
//! Set YIELDB_TEST_URI (default: mongodb://localhost:27017/yieldb_test) and
//! run with `--ignored`.

use futures::{StreamExt, TryStreamExt};
use yieldb::bson::{doc, oid::ObjectId, Bson, Document};
use yieldb::{Collection, Database, Deferred, Options, Shaped, YieldbError};

fn test_uri() -> String {
    std::env::var("YIELDB_TEST_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/yieldb_test".to_string())
}

/// The test URI pointed at another database on the same server
fn uri_for_database(name: &str) -> String {
    let uri = test_uri();
    let (base, query) = match uri.split_once('?') {
        Some((base, query)) => (base.to_string(), format!("?{}", query)),
        None => (uri.clone(), String::new()),
    };
    let host = match base.split_once("://") {
        Some((scheme, rest)) => match rest.split_once('/') {
            Some((hosts, _)) => format!("{}://{}", scheme, hosts),
            None => base.clone(),
        },
        None => base.clone(),
    };
    format!("{}/{}{}", host, name, query)
}

async fn setup(collection: &str) -> (Database, Collection) {
    setup_at(&test_uri(), collection).await
}

async fn setup_at(uri: &str, collection: &str) -> (Database, Collection) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let db = Database::connect(uri).await.unwrap();
    let col = db.col(collection).unwrap();
    col.remove(doc! {}, None).unwrap().await.unwrap();
    (db, col)
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when database is available
async fn test_insert_find_count_drop() {
    // Dropping the shared test database would pull it out from under the
    // other tests running in parallel.
    let (db, col) = setup_at(&uri_for_database("yieldb_test_drop"), "it_scenario").await;
    assert_eq!(db.name(), "yieldb_test_drop");

    let mut docs = vec![doc! { "name": "A" }, doc! { "name": "B" }];
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let found = col
        .find((), Options::new().sort(doc! { "name": 1 }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].get_str("name").unwrap(), "A");

    assert_eq!(col.count(doc! { "name": "A" }, None).unwrap().await.unwrap(), 1);

    db.drop().await.unwrap();
    assert_eq!(col.count((), None).unwrap().await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_insert_assigns_id_and_string_lookup_matches() {
    let (_db, col) = setup("it_insert").await;

    let mut zelda = doc! { "name": "Zelda" };
    let result = col.insert(&mut zelda, None).unwrap().await.unwrap();

    let id = zelda.get_object_id("_id").unwrap();
    let full = result.into_full().unwrap();
    assert_eq!(full.n, 1);
    assert_eq!(full.inserted_ids, vec![Bson::ObjectId(id)]);

    let by_native = col.find_one(id, None).unwrap().await.unwrap().unwrap();
    let by_hex = col.find_one(id.to_hex(), None).unwrap().await.unwrap().unwrap();
    let by_selector = col
        .find_one(doc! { "_id": id.to_hex() }, None)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(by_native, zelda);
    assert_eq!(by_hex, zelda);
    assert_eq!(by_selector, zelda);
}

#[tokio::test]
#[ignore]
async fn test_insert_reduced_result() {
    let (_db, col) = setup("it_insert_reduced").await;

    let mut docs = vec![doc! { "n": 1 }, doc! { "n": 2 }];
    let result = col
        .insert(&mut docs, Options::new().full_result(false))
        .unwrap()
        .await
        .unwrap();

    let inserted = result.into_reduced().unwrap();
    assert_eq!(inserted, docs);
}

#[tokio::test]
#[ignore]
async fn test_update_defaults_to_multi() {
    let (_db, col) = setup("it_update").await;

    let mut docs = vec![
        doc! { "group": "x", "n": 1 },
        doc! { "group": "x", "n": 2 },
        doc! { "group": "x", "n": 3 },
    ];
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let all = col
        .update(doc! { "group": "x" }, doc! { "$set": { "seen": true } }, None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(all.n(), 3);

    let one = col
        .update(
            doc! { "group": "x" },
            doc! { "$set": { "seen": false } },
            Options::new().multi(false).full_result(false),
        )
        .unwrap()
        .await
        .unwrap();
    assert!(matches!(one, Shaped::Reduced(1)));
}

#[tokio::test]
#[ignore]
async fn test_update_plain_document_sets_fields() {
    let (_db, col) = setup("it_update_set").await;

    let mut doc = doc! { "name": "Link", "rating": 1 };
    col.insert(&mut doc, None).unwrap().await.unwrap();
    let id = doc.get_object_id("_id").unwrap();

    col.update(id.to_hex(), doc! { "rating": 5 }, None)
        .unwrap()
        .await
        .unwrap();

    let found = col.find_one(id, None).unwrap().await.unwrap().unwrap();
    assert_eq!(found.get_str("name").unwrap(), "Link");
    assert_eq!(found.get_i32("rating").unwrap(), 5);

    col.update(id, doc! { "rating": 0 }, Options::new().overwrite(true))
        .unwrap()
        .await
        .unwrap();

    let replaced = col.find_one(id, None).unwrap().await.unwrap().unwrap();
    assert!(replaced.get("name").is_none());
}

#[tokio::test]
#[ignore]
async fn test_remove_defaults_to_multi() {
    let (_db, col) = setup("it_remove").await;

    let mut docs: Vec<Document> = (0..4).map(|i| doc! { "i": i, "tag": "rm" }).collect();
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let one = col
        .remove(doc! { "tag": "rm" }, Options::new().multi(false))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(one.n(), 1);

    let rest = col
        .remove(doc! { "tag": "rm" }, Options::new().full_result(false))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(rest.into_reduced(), Some(3));
}

#[tokio::test]
#[ignore]
async fn test_find_one_and_update_returns_new_by_default() {
    let (_db, col) = setup("it_fau").await;

    let mut doc = doc! { "count": 1 };
    col.insert(&mut doc, None).unwrap().await.unwrap();
    let id = doc.get_object_id("_id").unwrap();

    let after = col
        .find_one_and_update(id.to_hex(), doc! { "$inc": { "count": 1 } }, None)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.get_i32("count").unwrap(), 2);

    let before = col
        .find_one_and_update(id, doc! { "$inc": { "count": 1 } }, Options::new().new_document(false))
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.get_i32("count").unwrap(), 2);

    let missing = col
        .find_one_and_update(ObjectId::new(), doc! { "$inc": { "count": 1 } }, None)
        .unwrap()
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[ignore]
async fn test_find_one_and_remove() {
    let (_db, col) = setup("it_far").await;

    let mut doc = doc! { "name": "gone" };
    col.insert(&mut doc, None).unwrap().await.unwrap();

    let removed = col
        .find_one_and_remove(doc! { "name": "gone" }, None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(removed, Some(doc));
    assert_eq!(col.count((), None).unwrap().await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_aggregate_casts_and_streams() {
    let (_db, col) = setup("it_aggregate").await;

    let mut docs: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
    col.insert(&mut docs, None).unwrap().await.unwrap();
    let first = docs[0].get_object_id("_id").unwrap();

    let everything = col.aggregate(Vec::<Document>::new(), None).unwrap().await.unwrap();
    assert_eq!(everything.len(), 5);

    let matched = col
        .aggregate(vec![doc! { "$match": { "_id": first.to_hex() } }], None)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(matched, vec![docs[0].clone()]);

    let streamed: Vec<Document> = col
        .aggregate(vec![doc! { "$sort": { "i": 1 } }], None)
        .unwrap()
        .stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed.len(), 5);
}

#[tokio::test]
#[ignore]
async fn test_find_stream_yields_each_document() {
    let (_db, col) = setup("it_stream").await;

    let mut docs: Vec<Document> = (0..3).map(|i| doc! { "i": i }).collect();
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let mut stream = col
        .find((), Options::new().sort(doc! { "i": 1 }))
        .unwrap()
        .stream();

    let mut seen = Vec::new();
    while let Some(doc) = stream.next().await {
        seen.push(doc.unwrap().get_i32("i").unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2]);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_fan_out() {
    let (_db, col) = setup("it_fan_out").await;

    let mut docs: Vec<Document> = (0..10).map(|i| doc! { "i": i }).collect();
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let counts: Vec<Deferred<u64>> = (0..10)
        .map(|i| col.count(doc! { "i": { "$gte": i } }, None).unwrap())
        .collect();
    let counts = Deferred::all(counts).await.unwrap();
    assert_eq!(counts, (1..=10).rev().collect::<Vec<u64>>());

    let (all, one, total) = tokio::try_join!(
        col.find((), None).unwrap().exec(),
        col.find_one(doc! { "i": 3 }, None).unwrap().exec(),
        col.count((), None).unwrap(),
    )
    .unwrap();
    assert_eq!(all.len(), 10);
    assert_eq!(one.unwrap().get_i32("i").unwrap(), 3);
    assert_eq!(total, 10);
}

#[tokio::test]
#[ignore]
async fn test_operations_after_close_fail() {
    let (db, col) = setup("it_close").await;

    db.close().await.unwrap();

    let err = col.count((), None).unwrap().await.unwrap_err();
    assert!(matches!(err, YieldbError::Connection(_)));
}

#[test]
fn test_uri_for_database_keeps_host_and_query() {
    let uri = uri_for_database("other_db");
    assert!(uri.starts_with("mongodb"));
    assert!(uri.contains("/other_db"));
    assert!(!uri.contains("/yieldb_test"));
}

#[tokio::test]
#[ignore]
async fn test_no_match_is_not_an_error() {
    let (_db, col) = setup("it_no_match").await;

    let mut doc = doc! { "name": "only" };
    col.insert(&mut doc, None).unwrap().await.unwrap();

    let none = col.find(doc! { "name": "nobody" }, None).unwrap().await.unwrap();
    assert!(none.is_empty());

    let missing = col.find_one(ObjectId::new(), None).unwrap().await.unwrap();
    assert!(missing.is_none());

    let removed = col
        .find_one_and_remove(doc! { "name": "nobody" }, None)
        .unwrap()
        .await
        .unwrap();
    assert!(removed.is_none());

    let deleted = col.remove(doc! { "name": "nobody" }, None).unwrap().await.unwrap();
    assert_eq!(deleted.n(), 0);

    assert_eq!(col.count((), None).unwrap().await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn test_update_without_match_reports_zero() {
    let (_db, col) = setup("it_update_none").await;

    // Not an ObjectId string, so the selector keeps it as a plain string.
    let result = col
        .update(
            doc! { "_id": "update returns the result of the op" },
            doc! { "$set": { "touched": true } },
            None,
        )
        .unwrap()
        .await
        .unwrap()
        .into_full()
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.n, 0);
    assert_eq!(result.n_modified, Some(0));
    assert!(result.upserted_id.is_none());
}

#[tokio::test]
#[ignore]
async fn test_select_string_excludes_id() {
    let (_db, col) = setup("it_select").await;

    let mut docs = vec![doc! { "name": "a" }, doc! { "name": "b" }];
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let options = Options::from_document(doc! { "select": "-_id", "sort": "name" }).unwrap();
    let found = col.find((), options).unwrap().await.unwrap();

    assert_eq!(found, vec![doc! { "name": "a" }, doc! { "name": "b" }]);
}

#[tokio::test]
#[ignore]
async fn test_count_skip_and_limit() {
    let (_db, col) = setup("it_count").await;

    let mut docs: Vec<Document> = (0..3).map(|i| doc! { "i": i }).collect();
    col.insert(&mut docs, None).unwrap().await.unwrap();

    let skipped = Options::from_document(doc! { "skip": 100 }).unwrap();
    assert_eq!(col.count(doc! {}, skipped).unwrap().await.unwrap(), 0);

    let unlimited = Options::from_document(doc! { "limit": 0 }).unwrap();
    assert_eq!(col.count((), unlimited).unwrap().await.unwrap(), 3);

    let limited = Options::new().limit(2);
    assert_eq!(col.count((), limited).unwrap().await.unwrap(), 2);
}
