use chrono::Utc;
use std::time::Duration;
use vellum::common::{Document, Value};
use vellum::errors::ErrorKind;
use vellum::store::IndexModel;
use vellum_int_test::test_util::{cleanup, create_expiring_test_context, create_test_context, run_test};

#[ctor::ctor]
fn init() {
    colog::init();
}

const AGGREGATED: &str = "aggregated_objects";

fn ttl_indexes(indexes: &[Document], field: &str) -> Vec<Value> {
    indexes
        .iter()
        .filter(|index| index.get_path(&format!("key.{}", field)).is_some())
        .filter_map(|index| index.get("expireAfterSeconds").cloned())
        .collect()
}

#[test]
fn test_ttl_index_is_replaced() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(60))?;
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(3600))?;

            let indexes = client.ensure_collection(db, AGGREGATED)?.list_indexes()?;
            assert_eq!(indexes.len(), 2);
            assert_eq!(ttl_indexes(&indexes, "Time"), vec![Value::Int(3600)]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_store_rejects_changed_options_without_replacement() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(60))?;

            let collection = client.ensure_collection(db, AGGREGATED)?;
            let direct = collection.create_index(&IndexModel::ascending("Time").expire_after(Duration::from_secs(10)));
            assert_eq!(direct.unwrap_err().kind(), &ErrorKind::StoreCommandError);

            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(10))?;
            let indexes = collection.list_indexes()?;
            assert_eq!(ttl_indexes(&indexes, "Time"), vec![Value::Int(10)]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_ttl_index_per_field() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(60))?;
            client.ensure_ttl_index(db, AGGREGATED, "created", Duration::from_secs(120))?;

            let indexes = client.ensure_collection(db, AGGREGATED)?.list_indexes()?;
            assert_eq!(indexes.len(), 3);
            assert_eq!(ttl_indexes(&indexes, "Time"), vec![Value::Int(60)]);
            assert_eq!(ttl_indexes(&indexes, "created"), vec![Value::Int(120)]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_expired_documents_are_purged() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(60))?;

            let mut stale = Document::new();
            stale.put("_id", "stale");
            stale.put("Time", Utc::now() - chrono::Duration::minutes(5));
            client.insert_raw(db, AGGREGATED, stale);

            let mut fresh = Document::new();
            fresh.put("_id", "fresh");
            fresh.put("Time", Utc::now());
            client.insert_raw(db, AGGREGATED, fresh);

            assert_eq!(ctx.driver().purge_expired(), 1);
            assert!(!client.exists(db, AGGREGATED, r#"{"_id":"stale"}"#));
            assert!(client.exists(db, AGGREGATED, r#"{"_id":"fresh"}"#));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_background_monitor_expires_documents() {
    run_test(
        create_expiring_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(1))?;

            let mut document = Document::new();
            document.put("_id", "agg-1");
            document.put("Time", Utc::now());
            client.insert_raw(db, AGGREGATED, document);
            assert!(client.exists(db, AGGREGATED, r#"{"_id":"agg-1"}"#));

            awaitility::at_most(Duration::from_secs(5))
                .until(|| !client.exists(db, AGGREGATED, r#"{"_id":"agg-1"}"#));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_add_to_set_timestamp_feeds_expiry() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            client.ensure_ttl_index(db, "event_object_map", "Time", Duration::from_secs(3600))?;
            client.insert(db, "event_object_map", r#"{"_id":"agg-1","Time":{"$date":"2001-01-01T00:00:00Z"}}"#);

            assert!(client.add_to_set(db, "event_object_map", r#"{"_id":"agg-1"}"#, "objects", "e1"));
            assert_eq!(ctx.driver().purge_expired(), 0);
            assert!(client.exists(db, "event_object_map", r#"{"objects":"e1"}"#));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_index_failures_are_connection_errors() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database();
            let client = ctx.client();
            ctx.driver().set_reachable(false);

            let err = client
                .ensure_ttl_index(db, AGGREGATED, "Time", Duration::from_secs(60))
                .unwrap_err();
            ctx.driver().set_reachable(true);

            assert_eq!(err.kind(), &ErrorKind::ConnectionError);
            Ok(())
        },
        cleanup,
    )
}
