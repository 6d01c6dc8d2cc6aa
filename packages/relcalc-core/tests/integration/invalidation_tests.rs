//! Event-driven cache invalidation.

use std::time::Duration;

use relcalc_core::{CellDisplayValue, ChangeEvent, ChangeKind};
use serde_json::json;

use super::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_target_update_invalidates_dependents() {
    let (store, engine) = fixture();
    let mut events = store.subscribe();

    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));
    assert_eq!(cell(&engine, ORDERS, "o2", "o_customer_name").await, text("Bob"));

    store
        .update_value(&CUSTOMERS.into(), &"c1".into(), &"cu_name".into(), json!("Alicia"))
        .unwrap();

    // Not yet notified: the cached value is still served
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Update);
    engine.apply_change(&event);

    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alicia"));
    assert_eq!(engine.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_rows_stay_cached() {
    let (store, engine) = fixture();
    cell(&engine, ORDERS, "o1", "o_customer_name").await;
    cell(&engine, ORDERS, "o2", "o_customer_name").await;
    let calls = get_rows_calls(&store, CUSTOMERS);

    engine.invalidate_row(&CUSTOMERS.into(), &"c1".into());

    assert_eq!(cell(&engine, ORDERS, "o2", "o_customer_name").await, text("Bob"));
    assert_eq!(get_rows_calls(&store, CUSTOMERS), calls);
    cell(&engine, ORDERS, "o1", "o_customer_name").await;
    assert_eq!(get_rows_calls(&store, CUSTOMERS), calls + 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_relation_change() {
    let (store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o2", "o_customer_name").await, text("Bob"));

    store
        .update_value(&ORDERS.into(), &"o2".into(), &"o_customer".into(), json!("c1"))
        .unwrap();
    engine.apply_change(&ChangeEvent::row(ORDERS, "o2", ChangeKind::Update));

    assert_eq!(cell(&engine, ORDERS, "o2", "o_customer_name").await, text("Alice"));
}

#[tokio::test(start_paused = true)]
async fn test_deleted_target_row() {
    let (store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_contact_names").await,
        list(&["Alice", "Bob"])
    );

    assert!(store.delete_row(&CUSTOMERS.into(), &"c1".into()).unwrap());
    engine.apply_change(&ChangeEvent::row(CUSTOMERS, "c1", ChangeKind::Delete));

    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, CellDisplayValue::Empty);
    assert_eq!(cell(&engine, ORDERS, "o1", "o_contact_names").await, list(&["Bob"]));
}

#[tokio::test(start_paused = true)]
async fn test_bulk_change_invalidates_table() {
    let (store, engine) = fixture();
    cell(&engine, ORDERS, "o1", "o_total").await;
    cell(&engine, ORDERS, "o1", "o_customer_name").await;

    store.clear_table(&ITEMS.into()).unwrap();
    engine.apply_change(&ChangeEvent::table(ITEMS, ChangeKind::Bulk));

    assert_eq!(engine.cache().len(), 1);
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_total").await,
        CellDisplayValue::Scalar {
            value: relcalc_core::ScalarValue::Number(0.0)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_column_reconfiguration() {
    let (store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));

    let mut schema = orders_schema();
    if let Some(column) = schema.columns.iter_mut().find(|c| c.id.as_str() == "o_customer_name") {
        column.kind = relcalc_core::ColumnKind::Lookup(relcalc_core::schema::LookupConfig {
            source_relation_column_id: "o_customer".into(),
            target_field_id: "cu_email".into(),
        });
    }
    store.set_schema(schema).unwrap();
    engine.invalidate_column(&ORDERS.into(), &"o_customer_name".into());

    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_customer_name").await,
        text("alice@example.com")
    );
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_without_events() {
    let (store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));
    store
        .update_value(&CUSTOMERS.into(), &"c1".into(), &"cu_name".into(), json!("Alicia"))
        .unwrap();

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alicia"));
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_during_computation_is_not_cached() {
    let (store, engine) = fixture();
    store.set_latency(Duration::from_millis(50));

    // Each read takes 50ms; the customer rows are requested after ~150ms
    let (value, _) = tokio::join!(cell(&engine, ORDERS, "o1", "o_customer_name"), async {
        tokio::time::sleep(Duration::from_millis(170)).await;
        engine.invalidate_row(&CUSTOMERS.into(), &"c1".into());
    });

    assert_eq!(value, text("Alice"));
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_prune_expired() {
    let (_store, engine) = fixture();
    cell(&engine, ORDERS, "o1", "o_total").await;
    cell(&engine, ORDERS, "o1", "o_archive_note").await;
    assert_eq!(engine.cache().len(), 2);

    // The error entry uses the short error TTL
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(engine.prune_expired(), 1);
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_target_schema_change_clears_cached_error() {
    let (store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_email_sum").await,
        error("Cannot sum email values")
    );
    assert_eq!(engine.cache().len(), 1);

    let mut schema = customers_schema();
    if let Some(column) = schema.columns.iter_mut().find(|c| c.id.as_str() == "cu_email") {
        column.kind = relcalc_core::ColumnKind::Number(relcalc_core::schema::NumberConfig::default());
    }
    store.set_schema(schema).unwrap();
    engine.apply_change(&ChangeEvent::table(CUSTOMERS, ChangeKind::SchemaChanged));
    assert!(engine.cache().is_empty());

    // Recomputed well within the entry TTL; the email strings are not numeric
    let value = cell(&engine, ORDERS, "o1", "o_email_sum").await;
    assert!(!value.is_error());
    assert_eq!(value.display(&relcalc_core::DisplayOptions::default()), "0.00");
}

#[tokio::test(start_paused = true)]
async fn test_target_row_change_clears_cached_error() {
    let (store, engine) = fixture();
    let mut events = store.subscribe();
    assert!(cell(&engine, ORDERS, "o1", "o_email_sum").await.is_error());

    store
        .update_value(&CUSTOMERS.into(), &"c2".into(), &"cu_name".into(), json!("Robert"))
        .unwrap();
    engine.apply_change(&events.recv().await.unwrap());
    assert!(engine.cache().is_empty());
}
