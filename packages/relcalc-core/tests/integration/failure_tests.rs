//! Store outages, timeouts and render passes.

use std::time::Duration;

use relcalc_core::{CellDisplayValue, ColumnId, EngineConfig, RelationEngine, RowId, TableId};

use super::helpers::*;

const UNAVAILABLE: &str = "Linked data is temporarily unavailable";

#[tokio::test(start_paused = true)]
async fn test_outage_is_retried_after_error_ttl() {
    let (store, engine) = fixture();
    store.set_unavailable(true);

    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, error(UNAVAILABLE));

    store.set_unavailable(false);
    // Still inside the error TTL
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, error(UNAVAILABLE));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));
}

#[tokio::test(start_paused = true)]
async fn test_outage_fails_every_waiting_cell() {
    let (store, engine) = fixture();
    // Warm the schemas so only row fetches fail
    cell(&engine, ORDERS, "o1", "o_customer_name").await;
    engine.invalidate_row(&ORDERS.into(), &"o1".into());
    store.set_unavailable(true);

    let values = engine
        .evaluate_column(&ORDERS.into(), &["o1".into(), "o2".into()], &"o_total".into())
        .await;
    assert_eq!(values, vec![error(UNAVAILABLE), error(UNAVAILABLE)]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out_then_recovers() {
    let store = seed_store();
    let config = EngineConfig {
        store_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let engine = RelationEngine::new(store.clone(), config);
    store.set_latency(Duration::from_secs(10));

    assert_eq!(cell(&engine, ORDERS, "o1", "o_total").await, error(UNAVAILABLE));

    store.set_latency(Duration::ZERO);
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_names").await,
        text("Apple, Banana, Cherry")
    );
    assert!(!cell(&engine, ORDERS, "o1", "o_total").await.is_error());
}

#[tokio::test(start_paused = true)]
async fn test_structural_errors_use_entry_ttl() {
    let (_store, engine) = fixture();
    assert!(cell(&engine, ORDERS, "o1", "o_deep").await.is_error());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(engine.prune_expired(), 0);
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_pass_returns_nothing() {
    let (_store, engine) = fixture();
    let pass = engine.begin_pass();
    pass.close();

    let value = engine
        .evaluate_cell_in(&pass, &ORDERS.into(), &"o1".into(), &"o_total".into())
        .await;
    assert_eq!(value, None);
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pass_closed_mid_flight_is_not_cached() {
    let (store, engine) = fixture();
    store.set_latency(Duration::from_millis(50));
    let pass = engine.begin_pass();
    let table = TableId::from(ORDERS);
    let row = RowId::from("o1");
    let column = ColumnId::from("o_total");

    let (value, _) = tokio::join!(
        engine.evaluate_cell_in(&pass, &table, &row, &column),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pass.close();
        }
    );
    assert_eq!(value, None);
    assert!(engine.cache().is_empty());

    // A later pass computes and caches normally
    let next = engine.begin_pass();
    assert_ne!(next.id(), pass.id());
    let value = engine
        .evaluate_cell_in(&next, &ORDERS.into(), &"o1".into(), &"o_total".into())
        .await;
    assert!(matches!(value, Some(CellDisplayValue::Scalar { .. })));
    assert_eq!(engine.cache().len(), 1);
}
