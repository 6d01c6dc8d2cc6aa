//! Lookup, rollup, formula and relation cell values.

use relcalc_core::{CellDisplayValue, DisplayOptions, ScalarValue};

use super::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_single_lookup() {
    let (_store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer_name").await, text("Alice"));
    assert_eq!(cell(&engine, ORDERS, "o2", "o_customer_name").await, text("Bob"));
}

#[tokio::test(start_paused = true)]
async fn test_multi_lookup_keeps_link_order() {
    let (_store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_contact_names").await,
        list(&["Alice", "Bob"])
    );
    assert_eq!(cell(&engine, ORDERS, "o2", "o_contact_names").await, CellDisplayValue::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_missing_targets_are_skipped() {
    let (_store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o3", "o_customer_name").await, CellDisplayValue::Empty);
    assert_eq!(cell(&engine, ORDERS, "o3", "o_contact_names").await, list(&["Bob"]));
}

#[tokio::test(start_paused = true)]
async fn test_missing_source_row_is_empty() {
    let (_store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o404", "o_total").await, CellDisplayValue::Empty);
    assert_eq!(cell(&engine, ORDERS, "o404", "o_title").await, CellDisplayValue::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_of_relation_and_derived_fields() {
    let (_store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_item_makers").await,
        list(&["c1", "c2", ""])
    );
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_item_maker_names").await,
        list(&["—", "—", "—"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_relation_cells_show_labels() {
    let (_store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_customer").await, text("Alice"));
    assert_eq!(cell(&engine, ORDERS, "o1", "o_contacts").await, list(&["Alice", "Bob"]));
    // No display field: falls back to the Name column
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_items").await,
        list(&["Apple", "Banana", "Cherry"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_rollups() {
    let (_store, engine) = fixture();
    let options = DisplayOptions::default();

    let total = cell(&engine, ORDERS, "o1", "o_total").await;
    assert_eq!(
        total,
        CellDisplayValue::Scalar {
            value: ScalarValue::Number(60.5)
        }
    );
    assert_eq!(total.display(&options), "60.50");

    let avg = cell(&engine, ORDERS, "o1", "o_avg").await;
    assert_eq!(avg.display(&options), "20.17");

    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_names").await,
        text("Apple, Banana, Cherry")
    );
    assert_eq!(cell(&engine, ORDERS, "o2", "o_total").await.display(&options), "20.50");
}

#[tokio::test(start_paused = true)]
async fn test_rollups_over_no_links() {
    let (_store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o3", "o_total").await,
        CellDisplayValue::Scalar {
            value: ScalarValue::Number(0.0)
        }
    );
    let total = cell(&engine, ORDERS, "o3", "o_total").await;
    assert_eq!(total.display(&DisplayOptions::default()), "0.00");
    assert_eq!(
        serde_json::to_string(&total).unwrap(),
        r#"{"kind":"scalar","value":0.0}"#
    );
    assert_eq!(cell(&engine, ORDERS, "o3", "o_avg").await, CellDisplayValue::Empty);
    assert_eq!(cell(&engine, ORDERS, "o3", "o_names").await, CellDisplayValue::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_formulas() {
    let (_store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_item_count").await,
        CellDisplayValue::Scalar {
            value: ScalarValue::Count(3)
        }
    );
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_price_max").await,
        CellDisplayValue::Scalar {
            value: ScalarValue::Number(30.0)
        }
    );
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_name_list").await,
        text("Apple / Banana / Cherry")
    );
}

#[tokio::test(start_paused = true)]
async fn test_multi_hop_is_misconfigured() {
    let (_store, engine) = fixture();
    let misconfigured = error("Column is misconfigured");

    assert_eq!(cell(&engine, ORDERS, "o1", "o_maker_rollup").await, misconfigured);
    assert_eq!(cell(&engine, ORDERS, "o1", "o_deep").await, misconfigured);
    assert_eq!(cell(&engine, ORDERS, "o1", "o_bad_lookup").await, misconfigured);
    assert_eq!(cell(&engine, ORDERS, "o1", "no_such_column").await, misconfigured);
}

#[tokio::test(start_paused = true)]
async fn test_type_mismatch() {
    let (_store, engine) = fixture();
    let value = cell(&engine, ORDERS, "o1", "o_email_sum").await;
    assert_eq!(value, error("Cannot sum email values"));
    assert!(value.is_error());
    assert_eq!(value.display(&DisplayOptions::default()), "—");
}

#[tokio::test(start_paused = true)]
async fn test_deleted_target_table() {
    let (_store, engine) = fixture();
    assert_eq!(
        cell(&engine, ORDERS, "o1", "o_archive_note").await,
        error("Linked table was deleted")
    );
}

#[tokio::test(start_paused = true)]
async fn test_plain_columns_are_not_cached() {
    let (_store, engine) = fixture();
    assert_eq!(cell(&engine, ORDERS, "o1", "o_title").await, text("First"));
    assert!(engine.cache().is_empty());

    cell(&engine, ORDERS, "o1", "o_total").await;
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cell_values_serialize_tagged() {
    let value = serde_json::to_value(list(&["Alice"])).unwrap();
    assert_eq!(value, serde_json::json!({"kind": "list", "values": ["Alice"]}));

    let value = serde_json::to_value(CellDisplayValue::Scalar {
        value: ScalarValue::Count(2),
    })
    .unwrap();
    assert_eq!(value, serde_json::json!({"kind": "scalar", "value": 2}));
    assert_eq!(
        serde_json::to_value(CellDisplayValue::Empty).unwrap(),
        serde_json::json!({"kind": "empty"})
    );
}
