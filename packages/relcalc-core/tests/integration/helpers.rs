//! Shared fixture: customers, items and orders linked by relations.

use std::sync::Arc;

use relcalc_core::schema::{
    Formula, LookupConfig, NumberConfig, RawColumn, RelationConfig, RollupConfig,
};
use relcalc_core::{
    AggregateFunction, Cardinality, CellDisplayValue, Column, ColumnKind, EngineConfig,
    MemoryStore, RelationEngine, Row, ScalarValue, Schema, TableId,
};
use serde_json::json;

pub const ORDERS: &str = "orders";
pub const CUSTOMERS: &str = "customers";
pub const ITEMS: &str = "items";

fn relation(target: &str, cardinality: Cardinality, display: Option<&str>) -> ColumnKind {
    ColumnKind::Relation(RelationConfig {
        target_table_id: target.into(),
        cardinality,
        display_field_id: display.map(Into::into),
    })
}

fn lookup(source: &str, field: &str) -> ColumnKind {
    ColumnKind::Lookup(LookupConfig {
        source_relation_column_id: source.into(),
        target_field_id: field.into(),
    })
}

fn rollup(source: &str, field: &str, function: AggregateFunction) -> ColumnKind {
    ColumnKind::Rollup(RollupConfig {
        source_relation_column_id: source.into(),
        target_field_id: field.into(),
        function,
        separator: None,
    })
}

fn formula(expression: &str) -> ColumnKind {
    match Formula::parse(expression) {
        Ok(formula) => ColumnKind::Formula(formula),
        Err(e) => panic!("bad fixture formula {}: {}", expression, e),
    }
}

pub fn customers_schema() -> Schema {
    Schema::new(
        CUSTOMERS,
        vec![
            Column::new("cu_name", "Name", ColumnKind::Text),
            Column::new("cu_email", "Email", ColumnKind::Email),
        ],
    )
}

pub fn items_schema() -> Schema {
    Schema::new(
        ITEMS,
        vec![
            Column::new("i_name", "Name", ColumnKind::Text),
            Column::new(
                "i_price",
                "Price",
                ColumnKind::Number(NumberConfig { precision: Some(2) }),
            ),
            Column::new("i_maker", "Maker", relation(CUSTOMERS, Cardinality::ManyToOne, None)),
            Column::new("i_maker_name", "Maker name", lookup("i_maker", "cu_name")),
        ],
    )
}

pub fn orders_schema() -> Schema {
    let mut schema = Schema::new(
        ORDERS,
        vec![
            Column::new("o_title", "Title", ColumnKind::Text),
            Column::new(
                "o_customer",
                "Customer",
                relation(CUSTOMERS, Cardinality::ManyToOne, Some("cu_name")),
            ),
            Column::new(
                "o_contacts",
                "Contacts",
                relation(CUSTOMERS, Cardinality::OneToMany, Some("cu_name")),
            ),
            Column::new("o_items", "Items", relation(ITEMS, Cardinality::OneToMany, None)),
            Column::new("o_archive", "Archive", relation("archive", Cardinality::OneToOne, None)),
            Column::new("o_customer_name", "Customer name", lookup("o_customer", "cu_name")),
            Column::new("o_contact_names", "Contact names", lookup("o_contacts", "cu_name")),
            Column::new("o_item_makers", "Item makers", lookup("o_items", "i_maker")),
            Column::new("o_item_maker_names", "Maker names", lookup("o_items", "i_maker_name")),
            Column::new("o_archive_note", "Archive note", lookup("o_archive", "note")),
            Column::new("o_bad_lookup", "Bad lookup", lookup("o_title", "cu_name")),
            Column::new("o_total", "Total", rollup("o_items", "i_price", AggregateFunction::Sum)),
            Column::new("o_avg", "Average", rollup("o_items", "i_price", AggregateFunction::Avg)),
            Column::new(
                "o_names",
                "Item names",
                rollup("o_items", "i_name", AggregateFunction::Concat),
            ),
            Column::new(
                "o_email_sum",
                "Email sum",
                rollup("o_contacts", "cu_email", AggregateFunction::Sum),
            ),
            Column::new(
                "o_maker_rollup",
                "Maker rollup",
                rollup("o_items", "i_maker_name", AggregateFunction::Concat),
            ),
            Column::new("o_item_count", "Item count", formula("count(o_items)")),
            Column::new("o_price_max", "Max price", formula("max(o_items.i_price)")),
            Column::new(
                "o_name_list",
                "Name list",
                formula("concat(o_items.i_name, \" / \")"),
            ),
        ],
    );

    // Stored definitions that cannot be evaluated
    let raw: RawColumn = serde_json::from_value(json!({
        "id": "o_deep",
        "name": "Deep",
        "type": "formula",
        "config": {"expression": "concat(o_items.i_maker.cu_name)"}
    }))
    .unwrap();
    schema.columns.push(Column::from_raw(&raw));
    schema
}

pub fn seed_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_table(
        customers_schema(),
        vec![
            Row::new("c1")
                .with("cu_name", json!("Alice"))
                .with("cu_email", json!("alice@example.com")),
            Row::new("c2")
                .with("cu_name", json!("Bob"))
                .with("cu_email", json!("bob@example.com")),
        ],
    );
    store.create_table(
        items_schema(),
        vec![
            Row::new("i1")
                .with("i_name", json!("Apple"))
                .with("i_price", json!(10))
                .with("i_maker", json!("c1")),
            Row::new("i2")
                .with("i_name", json!("Banana"))
                .with("i_price", json!(20.5))
                .with("i_maker", json!("c2")),
            Row::new("i3")
                .with("i_name", json!("Cherry"))
                .with("i_price", json!("30")),
        ],
    );
    store.create_table(
        orders_schema(),
        vec![
            Row::new("o1")
                .with("o_title", json!("First"))
                .with("o_customer", json!("c1"))
                .with("o_contacts", json!(["c1", "c2"]))
                .with("o_items", json!(["i1", "i2", "i3"]))
                .with("o_archive", json!("a1")),
            Row::new("o2")
                .with("o_title", json!("Second"))
                .with("o_customer", json!(["c2"]))
                .with("o_contacts", json!([]))
                .with("o_items", json!([{"id": "i2"}])),
            Row::new("o3")
                .with("o_customer", json!("c_gone"))
                .with("o_contacts", json!(["c_gone", "c2"])),
        ],
    );
    store
}

pub fn engine(store: &Arc<MemoryStore>) -> RelationEngine {
    RelationEngine::new(store.clone(), EngineConfig::default())
}

pub fn fixture() -> (Arc<MemoryStore>, RelationEngine) {
    let store = seed_store();
    let engine = engine(&store);
    (store, engine)
}

pub async fn cell(engine: &RelationEngine, table: &str, row: &str, column: &str) -> CellDisplayValue {
    engine
        .evaluate_cell(&table.into(), &row.into(), &column.into())
        .await
}

pub fn text(value: &str) -> CellDisplayValue {
    CellDisplayValue::Scalar {
        value: ScalarValue::Text(value.to_string()),
    }
}

pub fn list(values: &[&str]) -> CellDisplayValue {
    CellDisplayValue::List {
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

pub fn error(message: &str) -> CellDisplayValue {
    CellDisplayValue::Error {
        message: message.to_string(),
    }
}

pub fn get_rows_calls(store: &MemoryStore, table: &str) -> u64 {
    store.stats(&TableId::from(table)).get_rows_calls
}
