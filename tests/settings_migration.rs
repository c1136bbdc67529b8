use serde_json::json;
use signage_ops::migrate::{migrate_settings, SettingsSchema};
use signage_ops::store::memory::MemoryStore;
use signage_ops::store::{ColumnDef, RelationalStore};

#[tokio::test]
async fn half_migrated_table_with_duplicates_converges_in_one_run() {
    let store = MemoryStore::new().with_defined_table(
        "display_settings",
        vec![
            ColumnDef::identity("id"),
            ColumnDef::literal("timezone", "TEXT", json!("UTC")),
        ],
        vec![
            json!({"id": 5, "timezone": "Africa/Johannesburg"}).as_object().cloned().unwrap(),
            json!({"id": 3, "timezone": "Europe/London"}).as_object().cloned().unwrap(),
            json!({"id": 8, "timezone": "UTC"}).as_object().cloned().unwrap(),
        ],
    );
    let schema = SettingsSchema::for_table("display_settings");

    let report = migrate_settings(&store, &schema).await.unwrap();
    assert!(report.converged);
    assert_eq!(report.columns_added.len(), 11);
    assert_eq!(report.rows_deleted, 2);
    assert_eq!(report.kept_id.as_deref(), Some("3"));

    let columns = store.introspect_columns("display_settings").await.unwrap();
    for required in &schema.columns {
        let col = columns.iter().find(|c| c.name == required.name).unwrap();
        assert!(!col.nullable, "{} should be NOT NULL", col.name);
        assert!(col.default.is_some(), "{} should carry a default", col.name);
    }
    let rows = store.rows("display_settings");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["timezone"], json!("Europe/London"));
    assert_eq!(rows[0]["primary_color"], json!("#1E3A8A"));

    let again = migrate_settings(&store, &schema).await.unwrap();
    assert!(!again.changed());
    assert_eq!(again.kept_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn report_serializes_for_json_output() {
    let store = MemoryStore::new();
    let report = migrate_settings(&store, &SettingsSchema::default()).await.unwrap();
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["table"], json!("settings"));
    assert_eq!(v["table_created"], json!(true));
    assert_eq!(v["row_inserted"], json!(true));
    assert_eq!(v["converged"], json!(true));
}
