use serde_json::{json, Value};
use signage_ops::config::{ReconcileConfig, ReferenceStyle};
use signage_ops::migrate::{migrate_settings, SettingsSchema};
use signage_ops::reconcile::{run_pass, Mode, RunContext};
use signage_ops::store::memory::{MemoryBlobStore, MemoryStore};
use signage_ops::store::Row;

fn row(v: Value) -> Row {
    v.as_object().cloned().unwrap()
}

fn blobs() -> MemoryBlobStore {
    MemoryBlobStore::default()
        .with_bucket("branding", &["1_BMS_logo.svg"])
        .with_bucket("uniforms", &["blue-jersey.png"])
        .with_bucket("ui-elements", &["stationery-icon.png"])
        .with_bucket("announcements", &["back-to-school-sale.png"])
        .with_bucket("products", &["exam-essentials.png", "lab-coat.jpg"])
}

fn content_store() -> MemoryStore {
    MemoryStore::new()
        .with_table(
            "announcements",
            &["id", "title", "image_url"],
            vec![row(json!({"id": "42", "title": "Back To School Sale", "image_url": null}))],
        )
        .with_table(
            "products",
            &["id", "name", "image_url"],
            vec![
                row(json!({"id": 1, "name": "Exam Essentials", "image_url": "old/exam.png"})),
                row(json!({"id": 2, "name": "Lab Coat", "image_url": null})),
                row(json!({"id": 3, "name": "Unlisted Item", "image_url": "keep-me.png"})),
            ],
        )
        .with_table(
            "categories",
            &["id", "name", "image_url"],
            vec![row(json!({"id": 7, "name": "Stationery", "image_url": null}))],
        )
}

fn only(tables: &[&str]) -> Vec<String> {
    tables.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn direct_mode_repairs_announcement_reference() {
    let store = content_store();
    let blobs = blobs();
    let config = ReconcileConfig::default();
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };

    let tables = only(&["announcements"]);
    let report = run_pass(&ctx, Mode::Direct, Some(tables.as_slice())).await.unwrap();

    let rows = store.rows("announcements");
    assert_eq!(rows[0]["image_url"], json!("announcements/back-to-school-sale.png"));
    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].table, "announcements");
    assert_eq!(report.tables[0].succeeded, 1);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn second_direct_pass_is_a_noop() {
    let store = content_store();
    let blobs = blobs();
    let config = ReconcileConfig::default();
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };
    let tables = only(&["announcements", "products", "categories"]);

    let first = run_pass(&ctx, Mode::Direct, Some(tables.as_slice())).await.unwrap();
    assert_eq!(first.total(|t| t.succeeded), 4);
    let products = store.rows("products");
    assert_eq!(products[0]["image_url"], json!("products/exam-essentials.png"));
    assert_eq!(products[1]["image_url"], json!("products/lab-coat.jpg"));
    // no plausible asset: left exactly as it was
    assert_eq!(products[2]["image_url"], json!("keep-me.png"));
    // categories fall through products to ui-elements
    assert_eq!(
        store.rows("categories")[0]["image_url"],
        json!("ui-elements/stationery-icon.png")
    );

    let writes = store.write_count();
    let second = run_pass(&ctx, Mode::Direct, Some(tables.as_slice())).await.unwrap();
    assert_eq!(store.write_count(), writes);
    assert_eq!(second.total(|t| t.attempted), 0);
    assert_eq!(second.total(|t| t.already_correct), 4);
    assert_eq!(second.total(|t| t.no_candidate), 1);
}

#[tokio::test]
async fn script_runs_are_stable_and_read_only() {
    let store = content_store();
    let blobs = blobs();
    let config = ReconcileConfig::default();
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };
    let tables = only(&["announcements", "products", "categories"]);

    let strip_timestamp = |sql: &str| {
        sql.lines()
            .filter(|l| !l.starts_with("-- Generated at:"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let a = run_pass(&ctx, Mode::Script, Some(tables.as_slice())).await.unwrap();
    let b = run_pass(&ctx, Mode::Script, Some(tables.as_slice())).await.unwrap();
    let (a, b) = (a.script.unwrap(), b.script.unwrap());

    assert_eq!(strip_timestamp(&a), strip_timestamp(&b));
    assert_eq!(store.write_count(), 0);
    assert_eq!(a.matches("UPDATE ").count(), 4);
    assert!(a.contains(
        "WHERE \"id\"::text = '42' AND \"image_url\" IS DISTINCT FROM 'announcements/back-to-school-sale.png';"
    ));
    assert!(a.contains("--   previous: old/exam.png"));
}

#[tokio::test]
async fn unreachable_storage_aborts_before_any_write() {
    let store = content_store();
    let blobs = blobs();
    for bucket in ["branding", "uniforms", "ui-elements", "announcements", "products"] {
        blobs.fail_bucket(bucket);
    }
    let config = ReconcileConfig::default();
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };

    assert!(run_pass(&ctx, Mode::Direct, None).await.is_err());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn one_failing_bucket_degrades_only_its_matches() {
    let store = content_store();
    let blobs = blobs();
    blobs.fail_bucket("announcements");
    let config = ReconcileConfig::default();
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };
    let tables = only(&["announcements", "products"]);

    let report = run_pass(&ctx, Mode::Direct, Some(tables.as_slice())).await.unwrap();
    assert!(report.has_failures());
    assert_eq!(store.rows("announcements")[0]["image_url"], Value::Null);
    assert_eq!(store.rows("products")[1]["image_url"], json!("products/lab-coat.jpg"));
    assert!(report.render().contains("FAILED"));
}

#[tokio::test]
async fn migrated_settings_logo_resolves_to_public_url() {
    let store = MemoryStore::new();
    migrate_settings(&store, &SettingsSchema::default()).await.unwrap();

    let blobs = blobs();
    let config = ReconcileConfig {
        reference_style: ReferenceStyle::PublicUrl,
        ..Default::default()
    };
    let ctx = RunContext {
        store: &store,
        blobs: &blobs,
        config: &config,
        schema: "public",
    };
    let tables = only(&["settings"]);
    let report = run_pass(&ctx, Mode::Direct, Some(tables.as_slice())).await.unwrap();

    assert_eq!(report.tables[0].succeeded, 1);
    assert_eq!(
        store.rows("settings")[0]["logo_url"],
        json!("https://storage.test/storage/v1/object/public/branding/1_BMS_logo.svg")
    );
}
