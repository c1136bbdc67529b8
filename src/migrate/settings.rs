//! Converges the display-settings table to its required shape and to exactly
//! one row.
//!
//! Detection goes through catalog introspection only, so the migrator is safe
//! to re-run against a database left half-migrated by an earlier attempt.
//! Columns are only ever added; nothing is dropped or re-typed.
use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{OpsError, OpsResult};
use crate::store::sql::key_text;
use crate::store::{ColumnDef, ColumnDefault, DdlStatement, KeyFilter, RelationalStore, Row};

pub const DEFAULT_TABLE: &str = "settings";

/// Required columns of the settings table, in creation order.
#[derive(Debug, Clone)]
pub struct SettingsSchema {
    pub table: String,
    pub id_column: String,
    /// Creation timestamp; the oldest row survives de-duplication.
    pub created_column: String,
    pub columns: Vec<ColumnDef>,
}

impl Default for SettingsSchema {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            id_column: "id".to_string(),
            created_column: "created_at".to_string(),
            columns: vec![
                ColumnDef::literal("slide_duration_seconds", "INTEGER", json!(10)),
                ColumnDef::literal("announcement_duration_seconds", "INTEGER", json!(15)),
                ColumnDef::literal("refresh_interval_minutes", "INTEGER", json!(5)),
                ColumnDef::literal("currency_code", "TEXT", json!("USD")),
                ColumnDef::literal("timezone", "TEXT", json!("UTC")),
                ColumnDef::literal("primary_color", "TEXT", json!("#1E3A8A")),
                ColumnDef::literal("secondary_color", "TEXT", json!("#F59E0B")),
                ColumnDef::literal("background_color", "TEXT", json!("#FFFFFF")),
                ColumnDef::literal("text_color", "TEXT", json!("#111827")),
                ColumnDef::literal("logo_url", "TEXT", json!("")),
                ColumnDef::now("created_at"),
                ColumnDef::now("updated_at"),
            ],
        }
    }
}

impl SettingsSchema {
    pub fn for_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Every column the table must carry: the identity key first, then the
    /// settings fields in creation order.
    pub fn required_columns(&self) -> Vec<ColumnDef> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(ColumnDef::identity(&self.id_column));
        columns.extend(self.columns.iter().cloned());
        columns
    }

    fn create_statement(&self) -> DdlStatement {
        DdlStatement::CreateTable {
            table: self.table.clone(),
            columns: self.required_columns(),
        }
    }

    /// Literal defaults for a freshly inserted row. Timestamps and the id are
    /// left to the store.
    fn default_row(&self) -> Row {
        self.columns
            .iter()
            .filter_map(|c| match &c.default {
                ColumnDefault::Literal(v) => Some((c.name.clone(), v.clone())),
                ColumnDefault::Now | ColumnDefault::Identity => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnFailure {
    pub column: String,
    pub error: String,
}

/// What one migrator run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub table: String,
    pub table_created: bool,
    pub columns_added: Vec<String>,
    pub columns_failed: Vec<ColumnFailure>,
    /// Required columns still missing after the schema step.
    pub columns_missing: Vec<String>,
    pub row_inserted: bool,
    pub rows_deleted: u64,
    /// Id of the surviving row, when the row step ran.
    pub kept_id: Option<String>,
    pub converged: bool,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.table_created
            || !self.columns_added.is_empty()
            || self.row_inserted
            || self.rows_deleted > 0
    }

    pub fn render(&self) -> String {
        let mut lines = vec![format!("MIGRATE {}", self.table)];
        lines.push(format!("  table created:   {}", self.table_created));
        lines.push(format!(
            "  columns added:   {}",
            if self.columns_added.is_empty() {
                "-".to_string()
            } else {
                self.columns_added.join(", ")
            }
        ));
        for f in &self.columns_failed {
            lines.push(format!("  ! column {} failed: {}", f.column, f.error));
        }
        if !self.columns_missing.is_empty() {
            lines.push(format!(
                "  ! still missing: {} (row step skipped)",
                self.columns_missing.join(", ")
            ));
        }
        lines.push(format!("  row inserted:    {}", self.row_inserted));
        lines.push(format!("  rows deleted:    {}", self.rows_deleted));
        if let Some(id) = &self.kept_id {
            lines.push(format!("  kept row id:     {id}"));
        }
        lines.push(format!("  converged:       {}", self.converged));
        lines.join("\n")
    }
}

/// Oldest first by creation timestamp; rows without one go last. Ids break
/// ties.
fn compare_rows(a: &Row, b: &Row, schema: &SettingsSchema) -> Ordering {
    let created = |r: &Row| {
        r.get(&schema.created_column)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::<FixedOffset>::parse_from_rfc3339(s).ok())
    };
    let by_created = match (created(a), created(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let null = Value::Null;
    by_created.then_with(|| {
        compare_ids(
            a.get(&schema.id_column).unwrap_or(&null),
            b.get(&schema.id_column).unwrap_or(&null),
        )
    })
}

/// Numeric ids order numerically; anything else falls back to text order.
fn compare_ids(a: &Value, b: &Value) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => key_text(a).cmp(&key_text(b)),
    }
}

async fn missing_columns(store: &dyn RelationalStore, schema: &SettingsSchema) -> OpsResult<Vec<String>> {
    let present: Vec<String> = store
        .introspect_columns(&schema.table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    Ok(schema
        .required_columns()
        .iter()
        .filter(|c| !present.iter().any(|p| p == &c.name))
        .map(|c| c.name.clone())
        .collect())
}

/// Bring the settings table to its required shape, then to exactly one row.
///
/// A column that cannot be added is recorded and the remaining columns are
/// still attempted, but the row step is skipped and the report is left
/// unconverged. Store errors outside the per-column step abort the run.
pub async fn migrate_settings(
    store: &dyn RelationalStore,
    schema: &SettingsSchema,
) -> OpsResult<MigrationReport> {
    let mut report = MigrationReport {
        table: schema.table.clone(),
        ..Default::default()
    };

    if !store.table_exists(&schema.table).await? {
        store.execute_ddl(&schema.create_statement()).await?;
        report.table_created = true;
        info!(table = %schema.table, "settings table created");
    } else {
        let required = schema.required_columns();
        for name in missing_columns(store, schema).await? {
            let Some(column) = required.iter().find(|c| c.name == name) else {
                continue;
            };
            let stmt = DdlStatement::AddColumn {
                table: schema.table.clone(),
                column: column.clone(),
            };
            match store.execute_ddl(&stmt).await {
                Ok(()) => {
                    info!(table = %schema.table, column = %name, "column added");
                    report.columns_added.push(name);
                }
                Err(e) => {
                    warn!(table = %schema.table, column = %name, error = %e, "adding column failed");
                    report.columns_failed.push(ColumnFailure {
                        column: name,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    report.columns_missing = missing_columns(store, schema).await?;
    if !report.columns_missing.is_empty() {
        warn!(
            table = %schema.table,
            missing = ?report.columns_missing,
            "schema not converged; leaving rows untouched"
        );
        return Ok(report);
    }

    let mut rows = store
        .select(
            &schema.table,
            &[schema.id_column.as_str(), schema.created_column.as_str()],
            None,
        )
        .await?;
    match rows.len() {
        0 => {
            store.insert(&schema.table, &schema.default_row()).await?;
            report.row_inserted = true;
            info!(table = %schema.table, "default settings row inserted");
            let created = store
                .select(&schema.table, &[schema.id_column.as_str()], None)
                .await?;
            report.kept_id = created
                .first()
                .and_then(|r| r.get(&schema.id_column))
                .and_then(key_text);
        }
        1 => {
            report.kept_id = rows[0].get(&schema.id_column).and_then(key_text);
        }
        n => {
            rows.sort_by(|a, b| compare_rows(a, b, schema));
            let ids: Vec<String> = rows
                .iter()
                .map(|r| r.get(&schema.id_column).and_then(key_text))
                .collect::<Option<_>>()
                .ok_or_else(|| {
                    OpsError::Validation(format!(
                        "{} has rows without a usable {}",
                        schema.table, schema.id_column
                    ))
                })?;
            let (keep, extra) = ids.split_at(1);
            for id in extra {
                report.rows_deleted += store
                    .delete(&schema.table, &KeyFilter::new(&schema.id_column, id))
                    .await?;
            }
            report.kept_id = Some(keep[0].clone());
            info!(
                table = %schema.table,
                found = n,
                deleted = report.rows_deleted,
                kept = %keep[0],
                "duplicate settings rows removed"
            );
        }
    }

    report.converged = true;
    Ok(report)
}
