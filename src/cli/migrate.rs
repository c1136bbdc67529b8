use anyhow::{bail, Context, Result};

use crate::migrate::{migrate_settings, SettingsSchema};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct MigrateSettingsConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    /// Settings table name (default: settings).
    pub table: Option<String>,
    pub json: bool,
}

pub async fn run(cfg: MigrateSettingsConfig) -> Result<()> {
    env_util::init_env();
    env_util::preflight_check("migrate-settings", &[], super::SNAPSHOT_KEYS)?;
    let schema = cfg
        .table
        .as_deref()
        .map(SettingsSchema::for_table)
        .unwrap_or_default();

    let db = super::connect_db(cfg.database_url.clone(), "signage-migrate").await?;
    let report = migrate_settings(&db, &schema)
        .await
        .with_context(|| format!("migrating {} failed", schema.table))?;

    println!("{}", report.render());
    if cfg.json {
        println!("{}", serde_json::to_string(&report)?);
    }
    if !report.converged {
        bail!(
            "{} did not converge: {} column(s) could not be added",
            report.table,
            report.columns_missing.len()
        );
    }
    Ok(())
}
