use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::reconcile::{run_pass, Mode, RunContext, RunReport};
use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct ReconcileCmdConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    /// Optional JSON config; falls back to RECONCILE_CONFIG, then defaults.
    pub config_path: Option<PathBuf>,
    pub mode: Mode,
    /// Where script mode writes its SQL batch.
    pub out: Option<PathBuf>,
    /// Restrict the pass to these tables.
    pub tables: Option<Vec<String>>,
    /// Also print the report as one JSON line.
    pub json: bool,
}

impl Default for ReconcileCmdConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            config_path: None,
            mode: Mode::Direct,
            out: None,
            tables: None,
            json: false,
        }
    }
}

pub fn default_script_path(generated_at: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!(
        "reconcile-{}.sql",
        generated_at.format("%Y%m%dT%H%M%SZ")
    ))
}

/// Reject table filters that name no configured target.
pub fn check_tables(config: &ReconcileConfig, tables: Option<&[String]>) -> Result<()> {
    let Some(tables) = tables else {
        return Ok(());
    };
    let unknown: Vec<&str> = tables
        .iter()
        .filter(|t| !config.targets.iter().any(|c| &c.table == *t))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        bail!("unknown table(s) in --tables: {}", unknown.join(", "));
    }
    Ok(())
}

pub fn write_script(path: &Path, sql: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, sql).with_context(|| format!("failed to write {}", path.display()))
}

/// Print the report; in script mode also persist the batch unless no table
/// could be read. Errors when any per-item failure was recorded.
pub fn finish(report: &RunReport, out: Option<&Path>, json: bool) -> Result<()> {
    if report.script.is_some() && report.loaded_tables() == 0 {
        warn!("no table could be read; review script not written");
    } else if let Some(sql) = &report.script {
        let path = out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_script_path(report.generated_at));
        write_script(&path, sql)?;
        info!(path = %path.display(), "review script written");
        println!("Review script: {}", path.display());
    }
    println!("{}", report.render());
    if json {
        println!("{}", serde_json::to_string(report)?);
    }
    if report.has_failures() {
        bail!("reconcile finished with failures; see summary above");
    }
    Ok(())
}

pub async fn run(cfg: ReconcileCmdConfig) -> Result<()> {
    env_util::init_env();
    env_util::preflight_check("reconcile", super::STORAGE_KEYS, super::SNAPSHOT_KEYS)?;
    let config = ReconcileConfig::load(cfg.config_path.as_deref())?;
    check_tables(&config, cfg.tables.as_deref())?;

    let db = super::connect_db(cfg.database_url.clone(), "signage-reconcile").await?;
    let blobs = super::storage()?;
    let ctx = RunContext {
        store: &db,
        blobs: &blobs,
        config: &config,
        schema: &db.schema,
    };
    info!(mode = cfg.mode.as_str(), "reconcile: starting pass");
    let report = run_pass(&ctx, cfg.mode, cfg.tables.as_deref())
        .await
        .context("reconcile pass aborted")?;
    finish(&report, cfg.out.as_deref(), cfg.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::TableSummary;
    use chrono::TimeZone;

    #[test]
    fn default_script_name_carries_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 8, 1, 9, 5, 3).unwrap();
        assert_eq!(
            default_script_path(at),
            PathBuf::from("reconcile-20240801T090503Z.sql")
        );
    }

    #[test]
    fn unknown_tables_are_rejected() {
        let cfg = ReconcileConfig::default();
        assert!(check_tables(&cfg, None).is_ok());
        assert!(check_tables(&cfg, Some(&["products".to_string()][..])).is_ok());
        let err = check_tables(&cfg, Some(&["products".to_string(), "menus".to_string()][..])).unwrap_err();
        assert!(err.to_string().contains("menus"));
    }

    fn script_report(tables: Vec<TableSummary>) -> RunReport {
        RunReport {
            mode: Mode::Script,
            generated_at: Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(),
            buckets: Vec::new(),
            tables,
            script: Some("BEGIN;\nCOMMIT;\n".to_string()),
        }
    }

    #[test]
    fn no_script_file_when_every_table_failed_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.sql");
        let mut lost = TableSummary::new("products");
        lost.load_error = Some("transport error during select products: connection reset".into());

        let err = finish(&script_report(vec![lost]), Some(&path), false).unwrap_err();
        assert!(err.to_string().contains("failures"));
        assert!(!path.exists());
    }

    #[test]
    fn script_file_written_when_tables_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.sql");
        finish(&script_report(vec![TableSummary::new("products")]), Some(&path), false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn script_lands_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/batch.sql");
        write_script(&path, "BEGIN;\nCOMMIT;\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "BEGIN;\nCOMMIT;\n");
    }
}
