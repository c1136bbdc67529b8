//! Run configuration for the reconciliation engine.
//!
//! Keyword rules and per-table bucket scoping are shared by every command.
//! `ReconcileConfig::default()` is the canonical setup; a JSON file can
//! override any part of it.
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::normalization::{BucketId, RuleTable};
use crate::util::env as envutil;

/// Which form of an asset reference gets written into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// `bucket/stored_name`
    #[default]
    Canonical,
    /// Resolved public URL.
    PublicUrl,
}

/// Where a record's matching key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Value of this column.
    Column(String),
    /// The same literal key for every row (e.g. `logo` for the settings row).
    Fixed(String),
}

/// One table whose image column is reconciled against the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileTarget {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub name: NameSource,
    #[serde(default = "default_image_column")]
    pub image_column: String,
    /// Searched in order; the first bucket with a hit wins.
    pub buckets: Vec<BucketId>,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_image_column() -> String {
    "image_url".to_string()
}

impl ReconcileTarget {
    fn new(table: &str, name: NameSource, image_column: &str, buckets: &[BucketId]) -> Self {
        Self {
            table: table.to_string(),
            id_column: default_id_column(),
            name,
            image_column: image_column.to_string(),
            buckets: buckets.to_vec(),
        }
    }

    /// Columns to read for this target, deduplicated and in a stable order.
    pub fn select_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.id_column.as_str()];
        if let NameSource::Column(c) = &self.name {
            cols.push(c.as_str());
        }
        cols.push(self.image_column.as_str());
        cols.dedup();
        cols
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Buckets enumerated by the inventory builder.
    pub buckets: Vec<BucketId>,
    pub rules: RuleTable,
    pub targets: Vec<ReconcileTarget>,
    pub reference_style: ReferenceStyle,
    /// Page size per bucket listing. A full page is reported as truncated.
    pub list_limit: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        use BucketId::*;
        Self {
            buckets: BucketId::ALL.to_vec(),
            rules: RuleTable::default(),
            targets: vec![
                ReconcileTarget::new("products", NameSource::Column("name".into()), "image_url", &[Products]),
                // category art has lived in both buckets; products is searched first
                ReconcileTarget::new(
                    "categories",
                    NameSource::Column("name".into()),
                    "image_url",
                    &[Products, UiElements],
                ),
                ReconcileTarget::new(
                    "announcements",
                    NameSource::Column("title".into()),
                    "image_url",
                    &[Announcements, UiElements],
                ),
                ReconcileTarget::new("settings", NameSource::Fixed("logo".into()), "logo_url", &[Branding]),
            ],
            reference_style: ReferenceStyle::Canonical,
            list_limit: 1000,
        }
    }
}

impl ReconcileConfig {
    /// Parse a JSON config file. Missing sections fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Explicit path, else RECONCILE_CONFIG, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::from_file(p);
        }
        match envutil::env_opt("RECONCILE_CONFIG") {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.list_limit == 0 {
            bail!("list_limit must be positive");
        }
        for t in &self.targets {
            if t.buckets.is_empty() {
                bail!("target {} has no candidate buckets", t.table);
            }
            if let Some(b) = t.buckets.iter().find(|b| !self.buckets.contains(b)) {
                bail!("target {} searches bucket {b} which is not inventoried", t.table);
            }
            if let NameSource::Fixed(key) = &t.name {
                if key.trim().is_empty() {
                    bail!("target {} has an empty fixed match key", t.table);
                }
            }
        }
        Ok(())
    }

    /// Targets restricted to `tables` (all when `None`), in configured order.
    pub fn targets_for(&self, tables: Option<&[String]>) -> Vec<&ReconcileTarget> {
        self.targets
            .iter()
            .filter(|t| tables.map_or(true, |names| names.iter().any(|n| n == &t.table)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let cfg = ReconcileConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.targets.len(), 4);
        assert_eq!(cfg.list_limit, 1000);
    }

    #[test]
    fn select_columns_skip_fixed_names() {
        let cfg = ReconcileConfig::default();
        let settings = cfg.targets.iter().find(|t| t.table == "settings").unwrap();
        assert_eq!(settings.select_columns(), vec!["id", "logo_url"]);
        let ann = cfg.targets.iter().find(|t| t.table == "announcements").unwrap();
        assert_eq!(ann.select_columns(), vec!["id", "title", "image_url"]);
    }

    #[test]
    fn partial_file_keeps_default_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "reference_style": "public_url",
                "targets": [
                    {{"table": "products", "name": {{"column": "title"}}, "buckets": ["products"]}}
                ]
            }}"#
        )
        .unwrap();
        let cfg = ReconcileConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.reference_style, ReferenceStyle::PublicUrl);
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.targets[0].image_column, "image_url");
        assert_eq!(cfg.rules, RuleTable::default());
    }

    #[test]
    fn rejects_target_outside_inventory() {
        let mut cfg = ReconcileConfig::default();
        cfg.buckets = vec![BucketId::Products];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn targets_filter_by_table_name() {
        let cfg = ReconcileConfig::default();
        let only = vec!["announcements".to_string()];
        let picked = cfg.targets_for(Some(only.as_slice()));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].table, "announcements");
        assert_eq!(cfg.targets_for(None).len(), 4);
    }
}
