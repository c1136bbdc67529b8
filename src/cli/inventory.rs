use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::config::ReconcileConfig;
use crate::reconcile::{build_inventory, Inventory};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct InventoryConfig {
    pub config_path: Option<PathBuf>,
    /// List every asset, not just per-bucket counts.
    pub verbose: bool,
}

pub fn render(inventory: &Inventory, verbose: bool) -> String {
    let mut out = String::from("INVENTORY\n");
    for l in &inventory.listings {
        let status = match (&l.error, l.truncated) {
            (Some(e), _) => format!("FAILED: {e}"),
            (None, true) => "truncated".to_string(),
            (None, false) => "ok".to_string(),
        };
        writeln!(
            out,
            "  {:<14} objects={:<5} skipped={:<3} {status}",
            l.bucket.as_str(),
            l.assets.len(),
            l.skipped_entries
        )
        .ok();
        if verbose {
            for a in &l.assets {
                writeln!(out, "    {}  {}", a.canonical_reference, a.public_locator).ok();
            }
        }
    }
    writeln!(out, "Total assets: {}", inventory.total_assets()).ok();
    out
}

pub async fn run(cfg: InventoryConfig) -> Result<()> {
    env_util::init_env();
    env_util::preflight_check("inventory", super::STORAGE_KEYS, super::SNAPSHOT_KEYS)?;
    let config = ReconcileConfig::load(cfg.config_path.as_deref())?;
    let blobs = super::storage()?;

    let inventory = build_inventory(&blobs, &config.buckets, config.list_limit)
        .await
        .context("blob storage unreachable")?;
    print!("{}", render(&inventory, cfg.verbose));

    let failed = inventory.failed_buckets().count();
    if failed > 0 {
        bail!("{failed} bucket(s) could not be listed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::BucketId;
    use crate::store::memory::MemoryBlobStore;

    #[tokio::test]
    async fn renders_counts_failures_and_truncation() {
        let blobs = MemoryBlobStore::default()
            .with_bucket("branding", &["logo.svg", "wordmark.png"])
            .with_bucket("products", &["pen.png"]);
        blobs.fail_bucket("uniforms");
        let inv = build_inventory(
            &blobs,
            &[BucketId::Branding, BucketId::Uniforms, BucketId::Products],
            2,
        )
        .await
        .unwrap();

        let text = render(&inv, false);
        assert!(text.contains("branding       objects=2"));
        assert!(text.contains("truncated"));
        assert!(text.contains("uniforms       objects=0     skipped=0   FAILED"));
        assert!(text.contains("Total assets: 3"));
        assert!(!text.contains("branding/logo.svg"));

        let verbose = render(&inv, true);
        assert!(verbose.contains(
            "branding/logo.svg  https://storage.test/storage/v1/object/public/branding/logo.svg"
        ));
    }
}
