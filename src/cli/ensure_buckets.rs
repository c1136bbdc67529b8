use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::normalization::BucketId;
use crate::store::BlobStore;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct EnsureBucketsConfig {
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum Provision {
    Present,
    Created,
    Failed(String),
}

/// Create every missing bucket in `buckets` as public. Failures are recorded
/// per bucket and do not stop the rest.
pub async fn ensure_buckets(blobs: &dyn BlobStore, buckets: &[BucketId]) -> Vec<(BucketId, Provision)> {
    let mut out = Vec::with_capacity(buckets.len());
    for &bucket in buckets {
        let status = match blobs.bucket_exists(bucket.as_str()).await {
            Ok(true) => Provision::Present,
            Ok(false) => match blobs.create_bucket(bucket.as_str(), true).await {
                Ok(()) => {
                    info!(bucket = %bucket, "bucket created");
                    Provision::Created
                }
                Err(e) => {
                    warn!(bucket = %bucket, error = %e, "bucket creation failed");
                    Provision::Failed(e.to_string())
                }
            },
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "bucket lookup failed");
                Provision::Failed(e.to_string())
            }
        };
        out.push((bucket, status));
    }
    out
}

pub async fn run(cfg: EnsureBucketsConfig) -> Result<()> {
    env_util::init_env();
    env_util::preflight_check("ensure-buckets", super::STORAGE_KEYS, super::SNAPSHOT_KEYS)?;
    let config = ReconcileConfig::load(cfg.config_path.as_deref())?;
    let blobs = super::storage()?;

    let results = ensure_buckets(&blobs, &config.buckets).await;
    println!("BUCKETS");
    for (bucket, status) in &results {
        match status {
            Provision::Present => println!("  {:<14} present", bucket.as_str()),
            Provision::Created => println!("  {:<14} created", bucket.as_str()),
            Provision::Failed(e) => println!("  {:<14} FAILED: {e}", bucket.as_str()),
        }
    }
    let failed = results
        .iter()
        .filter(|(_, s)| matches!(s, Provision::Failed(_)))
        .count();
    if failed > 0 {
        bail!("{failed} bucket(s) could not be provisioned");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBlobStore;

    #[tokio::test]
    async fn creates_missing_buckets_public_and_keeps_going() {
        let blobs = MemoryBlobStore::default().with_bucket("branding", &[]);
        blobs.fail_bucket("uniforms");

        let results = ensure_buckets(
            &blobs,
            &[BucketId::Branding, BucketId::Uniforms, BucketId::Products],
        )
        .await;
        assert_eq!(results[0], (BucketId::Branding, Provision::Present));
        assert!(matches!(results[1].1, Provision::Failed(_)));
        assert_eq!(results[2], (BucketId::Products, Provision::Created));
        assert_eq!(blobs.is_public("products"), Some(true));

        let again = ensure_buckets(&blobs, &[BucketId::Products]).await;
        assert_eq!(again[0].1, Provision::Present);
    }
}
