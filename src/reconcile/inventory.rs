use serde::Serialize;
use tracing::{info, warn};

use crate::error::{OpsError, OpsResult};
use crate::normalization::{normalize, stem, BucketId};
use crate::store::BlobStore;

/// One stored object, with its join key and derived locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub bucket: BucketId,
    pub stored_name: String,
    /// `bucket/stored_name`; the cross-system join key.
    pub canonical_reference: String,
    pub public_locator: String,
    /// Normalized stored name without extension, compared against record keys.
    #[serde(skip)]
    pub match_key: String,
}

impl Asset {
    pub fn new(bucket: BucketId, stored_name: &str, public_locator: String) -> Self {
        Self {
            bucket,
            stored_name: stored_name.to_string(),
            canonical_reference: format!("{}/{}", bucket.as_str(), stored_name),
            public_locator,
            match_key: normalize(stem(stored_name)),
        }
    }
}

/// Listing outcome for one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketListing {
    pub bucket: BucketId,
    pub assets: Vec<Asset>,
    /// Non-file entries (folders, placeholders) dropped from the listing.
    pub skipped_entries: usize,
    /// The listing filled a whole page; objects past it were not seen.
    pub truncated: bool,
    pub error: Option<String>,
}

/// Snapshot of every inventoried bucket, in configured bucket order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub listings: Vec<BucketListing>,
}

impl Inventory {
    /// Assets of `bucket` in listing order; empty when the bucket was not
    /// inventoried or failed to list.
    pub fn assets(&self, bucket: BucketId) -> &[Asset] {
        self.listings
            .iter()
            .find(|l| l.bucket == bucket)
            .map(|l| l.assets.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_assets(&self) -> usize {
        self.listings.iter().map(|l| l.assets.len()).sum()
    }

    pub fn failed_buckets(&self) -> impl Iterator<Item = &BucketListing> {
        self.listings.iter().filter(|l| l.error.is_some())
    }

    /// In-memory snapshot from already-known assets (tests, offline review).
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let mut listings: Vec<BucketListing> = Vec::new();
        for asset in assets {
            match listings.iter_mut().find(|l| l.bucket == asset.bucket) {
                Some(l) => l.assets.push(asset),
                None => listings.push(BucketListing {
                    bucket: asset.bucket,
                    assets: vec![asset],
                    skipped_entries: 0,
                    truncated: false,
                    error: None,
                }),
            }
        }
        Self { listings }
    }
}

/// Enumerate every bucket in `buckets` and materialize its assets.
///
/// A bucket that fails to list contributes an empty, errored listing and the
/// build carries on. When every bucket fails with a transport error the blob
/// service itself is unreachable and the build fails as a whole.
pub async fn build_inventory(
    blobs: &dyn BlobStore,
    buckets: &[BucketId],
    page_limit: usize,
) -> OpsResult<Inventory> {
    let mut listings = Vec::with_capacity(buckets.len());
    let mut transport_failures = 0usize;

    for &bucket in buckets {
        let objects = match blobs.list_objects(bucket.as_str(), page_limit).await {
            Ok(objects) => objects,
            Err(e) => {
                if e.is_transport() {
                    transport_failures += 1;
                }
                warn!(bucket = %bucket, error = %e, "bucket listing failed; continuing with empty listing");
                listings.push(BucketListing {
                    bucket,
                    assets: Vec::new(),
                    skipped_entries: 0,
                    truncated: false,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let truncated = objects.len() >= page_limit;
        if truncated {
            warn!(
                bucket = %bucket,
                page_limit,
                "bucket listing filled a whole page; objects beyond it are not inventoried"
            );
        }

        let mut assets = Vec::with_capacity(objects.len());
        let mut skipped_entries = 0usize;
        let mut unresolved: Vec<String> = Vec::new();
        for obj in objects {
            if !obj.is_file() {
                skipped_entries += 1;
                continue;
            }
            match blobs.resolve_public_locator(bucket.as_str(), &obj.name).await {
                Ok(locator) => assets.push(Asset::new(bucket, &obj.name, locator)),
                Err(e) => {
                    warn!(bucket = %bucket, object = %obj.name, error = %e, "object skipped: no public locator");
                    unresolved.push(format!("{}: {e}", obj.name));
                }
            }
        }
        info!(
            bucket = %bucket,
            assets = assets.len(),
            skipped_entries,
            unresolved = unresolved.len(),
            "bucket inventoried"
        );
        // the bucket stays usable; its unresolved objects are reported as a failure
        let error = (!unresolved.is_empty()).then(|| {
            format!(
                "{} object(s) without a public locator: {}",
                unresolved.len(),
                unresolved.join("; ")
            )
        });
        listings.push(BucketListing {
            bucket,
            assets,
            skipped_entries: skipped_entries + unresolved.len(),
            truncated,
            error,
        });
    }

    if !buckets.is_empty() && transport_failures == buckets.len() {
        return Err(OpsError::transport(
            "build inventory",
            "blob service unreachable: every bucket listing failed",
        ));
    }
    Ok(Inventory { listings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBlobStore;

    #[test]
    fn asset_keys_strip_extension_and_normalize() {
        let a = Asset::new(BucketId::Products, "Exam_Essentials.PNG", "u".into());
        assert_eq!(a.canonical_reference, "products/Exam_Essentials.PNG");
        assert_eq!(a.match_key, "exam-essentials");
    }

    #[tokio::test]
    async fn failing_bucket_is_reported_not_fatal() {
        let blobs = MemoryBlobStore::default()
            .with_bucket("products", &["exam-essentials.png"])
            .with_bucket("branding", &["logo.svg"]);
        blobs.fail_bucket("branding");

        let inv = build_inventory(&blobs, &[BucketId::Branding, BucketId::Products], 1000)
            .await
            .unwrap();
        assert_eq!(inv.total_assets(), 1);
        assert!(inv.assets(BucketId::Branding).is_empty());
        assert_eq!(inv.failed_buckets().count(), 1);
        assert_eq!(
            inv.assets(BucketId::Products)[0].public_locator,
            "https://storage.test/storage/v1/object/public/products/exam-essentials.png"
        );
    }

    #[tokio::test]
    async fn every_bucket_failing_is_fatal() {
        let blobs = MemoryBlobStore::default().with_bucket("products", &["a.png"]);
        blobs.fail_bucket("products");
        let err = build_inventory(&blobs, &[BucketId::Products], 1000)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn missing_bucket_is_not_a_transport_failure() {
        let blobs = MemoryBlobStore::default();
        let inv = build_inventory(&blobs, &[BucketId::Uniforms], 1000).await.unwrap();
        assert!(inv.listings[0].error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn unresolvable_object_is_recorded_and_build_continues() {
        let blobs = MemoryBlobStore::default()
            .with_bucket("branding", &["logo.svg", "broken.svg", "crest.png"])
            .with_bucket("products", &["pen.png"]);
        blobs.fail_locator("branding", "broken.svg");

        let inv = build_inventory(&blobs, &[BucketId::Branding, BucketId::Products], 1000)
            .await
            .unwrap();
        let branding = &inv.listings[0];
        let names: Vec<&str> = branding.assets.iter().map(|a| a.stored_name.as_str()).collect();
        assert_eq!(names, vec!["logo.svg", "crest.png"]);
        assert_eq!(branding.skipped_entries, 1);
        assert!(branding.error.as_deref().unwrap().contains("broken.svg"));
        assert_eq!(inv.assets(BucketId::Products).len(), 1);
        assert_eq!(inv.failed_buckets().count(), 1);
    }

    #[tokio::test]
    async fn full_page_is_flagged_truncated() {
        let blobs = MemoryBlobStore::default().with_bucket("products", &["a.png", "b.png", "c.png"]);
        let inv = build_inventory(&blobs, &[BucketId::Products], 2).await.unwrap();
        assert!(inv.listings[0].truncated);
        assert_eq!(inv.assets(BucketId::Products).len(), 2);

        let inv = build_inventory(&blobs, &[BucketId::Products], 10).await.unwrap();
        assert!(!inv.listings[0].truncated);
    }
}
