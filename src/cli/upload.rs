//! Bulk asset upload: classify, rename, ensure the bucket, upload.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::error::{OpsError, OpsResult};
use crate::normalization::{normalize_filename, split_extension, BucketId, RuleTable};
use crate::store::BlobStore;
use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub config_path: Option<PathBuf>,
    pub dir: PathBuf,
    /// Send every file here instead of classifying.
    pub bucket: Option<BucketId>,
    pub overwrite: bool,
    pub create_buckets: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpload {
    pub source: PathBuf,
    pub bucket: BucketId,
    pub stored_name: String,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum FileOutcome {
    Uploaded,
    Planned,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl UploadSummary {
    fn count(&self, f: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| f(o)).count()
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Uploaded | FileOutcome::Planned))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    pub fn render(&self, dry_run: bool) -> String {
        let mut lines = vec![if dry_run {
            "UPLOAD (dry run)".to_string()
        } else {
            "UPLOAD".to_string()
        }];
        for (path, outcome) in &self.files {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let line = match outcome {
                FileOutcome::Uploaded => format!("  ok      {name}"),
                FileOutcome::Planned => format!("  plan    {name}"),
                FileOutcome::Skipped(why) => format!("  skip    {name}: {why}"),
                FileOutcome::Failed(why) => format!("  FAILED  {name}: {why}"),
            };
            lines.push(line);
        }
        lines.push(format!(
            "Totals: {}={} skipped={} failed={}",
            if dry_run { "planned" } else { "uploaded" },
            self.uploaded(),
            self.skipped(),
            self.failed()
        ));
        lines.join("\n")
    }
}

/// Content type from the extension; unknown types upload as octet-stream.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = split_extension(filename)
        .1
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Decide bucket and stored name for one file.
pub fn plan_file(path: &Path, bucket: Option<BucketId>, rules: &RuleTable) -> OpsResult<PlannedUpload> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| OpsError::Validation(format!("unusable file name {}", path.display())))?;
    let stored_name = normalize_filename(filename).ok_or_else(|| {
        OpsError::Validation(format!("{filename} normalizes to an empty name"))
    })?;
    Ok(PlannedUpload {
        source: path.to_path_buf(),
        bucket: bucket.unwrap_or_else(|| rules.classify(filename)),
        content_type: guess_content_type(&stored_name),
        stored_name,
    })
}

/// Regular files directly inside `dir`, sorted by name. Hidden files are
/// ignored.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// Upload every file in `files`. With `dry_run` only the plan is produced.
pub async fn upload_files(
    blobs: &dyn BlobStore,
    files: &[PathBuf],
    cfg: &UploadConfig,
    rules: &RuleTable,
) -> UploadSummary {
    let mut summary = UploadSummary::default();
    // buckets already confirmed (or created) this run
    let mut ready: BTreeSet<BucketId> = BTreeSet::new();

    for path in files {
        let plan = match plan_file(path, cfg.bucket, rules) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "file skipped");
                summary.files.push((path.clone(), FileOutcome::Skipped(e.to_string())));
                continue;
            }
        };
        if cfg.dry_run {
            info!(
                file = %path.display(),
                bucket = %plan.bucket,
                name = %plan.stored_name,
                "would upload"
            );
            summary.files.push((path.clone(), FileOutcome::Planned));
            continue;
        }
        let outcome = match upload_one(blobs, &plan, cfg, &mut ready).await {
            Ok(()) => {
                info!(bucket = %plan.bucket, name = %plan.stored_name, "uploaded");
                FileOutcome::Uploaded
            }
            Err(e) => {
                warn!(
                    file = %path.display(),
                    bucket = %plan.bucket,
                    name = %plan.stored_name,
                    error = %e,
                    "upload failed"
                );
                FileOutcome::Failed(e.to_string())
            }
        };
        summary.files.push((path.clone(), outcome));
    }
    summary
}

async fn upload_one(
    blobs: &dyn BlobStore,
    plan: &PlannedUpload,
    cfg: &UploadConfig,
    ready: &mut BTreeSet<BucketId>,
) -> OpsResult<()> {
    let bucket = plan.bucket.as_str();
    if !ready.contains(&plan.bucket) {
        if !blobs.bucket_exists(bucket).await? {
            if !cfg.create_buckets {
                return Err(OpsError::not_found("bucket", bucket));
            }
            blobs.create_bucket(bucket, true).await?;
            info!(bucket, "bucket created");
        }
        ready.insert(plan.bucket);
    }
    let bytes = tokio::fs::read(&plan.source)
        .await
        .map_err(|e| OpsError::transport(format!("read {}", plan.source.display()), e))?;
    blobs
        .upload_object(bucket, &plan.stored_name, bytes, plan.content_type, cfg.overwrite)
        .await
}

pub async fn run(cfg: UploadConfig) -> Result<()> {
    env_util::init_env();
    let required: &[&str] = if cfg.dry_run { &[] } else { super::STORAGE_KEYS };
    env_util::preflight_check("upload", required, super::SNAPSHOT_KEYS)?;
    let config = ReconcileConfig::load(cfg.config_path.as_deref())?;
    let files = list_files(&cfg.dir)?;
    info!(dir = %cfg.dir.display(), files = files.len(), dry_run = cfg.dry_run, "upload: starting");

    let summary = if cfg.dry_run {
        // dry runs never reach the blob service
        let offline = crate::store::memory::MemoryBlobStore::default();
        upload_files(&offline, &files, &cfg, &config.rules).await
    } else {
        let blobs = super::storage()?;
        upload_files(&blobs, &files, &cfg, &config.rules).await
    };
    println!("{}", summary.render(cfg.dry_run));

    if summary.failed() > 0 || summary.skipped() > 0 {
        bail!(
            "upload finished with {} failed and {} skipped file(s)",
            summary.failed(),
            summary.skipped()
        );
    }
    Ok(())
}
