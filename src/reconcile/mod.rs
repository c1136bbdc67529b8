//! Asset reconciliation: inventory → match → apply.
//!
//! A pass is strictly sequential. Buckets are listed in configured order,
//! tables are processed in configured order, and records in the order the
//! store returns them. Concurrent passes over the same tables are not
//! supported.
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

pub mod applier;
pub mod inventory;
pub mod matcher;
pub mod script;
pub mod summary;

pub use applier::apply_direct;
pub use inventory::{build_inventory, Asset, BucketListing, Inventory};
pub use matcher::{find_asset, match_record, ContentRecord, MatchOutcome, MatchResult};
pub use script::ScriptBatch;
pub use summary::{RunReport, TableSummary};

use crate::config::{ReconcileConfig, ReconcileTarget};
use crate::error::{OpsError, OpsResult};
use crate::store::{BlobStore, RelationalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Write corrected references to the store.
    Direct,
    /// Emit a reviewable SQL batch; the store is only read.
    Script,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Direct => "direct",
            Mode::Script => "script",
        }
    }
}

/// Collaborators for one run, built once by the caller and passed down.
pub struct RunContext<'a> {
    pub store: &'a dyn RelationalStore,
    pub blobs: &'a dyn BlobStore,
    pub config: &'a ReconcileConfig,
    /// Schema used when rendering SQL in script mode.
    pub schema: &'a str,
}

/// Read and match every record of `target`. Unreadable rows are counted as
/// invalid in `summary` and skipped.
pub async fn match_table(
    ctx: &RunContext<'_>,
    target: &ReconcileTarget,
    inventory: &Inventory,
    summary: &mut TableSummary,
) -> OpsResult<Vec<MatchResult>> {
    if !ctx.store.table_exists(&target.table).await? {
        return Err(OpsError::not_found("table", target.table.as_str()));
    }
    let rows = ctx
        .store
        .select(&target.table, &target.select_columns(), None)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        match ContentRecord::from_row(target, row) {
            Ok(record) => results.push(match_record(
                &record,
                &target.buckets,
                inventory,
                ctx.config.reference_style,
            )),
            Err(e) => {
                summary.invalid += 1;
                warn!(table = %target.table, error = %e, "skipping unreadable row");
            }
        }
    }
    Ok(results)
}

/// One full reconciliation pass over `tables` (all configured targets when
/// `None`).
///
/// Per-table and per-record failures land in the report. Only an unreachable
/// blob service aborts the pass.
pub async fn run_pass(
    ctx: &RunContext<'_>,
    mode: Mode,
    tables: Option<&[String]>,
) -> OpsResult<RunReport> {
    let generated_at = Utc::now();
    let inventory = build_inventory(ctx.blobs, &ctx.config.buckets, ctx.config.list_limit).await?;
    info!(
        assets = inventory.total_assets(),
        failed_buckets = inventory.failed_buckets().count(),
        "inventory built"
    );

    let mut batch = match mode {
        Mode::Script => Some(ScriptBatch::new(ctx.schema, generated_at)),
        Mode::Direct => None,
    };
    let mut summaries = Vec::new();

    for target in ctx.config.targets_for(tables) {
        let mut summary = TableSummary::new(&target.table);
        let results = match match_table(ctx, target, &inventory, &mut summary).await {
            Ok(results) => results,
            Err(e) => {
                warn!(table = %target.table, error = %e, "table skipped");
                summary.load_error = Some(e.to_string());
                summaries.push(summary);
                continue;
            }
        };

        match batch.as_mut() {
            Some(batch) => {
                if let Err(e) = batch.push_all(target, &results, &mut summary) {
                    warn!(table = %target.table, error = %e, "table skipped in script");
                    summary.load_error = Some(e.to_string());
                }
            }
            None => apply_direct(ctx.store, target, &results, &mut summary).await,
        }
        summaries.push(summary);
    }

    Ok(RunReport {
        mode,
        generated_at,
        buckets: summary::bucket_reports(&inventory),
        tables: summaries,
        script: batch.map(ScriptBatch::finish),
    })
}
