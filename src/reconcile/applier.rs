use serde_json::Value;
use tracing::{debug, info, warn};

use super::matcher::{MatchOutcome, MatchResult};
use super::summary::{RecordFailure, TableSummary};
use crate::config::ReconcileTarget;
use crate::error::OpsError;
use crate::store::{KeyFilter, RelationalStore, Row};

/// Write every `matched` result straight to the store, one single-row update
/// per record keyed by id.
///
/// A rejected write (or one that touches no row) is logged, counted and
/// recorded in `summary`; the remaining records are still processed.
/// Non-matched results only feed the counts, so re-applying a result set
/// computed after a successful pass issues no writes.
pub async fn apply_direct(
    store: &dyn RelationalStore,
    target: &ReconcileTarget,
    results: &[MatchResult],
    summary: &mut TableSummary,
) {
    for result in results {
        summary.tally(result);
        if result.outcome != MatchOutcome::Matched {
            continue;
        }
        let Some(value) = result.resolved.as_deref() else {
            continue;
        };
        let id = &result.record.id;

        let mut patch = Row::new();
        patch.insert(target.image_column.clone(), Value::String(value.to_string()));
        let key = KeyFilter::new(&target.id_column, id);

        let outcome = match store.update(&target.table, &patch, &key).await {
            Ok(0) => Err(OpsError::not_found("row", format!("{}.{}={id}", target.table, target.id_column))),
            Ok(n) => {
                if n > 1 {
                    warn!(table = %target.table, id = %id, rows = n, "id matched more than one row");
                }
                Ok(())
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                summary.succeeded += 1;
                debug!(table = %target.table, id = %id, value, "image reference updated");
            }
            Err(e) => {
                summary.failed += 1;
                warn!(
                    table = %target.table,
                    id = %id,
                    column = %target.image_column,
                    value,
                    error = %e,
                    "image reference update failed"
                );
                summary.failures.push(RecordFailure {
                    id: id.clone(),
                    value: value.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        table = %target.table,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        already_correct = summary.already_correct,
        no_candidate = summary.no_candidate,
        "direct apply finished"
    );
}
