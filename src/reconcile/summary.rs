use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::inventory::Inventory;
use super::matcher::{MatchOutcome, MatchResult};
use super::Mode;
use crate::normalization::BucketId;

/// A write that did not land, with enough context to retry by hand.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub id: String,
    pub value: String,
    pub error: String,
}

/// Per-table counts for one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub records: usize,
    /// Rows that could not be turned into records (no usable id).
    pub invalid: usize,
    pub no_candidate: usize,
    pub already_correct: usize,
    /// Matched records; each one is a write (direct) or a statement (script).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub scripted: usize,
    /// The table could not be read at all.
    pub load_error: Option<String>,
    pub failures: Vec<RecordFailure>,
}

impl TableSummary {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    /// Count a match outcome. Writes are counted by the applier.
    pub fn tally(&mut self, result: &MatchResult) {
        self.records += 1;
        match result.outcome {
            MatchOutcome::Matched => self.attempted += 1,
            MatchOutcome::AlreadyCorrect => self.already_correct += 1,
            MatchOutcome::NoCandidate => self.no_candidate += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.no_candidate + self.invalid
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.load_error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    pub bucket: BucketId,
    pub assets: usize,
    pub skipped_entries: usize,
    pub truncated: bool,
    pub error: Option<String>,
}

pub fn bucket_reports(inventory: &Inventory) -> Vec<BucketReport> {
    inventory
        .listings
        .iter()
        .map(|l| BucketReport {
            bucket: l.bucket,
            assets: l.assets.len(),
            skipped_entries: l.skipped_entries,
            truncated: l.truncated,
            error: l.error.clone(),
        })
        .collect()
}

/// Everything a pass produced, printed at the end of every run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub generated_at: DateTime<Utc>,
    pub buckets: Vec<BucketReport>,
    pub tables: Vec<TableSummary>,
    /// SQL review batch (script mode only).
    #[serde(skip)]
    pub script: Option<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(TableSummary::has_failures)
            || self.buckets.iter().any(|b| b.error.is_some())
    }

    /// Tables that were read, whatever happened to their records.
    pub fn loaded_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.load_error.is_none()).count()
    }

    pub fn total(&self, f: impl Fn(&TableSummary) -> usize) -> usize {
        self.tables.iter().map(f).sum()
    }

    /// Human-readable summary table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "RECONCILE ({}) at {}",
            self.mode.as_str(),
            self.generated_at.to_rfc3339()
        )
        .ok();
        writeln!(out, "\nBuckets:").ok();
        for b in &self.buckets {
            let note = match (&b.error, b.truncated) {
                (Some(e), _) => format!("  FAILED: {e}"),
                (None, true) => "  (truncated: listing filled a whole page)".to_string(),
                (None, false) => String::new(),
            };
            writeln!(out, "  {:<14} assets={:<5}{note}", b.bucket.as_str(), b.assets).ok();
        }
        writeln!(
            out,
            "\n  {:<16} {:>7} {:>9} {:>9} {:>9} {:>7} {:>8} {:>7}",
            "table", "records", "attempted", "succeeded", "failed", "correct", "skipped", "scripted"
        )
        .ok();
        for t in &self.tables {
            if let Some(e) = &t.load_error {
                writeln!(out, "  {:<16} FAILED TO LOAD: {e}", t.table).ok();
                continue;
            }
            writeln!(
                out,
                "  {:<16} {:>7} {:>9} {:>9} {:>9} {:>7} {:>8} {:>7}",
                t.table,
                t.records,
                t.attempted,
                t.succeeded,
                t.failed,
                t.already_correct,
                t.skipped(),
                t.scripted
            )
            .ok();
            for f in &t.failures {
                writeln!(out, "    ! id={} value={} error={}", f.id, f.value, f.error).ok();
            }
        }
        writeln!(
            out,
            "\nTotals: attempted={} succeeded={} failed={} already-correct={} skipped={}",
            self.total(|t| t.attempted),
            self.total(|t| t.succeeded),
            self.total(|t| t.failed),
            self.total(|t| t.already_correct),
            self.total(TableSummary::skipped),
        )
        .ok();
        out
    }
}
