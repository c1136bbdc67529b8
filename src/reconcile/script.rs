//! Reviewable SQL batch for script-generation mode.
//!
//! Nothing here touches a store. Each matched record becomes one annotated
//! `UPDATE` guarded by `IS DISTINCT FROM`, so executing the batch twice is
//! harmless.
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::matcher::{MatchOutcome, MatchResult};
use super::summary::TableSummary;
use crate::config::ReconcileTarget;
use crate::error::OpsResult;
use crate::store::sql::{qualified, quote_ident, quote_literal};

/// Append-only buffer of update statements.
#[derive(Debug, Clone)]
pub struct ScriptBatch {
    schema: String,
    buffer: String,
    statements: usize,
}

impl ScriptBatch {
    pub fn new(schema: &str, generated_at: DateTime<Utc>) -> Self {
        let mut buffer = String::new();
        writeln!(buffer, "-- Image reference reconciliation batch").ok();
        writeln!(buffer, "-- Generated at: {}", generated_at.to_rfc3339()).ok();
        writeln!(
            buffer,
            "-- REVIEW BEFORE RUNNING: every statement below was produced by name matching"
        )
        .ok();
        writeln!(
            buffer,
            "-- and may pair a record with the wrong asset. Nothing has been applied yet."
        )
        .ok();
        writeln!(buffer).ok();
        writeln!(buffer, "BEGIN;").ok();
        Self {
            schema: schema.to_string(),
            buffer,
            statements: 0,
        }
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    /// Append one statement for a matched result; other outcomes are ignored.
    pub fn push(&mut self, target: &ReconcileTarget, result: &MatchResult) -> OpsResult<bool> {
        if result.outcome != MatchOutcome::Matched {
            return Ok(false);
        }
        let (Some(value), Some(asset)) = (result.resolved.as_deref(), result.asset.as_ref()) else {
            return Ok(false);
        };

        let table = qualified(&self.schema, &target.table)?;
        let image_col = quote_ident(&target.image_column)?;
        let id_col = quote_ident(&target.id_column)?;
        let name = result
            .record
            .display_name
            .as_deref()
            .unwrap_or("")
            .replace(['\n', '\r'], " ");

        writeln!(
            self.buffer,
            "\n-- {}: id={} \"{}\" -> {}",
            target.table, result.record.id, name, asset.canonical_reference
        )
        .ok();
        if let Some(previous) = &result.record.image_reference {
            writeln!(self.buffer, "--   previous: {}", previous.replace(['\n', '\r'], " ")).ok();
        }
        writeln!(
            self.buffer,
            "UPDATE {table} SET {image_col} = {v} WHERE {id_col}::text = {id} AND {image_col} IS DISTINCT FROM {v};",
            v = quote_literal(value),
            id = quote_literal(&result.record.id),
        )
        .ok();
        self.statements += 1;
        Ok(true)
    }

    /// Append every matched result of one table and count it in `summary`.
    pub fn push_all(
        &mut self,
        target: &ReconcileTarget,
        results: &[MatchResult],
        summary: &mut TableSummary,
    ) -> OpsResult<()> {
        for result in results {
            summary.tally(result);
            if self.push(target, result)? {
                summary.scripted += 1;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> String {
        writeln!(self.buffer, "\n-- {} statement(s)", self.statements).ok();
        writeln!(self.buffer, "COMMIT;").ok();
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NameSource, ReferenceStyle};
    use crate::normalization::BucketId;
    use crate::reconcile::inventory::{Asset, Inventory};
    use crate::reconcile::matcher::{match_record, ContentRecord};
    use chrono::TimeZone;

    fn target() -> ReconcileTarget {
        ReconcileTarget {
            table: "announcements".into(),
            id_column: "id".into(),
            name: NameSource::Column("title".into()),
            image_column: "image_url".into(),
            buckets: vec![BucketId::Announcements],
        }
    }

    fn matched(title: &str, id: &str, current: Option<&str>) -> MatchResult {
        let inv = Inventory::from_assets(vec![Asset::new(
            BucketId::Announcements,
            "o-brien-s-day.png",
            "u".into(),
        )]);
        let rec = ContentRecord {
            table: "announcements".into(),
            id: id.into(),
            display_name: Some(title.into()),
            image_reference: current.map(str::to_string),
        };
        match_record(&rec, &[BucketId::Announcements], &inv, ReferenceStyle::Canonical)
    }

    #[test]
    fn emits_annotated_guarded_statement() {
        let at = Utc.with_ymd_and_hms(2024, 8, 1, 9, 30, 0).unwrap();
        let mut batch = ScriptBatch::new("public", at);
        let mut summary = TableSummary::new("announcements");
        batch
            .push_all(&target(), &[matched("O'Brien's Day", "7", Some("stale.png"))], &mut summary)
            .unwrap();
        let sql = batch.finish();

        assert!(sql.contains("-- Generated at: 2024-08-01T09:30:00+00:00"));
        assert!(sql.contains("REVIEW BEFORE RUNNING"));
        assert!(sql.contains("-- announcements: id=7 \"O'Brien's Day\" -> announcements/o-brien-s-day.png"));
        assert!(sql.contains("--   previous: stale.png"));
        assert!(sql.contains(
            "UPDATE \"public\".\"announcements\" SET \"image_url\" = 'announcements/o-brien-s-day.png' \
             WHERE \"id\"::text = '7' AND \"image_url\" IS DISTINCT FROM 'announcements/o-brien-s-day.png';"
        ));
        assert_eq!(summary.scripted, 1);
        assert!(sql.trim_end().ends_with("COMMIT;"));
    }

    #[test]
    fn skips_non_matched_results() {
        let at = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        let mut batch = ScriptBatch::new("public", at);
        let correct = matched("O'Brien's Day", "7", Some("announcements/o-brien-s-day.png"));
        let none = matched("Unrelated", "8", None);
        assert!(!batch.push(&target(), &correct).unwrap());
        assert!(!batch.push(&target(), &none).unwrap());
        assert_eq!(batch.statements(), 0);
    }

    #[test]
    fn escapes_quotes_in_ids() {
        let at = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        let mut batch = ScriptBatch::new("public", at);
        batch.push(&target(), &matched("O'Brien's Day", "a'b", None)).unwrap();
        assert!(batch.finish().contains("WHERE \"id\"::text = 'a''b'"));
    }
}
