//! Record → asset matching over an inventory snapshot.
//!
//! Policy: normalize the record's display name into a key, then walk the
//! candidate buckets in order and take the first asset (in listing order)
//! whose normalized stem contains the key. The first bucket with any hit ends
//! the search. This is not a best-overall-match search, and a short name that
//! is a substring of another asset's name can match it. Ambiguity is settled
//! by that ordering and is never reported as an error.
use serde::Serialize;
use serde_json::Value;

use super::inventory::{Asset, Inventory};
use crate::config::{NameSource, ReconcileTarget, ReferenceStyle};
use crate::error::{OpsError, OpsResult};
use crate::normalization::{normalize, BucketId};
use crate::store::sql::key_text;
use crate::store::Row;

/// A content row as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    pub table: String,
    pub id: String,
    pub display_name: Option<String>,
    pub image_reference: Option<String>,
}

impl ContentRecord {
    /// Build from a selected row. A row without a usable id cannot be keyed
    /// for an update and is rejected.
    pub fn from_row(target: &ReconcileTarget, row: &Row) -> OpsResult<Self> {
        let id = row
            .get(&target.id_column)
            .and_then(key_text)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                OpsError::Validation(format!(
                    "{} row without a usable {} value",
                    target.table, target.id_column
                ))
            })?;
        let display_name = match &target.name {
            NameSource::Fixed(key) => Some(key.clone()),
            NameSource::Column(col) => row.get(col).and_then(Value::as_str).map(str::to_string),
        };
        let image_reference = row
            .get(&target.image_column)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            table: target.table.clone(),
            id,
            display_name,
            image_reference,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchOutcome {
    Matched,
    AlreadyCorrect,
    NoCandidate,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub record: ContentRecord,
    pub asset: Option<Asset>,
    pub outcome: MatchOutcome,
    /// Reference the record should carry, in the configured style.
    pub resolved: Option<String>,
}

impl MatchResult {
    fn no_candidate(record: &ContentRecord) -> Self {
        Self {
            record: record.clone(),
            asset: None,
            outcome: MatchOutcome::NoCandidate,
            resolved: None,
        }
    }
}

/// Reference for `asset` in the requested style.
pub fn reference_for(asset: &Asset, style: ReferenceStyle) -> &str {
    match style {
        ReferenceStyle::Canonical => &asset.canonical_reference,
        ReferenceStyle::PublicUrl => &asset.public_locator,
    }
}

/// First asset matching `key`, searching `buckets` in order.
pub fn find_asset<'a>(key: &str, buckets: &[BucketId], inventory: &'a Inventory) -> Option<&'a Asset> {
    if key.is_empty() {
        return None;
    }
    buckets.iter().find_map(|&bucket| {
        inventory
            .assets(bucket)
            .iter()
            .find(|asset| asset.match_key.contains(key))
    })
}

pub fn match_record(
    record: &ContentRecord,
    candidate_buckets: &[BucketId],
    inventory: &Inventory,
    style: ReferenceStyle,
) -> MatchResult {
    let key = record
        .display_name
        .as_deref()
        .map(normalize)
        .unwrap_or_default();
    let Some(asset) = find_asset(&key, candidate_buckets, inventory) else {
        return MatchResult::no_candidate(record);
    };

    let resolved = reference_for(asset, style).to_string();
    let outcome = if record.image_reference.as_deref() == Some(resolved.as_str()) {
        MatchOutcome::AlreadyCorrect
    } else {
        MatchOutcome::Matched
    };
    MatchResult {
        record: record.clone(),
        asset: Some(asset.clone()),
        outcome,
        resolved: Some(resolved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset(bucket: BucketId, name: &str) -> Asset {
        Asset::new(bucket, name, format!("https://cdn.test/{}/{name}", bucket.as_str()))
    }

    fn record(name: &str, image: Option<&str>) -> ContentRecord {
        ContentRecord {
            table: "products".into(),
            id: "1".into(),
            display_name: Some(name.to_string()),
            image_reference: image.map(str::to_string),
        }
    }

    #[test]
    fn matches_then_reports_already_correct() {
        let inv = Inventory::from_assets(vec![asset(BucketId::Products, "exam-essentials.png")]);
        let first = match_record(
            &record("Exam Essentials", None),
            &[BucketId::Products],
            &inv,
            ReferenceStyle::Canonical,
        );
        assert_eq!(first.outcome, MatchOutcome::Matched);
        assert_eq!(first.resolved.as_deref(), Some("products/exam-essentials.png"));

        let again = match_record(
            &record("Exam Essentials", first.resolved.as_deref()),
            &[BucketId::Products],
            &inv,
            ReferenceStyle::Canonical,
        );
        assert_eq!(again.outcome, MatchOutcome::AlreadyCorrect);
    }

    #[test]
    fn empty_or_symbol_names_never_match() {
        let inv = Inventory::from_assets(vec![asset(BucketId::Products, "anything.png")]);
        for name in ["", "!!!", "   "] {
            let r = match_record(&record(name, None), &[BucketId::Products], &inv, ReferenceStyle::Canonical);
            assert_eq!(r.outcome, MatchOutcome::NoCandidate, "name {name:?}");
            assert!(r.asset.is_none());
        }
        let mut nameless = record("x", None);
        nameless.display_name = None;
        let r = match_record(&nameless, &[BucketId::Products], &inv, ReferenceStyle::Canonical);
        assert_eq!(r.outcome, MatchOutcome::NoCandidate);
    }

    #[test]
    fn first_bucket_with_a_hit_wins() {
        let inv = Inventory::from_assets(vec![
            asset(BucketId::UiElements, "math-set.png"),
            asset(BucketId::Products, "math-set-deluxe.png"),
        ]);
        let r = match_record(
            &record("Math Set", None),
            &[BucketId::Products, BucketId::UiElements],
            &inv,
            ReferenceStyle::Canonical,
        );
        // exact name lives in ui-elements, but products is searched first
        assert_eq!(r.resolved.as_deref(), Some("products/math-set-deluxe.png"));
    }

    #[test]
    fn first_listed_asset_wins_within_a_bucket() {
        let inv = Inventory::from_assets(vec![
            asset(BucketId::Products, "pen-refill.png"),
            asset(BucketId::Products, "pen.png"),
        ]);
        let r = match_record(&record("Pen", None), &[BucketId::Products], &inv, ReferenceStyle::Canonical);
        // substring policy: "pen" is contained in "pen-refill", listed first
        assert_eq!(r.asset.unwrap().stored_name, "pen-refill.png");
    }

    #[test]
    fn buckets_outside_candidates_are_ignored() {
        let inv = Inventory::from_assets(vec![asset(BucketId::Branding, "exam-essentials.png")]);
        let r = match_record(
            &record("Exam Essentials", None),
            &[BucketId::Products],
            &inv,
            ReferenceStyle::Canonical,
        );
        assert_eq!(r.outcome, MatchOutcome::NoCandidate);
    }

    #[test]
    fn public_url_style_compares_against_locator() {
        let inv = Inventory::from_assets(vec![asset(BucketId::Products, "exam-essentials.png")]);
        let current = "https://cdn.test/products/exam-essentials.png";
        let r = match_record(
            &record("Exam Essentials", Some(current)),
            &[BucketId::Products],
            &inv,
            ReferenceStyle::PublicUrl,
        );
        assert_eq!(r.outcome, MatchOutcome::AlreadyCorrect);
        // the same stored value is stale when canonical references are wanted
        let r = match_record(
            &record("Exam Essentials", Some(current)),
            &[BucketId::Products],
            &inv,
            ReferenceStyle::Canonical,
        );
        assert_eq!(r.outcome, MatchOutcome::Matched);
    }

    #[test]
    fn record_from_row_uses_target_columns() {
        let target = ReconcileTarget {
            table: "announcements".into(),
            id_column: "id".into(),
            name: NameSource::Column("title".into()),
            image_column: "image_url".into(),
            buckets: vec![BucketId::Announcements],
        };
        let row = json!({"id": 42, "title": "Back To School Sale", "image_url": null});
        let rec = ContentRecord::from_row(&target, row.as_object().unwrap()).unwrap();
        assert_eq!(rec.id, "42");
        assert_eq!(rec.display_name.as_deref(), Some("Back To School Sale"));
        assert_eq!(rec.image_reference, None);

        let bad = json!({"id": null, "title": "x"});
        assert!(ContentRecord::from_row(&target, bad.as_object().unwrap()).is_err());
    }
}
