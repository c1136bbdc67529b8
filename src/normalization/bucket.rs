use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OpsError;

/// Logical asset category; each maps 1:1 onto a blob-store bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketId {
    Branding,
    Uniforms,
    UiElements,
    Announcements,
    Products,
}

impl BucketId {
    pub const ALL: [BucketId; 5] = [
        BucketId::Branding,
        BucketId::Uniforms,
        BucketId::UiElements,
        BucketId::Announcements,
        BucketId::Products,
    ];

    /// Bucket name as it exists in the blob store.
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketId::Branding => "branding",
            BucketId::Uniforms => "uniforms",
            BucketId::UiElements => "ui-elements",
            BucketId::Announcements => "announcements",
            BucketId::Products => "products",
        }
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketId {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        BucketId::ALL
            .into_iter()
            .find(|b| b.as_str() == key)
            .ok_or_else(|| OpsError::Validation(format!("unknown bucket {s:?}")))
    }
}

/// One keyword set → bucket rule. A rule fires when any keyword occurs as a
/// substring of the case-folded filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRule {
    pub bucket: BucketId,
    pub keywords: Vec<String>,
}

impl BucketRule {
    pub fn new(bucket: BucketId, keywords: &[&str]) -> Self {
        Self {
            bucket,
            keywords: keywords.iter().map(|k| k.to_ascii_lowercase()).collect(),
        }
    }

    fn matches(&self, folded: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && folded.contains(k.as_str()))
    }
}

/// Ordered rule table. Evaluation order is the vector order; first hit wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub rules: Vec<BucketRule>,
    #[serde(default = "default_bucket")]
    pub default_bucket: BucketId,
}

fn default_bucket() -> BucketId {
    BucketId::Products
}

impl Default for RuleTable {
    /// Canonical order: branding, uniforms, ui-elements, announcements, then
    /// the `products` fallback. A name carrying both "logo" and "jersey" is
    /// therefore branding.
    fn default() -> Self {
        Self {
            rules: vec![
                BucketRule::new(
                    BucketId::Branding,
                    &["logo", "brand", "bms", "favicon", "wordmark", "emblem", "crest"],
                ),
                BucketRule::new(
                    BucketId::Uniforms,
                    &[
                        "uniform", "jersey", "shirt", "polo", "blazer", "skirt", "trouser",
                        "sweater", "hoodie", "cardigan",
                    ],
                ),
                BucketRule::new(
                    BucketId::UiElements,
                    &[
                        "icon",
                        "button",
                        "background",
                        "placeholder",
                        "arrow",
                        "divider",
                        "ui-",
                        "bg-",
                    ],
                ),
                BucketRule::new(
                    BucketId::Announcements,
                    &[
                        "announcement",
                        "sale",
                        "promo",
                        "event",
                        "notice",
                        "news",
                        "holiday",
                        "banner",
                    ],
                ),
            ],
            default_bucket: BucketId::Products,
        }
    }
}

impl RuleTable {
    /// Bucket for `filename` under this table.
    pub fn classify(&self, filename: &str) -> BucketId {
        let folded = filename.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&folded))
            .map(|rule| rule.bucket)
            .unwrap_or(self.default_bucket)
    }
}

/// Classify with the canonical rule table.
pub fn classify(filename: &str) -> BucketId {
    RuleTable::default().classify(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_examples() {
        assert_eq!(classify("1_BMS_logo.svg"), BucketId::Branding);
        assert_eq!(classify("blue-jersey.png"), BucketId::Uniforms);
        assert_eq!(classify("random-item.png"), BucketId::Products);
        assert_eq!(classify("back-to-school-sale.png"), BucketId::Announcements);
        assert_eq!(classify("arrow-left.svg"), BucketId::UiElements);
    }

    #[test]
    fn first_listed_rule_wins() {
        // branding and uniforms both match; branding is listed first
        assert_eq!(classify("team-logo-jersey.png"), BucketId::Branding);
        // ui-elements is listed before announcements
        assert_eq!(classify("sale-icon.png"), BucketId::UiElements);
    }

    #[test]
    fn case_folded_before_matching() {
        assert_eq!(classify("SCHOOL_CREST.PNG"), BucketId::Branding);
    }

    #[test]
    fn custom_table_honors_order_and_default() {
        let table = RuleTable {
            rules: vec![
                BucketRule::new(BucketId::Announcements, &["logo"]),
                BucketRule::new(BucketId::Branding, &["logo"]),
            ],
            default_bucket: BucketId::UiElements,
        };
        assert_eq!(table.classify("logo.png"), BucketId::Announcements);
        assert_eq!(table.classify("other.png"), BucketId::UiElements);
    }

    #[test]
    fn bucket_names_round_trip() {
        for b in BucketId::ALL {
            assert_eq!(b.as_str().parse::<BucketId>().unwrap(), b);
        }
        assert_eq!("UI_ELEMENTS".parse::<BucketId>().unwrap(), BucketId::UiElements);
        assert!("videos".parse::<BucketId>().is_err());
    }
}
