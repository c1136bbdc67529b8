//! Pure naming helpers shared by the inventory builder, the matcher and the
//! upload tool.
pub mod bucket;
pub mod slug;

pub use bucket::{classify, BucketId, BucketRule, RuleTable};
pub use slug::{normalize, normalize_filename, split_extension, stem};
