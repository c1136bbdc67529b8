//! Idempotent schema migrations.
pub mod settings;

pub use settings::{migrate_settings, MigrationReport, SettingsSchema};
