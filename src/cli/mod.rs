//! Command implementations behind the `signage` binary. Each command takes a
//! plain config struct and returns `anyhow::Result`; an `Err` means a non-zero
//! exit status.
use anyhow::{Context, Result};

use crate::store::supabase_storage::SupabaseStorage;
use crate::util::db::Db;
use crate::util::env as env_util;

pub mod ensure_buckets;
pub mod inventory;
pub mod migrate;
pub mod reconcile;
pub mod upload;

/// Keys logged (redacted) by every command's preflight snapshot.
pub const SNAPSHOT_KEYS: &[&str] = &[
    "SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_DB_URL",
    "DATABASE_URL",
    "DB_URL",
    "DB_HOST",
    "DB_SCHEMA",
    "DB_MAX_CONNS",
    "RECONCILE_CONFIG",
    "STORAGE_TIMEOUT_SECS",
];

/// Storage credentials every blob-touching command needs.
pub const STORAGE_KEYS: &[&str] = &["SUPABASE_URL", "SUPABASE_SERVICE_ROLE_KEY"];

/// Connect to Postgres using `database_url` or the environment.
pub async fn connect_db(database_url: Option<String>, app_name: &str) -> Result<Db> {
    let url = match database_url {
        Some(url) => env_util::prefer_session_mode(&url),
        None => env_util::db_url_prefer_session()?,
    };
    let max_conns = env_util::env_parse("DB_MAX_CONNS", 4u32).max(1);
    tracing::info!(
        url = %env_util::redact_value("DATABASE_URL", &url),
        max_conns,
        "connecting to database"
    );
    Db::connect(&url, max_conns, app_name)
        .await
        .context("failed to connect to the database")
}

pub fn storage() -> Result<SupabaseStorage> {
    SupabaseStorage::from_env().context("storage client is not configured")
}
