//! Environment helpers: dotenv loading once, typed getters, DSN resolution and
//! a redacted configuration snapshot for the start of every command.
use std::str::FromStr;
use std::sync::Once;

use tracing::{info, warn};

static INIT: Once = Once::new();

/// Load `.env` from the working directory, falling back to the crate root.
/// Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            let candidate = concat!(env!("CARGO_MANIFEST_DIR"), "/.env");
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    env_opt(key).ok_or_else(|| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env_opt(key) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or(default),
        None => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(raw) => parse_flag(&raw),
        None => default,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Discrete `DB_*` connection settings.
#[derive(Debug, Clone, Default)]
pub struct DbParts {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: Option<String>,
    pub ssl_mode: Option<String>,
}

impl DbParts {
    fn from_env() -> Option<Self> {
        Some(Self {
            host: env_opt("DB_HOST")?,
            user: env_opt("DB_USERNAME")?,
            password: env_opt("DB_PASSWORD"),
            database: env_opt("DB_DATABASE"),
            port: env_opt("DB_PORT"),
            ssl_mode: env_opt("DB_SSLMODE"),
        })
    }

    /// Compose a DSN. Credentials are percent-encoded by `url::Url`, so
    /// passwords with reserved characters survive.
    pub fn to_dsn(&self) -> Option<String> {
        let database = self.database.as_deref().unwrap_or("postgres");
        let port: u16 = self
            .port
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(5432);
        let ssl_mode = self.ssl_mode.as_deref().unwrap_or("prefer");

        let mut out = url::Url::parse("postgresql://localhost").ok()?;
        out.set_username(&self.user).ok()?;
        if let Some(pass) = &self.password {
            out.set_password(Some(pass)).ok()?;
        }
        let host = self.host.trim().trim_matches(|c| c == '[' || c == ']');
        if host.contains(':') {
            out.set_host(Some(&format!("[{host}]"))).ok()?;
        } else {
            out.set_host(Some(host)).ok()?;
        }
        out.set_port(Some(port)).ok()?;
        out.set_path(&format!("/{database}"));
        if ssl_mode != "disable" {
            out.query_pairs_mut().append_pair("sslmode", ssl_mode);
        }
        Some(out.to_string())
    }
}

/// Database URL: the first of `SUPABASE_DB_URL`, `DATABASE_URL`, `DB_URL`,
/// else composed from the `DB_*` parts.
pub fn db_url() -> anyhow::Result<String> {
    for k in ["SUPABASE_DB_URL", "DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            info!(target = "env", source = k, "database url resolved");
            return Ok(v.trim().to_string());
        }
    }
    if let Some(dsn) = DbParts::from_env().and_then(|p| p.to_dsn()) {
        info!(target = "env", source = "DB_*", "database url composed");
        return Ok(dsn);
    }
    Err(anyhow::anyhow!(
        "no database URL configured (set SUPABASE_DB_URL, DATABASE_URL, DB_URL or DB_HOST/DB_USERNAME)"
    ))
}

/// Same as `db_url()` but swaps the Supabase transaction pooler (:6543) for
/// the session pooler (:5432) unless `DISABLE_SESSION_SWAP` is set.
pub fn db_url_prefer_session() -> anyhow::Result<String> {
    let raw = db_url()?;
    if env_flag("DISABLE_SESSION_SWAP", false) {
        Ok(raw)
    } else {
        Ok(prefer_session_mode(&raw))
    }
}

/// DDL and multi-statement work misbehaves behind the transaction pooler.
pub fn prefer_session_mode(url: &str) -> String {
    if url.contains("pooler.supabase.com:6543") {
        warn!("detected Supabase transaction pooler (:6543); switching to :5432 (session)");
        url.replace("pooler.supabase.com:6543", "pooler.supabase.com:5432")
    } else {
        url.to_string()
    }
}

/// Mask a value for logging. Secret-looking keys are blanked and Postgres DSNs
/// lose their credentials whatever the key is called.
pub fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
    {
        return "***".to_string();
    }

    let val_trim = val.trim();
    if let Ok(mut u) = url::Url::parse(val_trim) {
        let scheme = u.scheme().to_ascii_lowercase();
        if scheme == "postgres" || scheme == "postgresql" {
            let _ = u.set_username("***");
            let _ = u.set_password(Some("***"));
            return u.to_string();
        }
    }
    if val_trim.starts_with("postgres://") || val_trim.starts_with("postgresql://") {
        // unparseable DSN; keep only the scheme
        return "postgres://***".to_string();
    }
    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of
/// configuration. Returns an error naming every missing key.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {}", missing.join(", ")));
    }
    Ok(())
}
