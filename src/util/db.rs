use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Postgres handle for one run. Implements `store::RelationalStore`.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
    /// Schema that unqualified table names resolve against.
    pub schema: String,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32, app_name: &str) -> Result<Self> {
        let use_prepared = crate::util::env::env_flag("USE_PREPARED", false);
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("invalid database URL")?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let app_name = app_name.to_string();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                let stmt = format!(
                    "SET application_name = {}",
                    crate::store::sql::quote_literal(&app_name)
                );
                Box::pin(async move {
                    // Best-effort; restricted roles may refuse SET.
                    let _ = sqlx::query(&stmt).execute(&mut *conn).await;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .context("database unreachable")?;

        // connect_with is lazy about the first round-trip on some poolers; force one.
        sqlx::query("SELECT 1")
            .persistent(false)
            .execute(&pool)
            .await
            .context("database did not answer SELECT 1")?;
        info!(max_connections, "connected to db");

        let schema = crate::util::env::env_opt("DB_SCHEMA").unwrap_or_else(|| "public".to_string());
        Ok(Self { pool, schema })
    }
}
