use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use signage_ops::cli;
use signage_ops::normalization::BucketId;
use signage_ops::reconcile::Mode;
use signage_ops::telemetry;
use signage_ops::util::env;

#[derive(Parser, Debug)]
#[command(name = "signage", version, about = "Digital signage admin operations")]
struct Cli {
    /// JSON reconcile/bucket config (defaults to RECONCILE_CONFIG, then built-ins)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Ensure the settings table has every required column and exactly one row
    MigrateSettings {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Settings table name (default: settings)
        #[arg(long)]
        table: Option<String>,
        /// Also print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Repair image references on content rows from the stored assets
    Reconcile {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// direct writes to the database; script emits a reviewable SQL batch
        #[arg(long, value_enum, default_value_t = Mode::Direct)]
        mode: Mode,
        /// Script output path (default: reconcile-<timestamp>.sql)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Optional comma-separated filter of tables
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Also print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List stored assets per bucket
    Inventory {
        /// Print every asset, not only counts
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },
    /// Create any configured bucket that does not exist yet
    EnsureBuckets,
    /// Classify, rename and upload every file in a directory
    Upload {
        /// Directory to upload (not recursive)
        #[arg(long)]
        dir: PathBuf,
        /// Upload everything into this bucket instead of classifying
        #[arg(long)]
        bucket: Option<BucketId>,
        /// Fail instead of replacing existing objects
        #[arg(long, default_value_t = false)]
        no_overwrite: bool,
        /// Fail instead of creating missing buckets
        #[arg(long, default_value_t = false)]
        no_create: bool,
        /// Print the plan without touching storage
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    telemetry::init_tracing(telemetry::DEFAULT_FILTER)?;

    let args = Cli::parse();
    let config_path = args.config;

    match args.command {
        Commands::MigrateSettings { db_url, table, json } => {
            use cli::migrate::{run, MigrateSettingsConfig};
            run(MigrateSettingsConfig {
                database_url: db_url,
                table,
                json,
            })
            .await?;
        }
        Commands::Reconcile {
            db_url,
            mode,
            out,
            tables,
            json,
        } => {
            use cli::reconcile::{run, ReconcileCmdConfig};
            run(ReconcileCmdConfig {
                database_url: db_url,
                config_path,
                mode,
                out,
                tables,
                json,
            })
            .await?;
        }
        Commands::Inventory { verbose } => {
            use cli::inventory::{run, InventoryConfig};
            run(InventoryConfig {
                config_path,
                verbose,
            })
            .await?;
        }
        Commands::EnsureBuckets => {
            use cli::ensure_buckets::{run, EnsureBucketsConfig};
            run(EnsureBucketsConfig { config_path }).await?;
        }
        Commands::Upload {
            dir,
            bucket,
            no_overwrite,
            no_create,
            dry_run,
        } => {
            use cli::upload::{run, UploadConfig};
            run(UploadConfig {
                config_path,
                dir,
                bucket,
                overwrite: !no_overwrite,
                create_buckets: !no_create,
                dry_run,
            })
            .await?;
        }
    }
    Ok(())
}
