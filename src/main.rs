//! docket-migrate binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use docket::cache::EphemeralCache;
use docket::db::{Database, MongoClient};
use docket::migration::{MigrationPlan, MigrationRunner};
use docket::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    docket::logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!(
        "  docket-migrate {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );
    info!("  built {}", option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"));
    info!("======================================");
    info!("Database: {}", args.mongodb_db);
    info!("Mode: {}", if args.dry_run { "DRY RUN" } else { "APPLY" });

    let client = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Nothing in this process reads reference data, but the hook keeps the
    // invalidation path identical to the one the service uses
    let cache = Arc::new(EphemeralCache::new(args.cache_config()));

    let report = MigrationRunner::new(MigrationPlan::standard())
        .dry_run(args.dry_run)
        .with_cache(cache)
        .run(&client)
        .await;

    // Released on both paths before the exit code is decided
    client.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Err(e) = report.into_result() {
        error!("Migration failed: {}", e);
        std::process::exit(1);
    }

    info!("Migration complete");
    Ok(())
}
