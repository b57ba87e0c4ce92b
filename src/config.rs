//! Configuration for Docket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::time::Duration;

use crate::cache::CacheConfig;

/// docket-migrate - bring a Docket MongoDB database to the current schema
///
/// Runs the fixed migration plan once: field renames, empty-value cleanup and
/// index reconciliation, collection by collection.
#[derive(Parser, Debug, Clone)]
#[command(name = "docket-migrate")]
#[command(about = "Idempotent schema and index migrations for Docket")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "docket")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Report what each step would do without writing
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Reference data cache TTL in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "1800")]
    pub cache_ttl_secs: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.mongodb_uri.starts_with("mongodb://")
            && !self.mongodb_uri.starts_with("mongodb+srv://")
        {
            return Err(
                "MONGODB_URI must start with mongodb:// or mongodb+srv://".to_string(),
            );
        }

        if self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }

    /// Cache configuration with the TTL from the command line
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from_env().with_ttl(Duration::from_secs(self.cache_ttl_secs))
    }
}
