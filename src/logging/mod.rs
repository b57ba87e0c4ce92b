//! Logging infrastructure for Docket
//!
//! Tracing subscriber setup and the fire-and-forget audit trail.

pub mod audit;

pub use audit::{AuditLogger, AuditSink, MemoryAuditSink, MongoAuditSink};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `docket={level},info`. With `json`
/// the output is one JSON object per line for log shippers.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docket={},info", level).into());

    let registry = tracing_subscriber::registry().with(filter);

    // Ignore the error if a subscriber is already installed (tests, embedding)
    let _ = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
