//! Forum Store Admin Binary
//!
//! Prepares a PostgreSQL database for the forum post store:
//! - Structured JSON logging for log aggregation
//! - Idempotent schema creation (tables, path trigger, indexes)
//! - Connectivity and pool health report
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_CONNECT_TIMEOUT_SECS`,
//!   `DB_IDLE_TIMEOUT_SECS`, `DB_MAX_LIFETIME_SECS`: pool tuning
//! - `POST_CHUNK_SIZE`, `POST_INSERT_ATTEMPTS`: bulk writer settings (reported only)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin forum_store_admin --features postgres
//! ```

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use forum_post_store::{PostgresConfig, PostgresForumStore, WriterConfig};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forum_store_admin=info,forum_post_store=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        "Starting Forum Store Admin"
    );

    let writer = WriterConfig::from_env();
    info!(
        chunk_size = writer.chunk_size,
        max_attempts = writer.max_attempts,
        "Bulk writer settings"
    );

    let store = match PostgresForumStore::new(PostgresConfig::from_env()).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
    };

    if let Err(e) = store.apply_schema().await {
        error!(error = %e, "Failed to apply schema");
        return Err(e.into());
    }

    let stats = store.pool_stats();
    let healthy = store.is_healthy().await;
    info!(
        healthy = healthy,
        pool_size = stats.size,
        pool_idle = stats.idle,
        pool_max = stats.max,
        "Database ready"
    );

    if !healthy {
        return Err("database health check failed".into());
    }
    Ok(())
}
