//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem
//! - Configure log level from config with an environment override
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` always wins; the configured level is the fallback
//! - Second initialization is a no-op so tests can call this freely

use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the tracing subscriber.
///
/// `default_level` comes from `observability.log_level` and applies to
/// this crate's own events; dependencies stay quieter.
pub fn init_logging(default_level: &str) {
    let directives = format!("waypoint={},tower_http=warn", default_level);
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| directives.into()))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
