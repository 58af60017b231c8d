//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honour `RUST_LOG`, falling back to the gateway's default level
//!
//! # Design Decisions
//! - Uses the tracing crate for structured fields (`connection`, `endpoint`,
//!   `status`, `error`)
//! - Connection tasks run inside a `connection` span, so loop-thread events
//!   carry the connection id without repeating it

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "mail_table_gateway=info";

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_logging();
        init_logging();
        tracing::info!("still logging");
    }
}
