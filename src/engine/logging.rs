//! Tracing subscriber setup for the binaries.
//!
//! `RUST_LOG` overrides the default filter. Output goes to stderr so JSON
//! printed by the CLI stays parseable. Repeated calls are no-ops.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_INIT: OnceLock<()> = OnceLock::new();

pub fn init_logging(default_filter: &str) {
    LOG_INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug");
        init_logging("warn");
        tracing::info!("logging initialised twice without panicking");
    }
}
