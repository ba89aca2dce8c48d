//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

/// Build the env filter from `RUST_LOG`, falling back to `fallback`
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize tracing subscriber with default configuration
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize tracing subscriber emitting JSON lines
///
/// The current span (carrying fields such as `run_id` and `kind`) is
/// attached to each event.
pub fn init_tracing_json() {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();
}

/// Initialize tracing for tests
///
/// Safe to call from every test: only the first call installs a subscriber,
/// later calls are no-ops. Output goes through the test writer so it is
/// captured per test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("still logging after double init");
    }

    #[test]
    fn test_env_filter_fallback() {
        let filter = env_filter("warn");
        assert!(!filter.to_string().is_empty());
    }
}
