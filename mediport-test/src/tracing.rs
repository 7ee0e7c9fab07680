//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// The filter used when `RUST_LOG` is not set.
///
/// Client crates log everything, the fake backend only its own decisions, and dependencies
/// only warnings.
const DEFAULT_FILTER: &str = "warn,mediport_client=trace,mediport_types=trace,mediport_cli=trace,\
                              mediport_test=debug";

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner, so they only show up for failing
/// tests or with `--nocapture`. Setting `RUST_LOG` replaces the default filter, for example
/// `RUST_LOG=mediport_client=info,reqwest=debug`.
///
/// Only the first call in a test binary installs the subscriber.
///
/// # Example
///
/// ```
/// mediport_test::tracing::init();
/// ```
pub fn init() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter())
        .with_target(true)
        .with_test_writer()
        .without_time()
        .compact()
        .try_init()
        .ok();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
