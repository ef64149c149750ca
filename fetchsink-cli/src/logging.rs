//! Log output for the binary.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Install a stderr formatter for `log` records, filtered by `RUST_LOG`.
///
/// Library crates log through the `log` facade; the subscriber's `log`
/// bridge forwards those records. Calling this twice leaves the first
/// subscriber in place.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("fetchsink: logging already initialised: {err}");
    }
}
