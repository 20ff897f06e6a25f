//! Tracing setup for repotopic binaries.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is the default filter. With
/// `json`, log lines come out as newline-delimited JSON for aggregation
/// pipelines. Calling this twice is harmless — only the first call installs
/// anything.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().try_init().ok();
    } else {
        builder.try_init().ok();
    }
}
