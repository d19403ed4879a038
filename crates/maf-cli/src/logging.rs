//! Process-wide logging initialization.

use maf_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from the `log.*` section.
///
/// `fatal` and `panic` are accepted for config compatibility and map to
/// `error`; a second initialization (tests, embedded use) is a no-op.
pub fn init(config: &LogConfig) {
    let level = match config.level.as_str() {
        "fatal" | "panic" => "error",
        other => other,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.pretty {
        builder.pretty().try_init()
    } else {
        builder.compact().try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
