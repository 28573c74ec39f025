use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr so command output on stdout stays clean.
///
/// Uses `RUST_LOG` if set, otherwise `level`. `log` records from the core
/// crate reach the subscriber through its `tracing-log` bridge.
pub fn init_logging(level: &str) -> Result<(), String> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}
