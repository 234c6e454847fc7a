use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::CoreConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; JSON output follows
/// `log_json`. Safe to call more than once — later calls are no-ops.
pub fn init_telemetry(config: &CoreConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let result = if config.log_json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };

    if result.is_ok() {
        info!(
            environment = %config.environment,
            log_level = %config.log_level,
            json = config.log_json,
            "Telemetry initialized"
        );
    }
}
