//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogConfig, LogFormat};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "kaptaze_client=info,kaptaze=info";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to info level for the client crates. Returns
/// `false` if a subscriber was already installed, which leaves the existing
/// one in place.
pub fn init_tracing(config: &LogConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LogConfig {
            format: LogFormat::Json,
        };
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
