//! Tracing initialisation

use crate::config::LoggingConfig;
use crate::core::error::{ConfigError, PlatformResult};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter: `RUST_LOG` when set, else the configured level
pub fn env_filter(config: &LoggingConfig) -> PlatformResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| {
        ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            value: config.level.clone(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Install the global subscriber
///
/// Calling it again once a subscriber is installed is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> PlatformResult<()> {
    let filter = env_filter(config)?;
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "platform=loud".to_string(),
        };
        assert!(env_filter(&config).is_err());
    }
}
