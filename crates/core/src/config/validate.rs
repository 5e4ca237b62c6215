use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Storage quota is positive
/// - Sampling interval, velocity window, metadata timeout and subscriber
///   capacity are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.storage.quota_mb == 0 {
        return Err(ConfigError::ValidationError(
            "storage.quota_mb must be greater than 0".to_string(),
        ));
    }

    if config.events.subscriber_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "events.subscriber_capacity must be greater than 0".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.sample_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.sample_interval_ms must be greater than 0".to_string(),
        ));
    }
    if orchestrator.velocity_window == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.velocity_window must be greater than 0".to_string(),
        ));
    }
    if orchestrator.metadata_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.metadata_timeout_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
