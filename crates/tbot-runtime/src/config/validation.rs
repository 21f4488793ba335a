//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, TbotConfig, WebhookConfig};

/// Validates the entire configuration.
///
/// The token is not required here; it may also be supplied programmatically
/// to the server builder.
pub fn validate_config(config: &TbotConfig) -> ConfigResult<()> {
    if let Some(token) = &config.token
        && token.trim().is_empty()
    {
        return Err(ConfigError::validation("Token must not be blank"));
    }

    if let Some(webhook) = &config.webhook {
        validate_webhook(webhook)?;
    }

    validate_logging(&config.logging)?;
    Ok(())
}

/// Validates webhook settings.
fn validate_webhook(webhook: &WebhookConfig) -> ConfigResult<()> {
    validate_url(&webhook.url)?;

    if webhook.listen_addr.trim().is_empty() {
        return Err(ConfigError::missing_field("webhook.listen_addr"));
    }

    Ok(())
}

/// Validates a webhook URL.
fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("webhook.url"));
    }

    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module name: '{module}'"
        )));
    }

    Ok(())
}
