use crate::config::types::{ApiConfig, Config, HttpConfig, LimitsConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_limits(&config.limits)?;
    validate_api_config(&config.api)?;
    validate_http_config(&config.http)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.bundle.save_redirects && !config.bundle.follow_redirects {
        tracing::debug!("save-redirects without follow-redirects stores redirect pages only");
    }

    Ok(())
}

/// Validates per-resource-class concurrency limits
fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("parsoid", limits.parsoid),
        ("html", limits.html),
        ("modules", limits.modules),
        ("authors", limits.authors),
        ("images", limits.images),
        ("revisions", limits.revisions),
    ] {
        if !(1..=100).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "limits.{} must be between 1 and 100, got {}",
                name, value
            )));
        }
    }
    Ok(())
}

/// Validates endpoint overrides
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("restbase-api", config.restbase_api.as_deref()),
        ("parsoid-api", config.parsoid_api.as_deref()),
        ("php-api", config.php_api.as_deref()),
        ("sitematrix-api", Some(config.sitematrix_api.as_str())),
    ] {
        if let Some(value) = value {
            validate_http_url(name, value)?;
        }
    }
    Ok(())
}

/// Validates HTTP client settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "http.timeout-secs must be > 0".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "http.max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent name cannot be empty".to_string(),
        ));
    }

    if !config
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "user-agent name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.name
        )));
    }

    if let Some(contact) = &config.contact_url {
        validate_http_url("contact-url", contact)?;
    }

    Ok(())
}

/// Checks that a value parses as an http(s) URL
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}
