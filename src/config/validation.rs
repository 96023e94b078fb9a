use crate::config::types::{
    BatchConfig, Config, DocumentsConfig, HttpConfig, PublishConfig, SearchConfig, StateConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_search_config(&config.search)?;
    validate_documents_config(&config.documents)?;
    validate_http_config(&config.http)?;
    validate_batch_config(&config.batch)?;
    validate_state_config(&config.state)?;
    validate_publish_config(&config.publish)?;
    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    validate_http_url("search.endpoint", &config.endpoint)?;

    if config.page_size < 1 || config.page_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 1000, got {}",
            config.page_size
        )));
    }

    if config.connection.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search connection cannot be empty".to_string(),
        ));
    }

    if config.query.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search query cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_documents_config(config: &DocumentsConfig) -> Result<(), ConfigError> {
    validate_http_url("documents.base-url", &config.base_url)?;

    if config.language.len() != 2 || !config.language.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(format!(
            "language must be a two-letter code, got '{}'",
            config.language
        )));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.max_entries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_entries must be >= 1, got {}",
            config.max_entries
        )));
    }

    if config.retry_deferred && config.max_deferred_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_deferred_attempts must be >= 1 when retry_deferred is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_publish_config(config: &PublishConfig) -> Result<(), ConfigError> {
    validate_http_url("publish.hub-url", &config.hub_url)?;
    validate_repo_id(&config.repo_id)?;

    if config.revision.trim().is_empty() {
        return Err(ConfigError::Validation(
            "revision cannot be empty".to_string(),
        ));
    }

    if config.data_path.is_empty() || config.data_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "data_path must be a relative repository path, got '{}'",
            config.data_path
        )));
    }

    if config.local_path.is_empty() {
        return Err(ConfigError::Validation(
            "local_path cannot be empty".to_string(),
        ));
    }

    if config.lfs_threshold_bytes == 0 {
        return Err(ConfigError::Validation(
            "lfs_threshold_bytes must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a URL parses and uses HTTP(S)
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Validates a dataset repository id of the form `owner/name`
fn validate_repo_id(repo_id: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = repo_id.split('/').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "repo_id must look like 'owner/name', got '{}'",
            repo_id
        )));
    }

    for part in parts {
        if part.is_empty()
            || !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ConfigError::Validation(format!(
                "repo_id contains an invalid segment: '{}'",
                repo_id
            )));
        }
    }

    Ok(())
}
