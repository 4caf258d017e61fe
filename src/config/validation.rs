use crate::config::types::{
    Config, ExtractConfig, FetchConfig, HarvestConfig, OutputConfig, PaginationScheme,
    SelectorConfig, SourceConfig,
};
use crate::ConfigError;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_extract_config(&config.extract)?;
    validate_output_config(&config.output)?;
    validate_harvest_config(&config.harvest)?;
    validate_sources(&config.sources, config.fetch.render_command.is_some())?;
    Ok(())
}

/// Validates network settings
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs and connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-base-ms ({}) cannot exceed backoff-max-ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-bytes must be greater than zero".to_string(),
        ));
    }

    if config.user_agents.iter().any(|agent| agent.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty strings".to_string(),
        ));
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::Validation(format!("Invalid header name '{}': {}", name, e)))?;
        HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("Invalid value for header '{}': {}", name, e))
        })?;
    }

    if let Some(command) = &config.render_command {
        if command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "render-command cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_extract_config(config: &ExtractConfig) -> Result<(), ConfigError> {
    if config.ocr_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "ocr-timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(command) = &config.ocr_command {
        if command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ocr-command cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "ledger-path cannot be empty".to_string(),
        ));
    }

    if config.save_every < 1 {
        return Err(ConfigError::Validation(
            "save-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates orchestration settings
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_sources < 1 || config.max_concurrent_sources > 32 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-sources must be between 1 and 32, got {}",
            config.max_concurrent_sources
        )));
    }

    if config.stale_page_limit < 1 {
        return Err(ConfigError::Validation(
            "stale-page-limit must be >= 1".to_string(),
        ));
    }

    if config.default_max_pages < 1 {
        return Err(ConfigError::Validation(
            "default-max-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates every source entry and their name uniqueness
fn validate_sources(sources: &[SourceConfig], render_configured: bool) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[source]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for source in sources {
        if !names.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source name '{}'",
                source.name
            )));
        }
        validate_source(source, render_configured)?;
    }

    Ok(())
}

fn validate_source(source: &SourceConfig, render_configured: bool) -> Result<(), ConfigError> {
    validate_source_name(&source.name)?;

    validate_http_url("base-url", &source.base_url)?;
    validate_http_url("listing-url", &source.listing_url)?;
    if let Some(warm_up) = &source.warm_up_url {
        validate_http_url("warm-up-url", warm_up)?;
    }

    validate_pagination(&source.name, &source.pagination, render_configured)?;
    validate_selectors(&source.selectors)?;

    if source.max_pages == Some(0) {
        return Err(ConfigError::Validation(format!(
            "Source '{}': max-pages must be >= 1",
            source.name
        )));
    }

    if source.date_formats.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Source '{}': date-formats cannot be empty",
            source.name
        )));
    }

    for pattern in &source.boilerplate {
        Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }

    for extension in &source.attachment_extensions {
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "Source '{}': attachment extension '{}' must be alphanumeric without a leading dot",
                source.name, extension
            )));
        }
    }

    Ok(())
}

/// Source names end up in file names, so keep them to a safe alphabet
fn validate_source_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "Source name cannot be empty".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Source name must contain only lowercase letters, digits, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Fragment pages only differ once a browser runs the page script, so they need a renderer
fn validate_pagination(
    source: &str,
    scheme: &PaginationScheme,
    render_configured: bool,
) -> Result<(), ConfigError> {
    match scheme {
        PaginationScheme::Query { param, step, .. } => {
            if param.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Source '{}': pagination param cannot be empty",
                    source
                )));
            }
            validate_step(source, *step)
        }
        PaginationScheme::Fragment { template, step, .. } => {
            if !template.contains("{offset}") {
                return Err(ConfigError::Validation(format!(
                    "Source '{}': fragment template must contain '{{offset}}'",
                    source
                )));
            }
            if !render_configured {
                return Err(ConfigError::Validation(format!(
                    "Source '{}': fragment pagination requires [fetch] render-command",
                    source
                )));
            }
            validate_step(source, *step)
        }
        PaginationScheme::NextLink { next_selector } => validate_selector(next_selector),
    }
}

fn validate_step(source: &str, step: u32) -> Result<(), ConfigError> {
    if step == 0 {
        return Err(ConfigError::Validation(format!(
            "Source '{}': pagination step must be >= 1",
            source
        )));
    }
    Ok(())
}

fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    validate_selector(&selectors.item)?;
    validate_selector(&selectors.item_title)?;

    for selector in [&selectors.link, &selectors.title, &selectors.date, &selectors.item_date]
        .into_iter()
        .flatten()
    {
        validate_selector(selector)?;
    }

    for selector in selectors.content.iter().chain(selectors.extra.values()) {
        validate_selector(selector)?;
    }

    Ok(())
}

/// Checks that a CSS selector parses
pub fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })
}
