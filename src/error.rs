// src/error.rs

//! Unified error handling for the watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The selector matched nothing on the fetched page
    #[error("No content matched '{selector}' at {url}")]
    Extraction { url: String, selector: String },

    /// The target could not be reached
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A Last-Modified value could not be parsed
    #[error("Invalid HTTP date: {0}")]
    InvalidDate(String),

    /// A store read or write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A single archive attempt failed
    #[error("Archive attempt failed for {url}{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Archive {
        url: String,
        status: Option<u16>,
        message: String,
    },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an extraction error.
    pub fn extraction(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::Extraction {
            url: url.into(),
            selector: selector.into(),
        }
    }

    /// Create a fetch error with context.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Create an archive attempt error.
    pub fn archive(url: impl Into<String>, status: Option<u16>, message: impl fmt::Display) -> Self {
        Self::Archive {
            url: url.into(),
            status,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_display() {
        let with_status = AppError::archive("https://example.com", Some(503), "unavailable");
        assert_eq!(
            with_status.to_string(),
            "Archive attempt failed for https://example.com (status 503): unavailable"
        );

        let without = AppError::archive("https://example.com", None, "timeout");
        assert_eq!(
            without.to_string(),
            "Archive attempt failed for https://example.com: timeout"
        );
    }
}
