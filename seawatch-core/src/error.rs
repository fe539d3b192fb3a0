//! Error types for telemetry parsing and configuration

use thiserror::Error;

/// Errors that can occur when decoding a telemetry message or one of its fields.
///
/// None of these are fatal: the ingestion layer logs them and skips the
/// offending message or field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Message bytes are not a JSON document
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Message is valid JSON but not an object
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// Field value is neither a number nor a numeric string
    #[error("Field '{key}' has non-numeric value '{value}'")]
    InvalidNumber { key: String, value: String },

    /// Field value is outside the range allowed for it
    #[error("Field '{key}' value {value} is out of range")]
    OutOfRange { key: String, value: f64 },

    /// A required field is missing from a target report
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// Target report names a different vessel than its roster entry
    #[error("Report id '{reported}' does not match roster id '{roster}'")]
    IdMismatch { roster: String, reported: String },

    /// Target report entry is not a KEY=VALUE pair
    #[error("Malformed report entry '{0}'")]
    MalformedEntry(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::InvalidJson(e.to_string())
    }
}

/// Errors reported by [`WatchConfig::validate`](crate::config::WatchConfig::validate).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A duration or size that must be positive is zero
    #[error("'{0}' must be greater than zero")]
    Zero(&'static str),

    /// Maximum reconnect delay is smaller than the base delay
    #[error("maxReconnectDelayMs ({max}) is smaller than baseReconnectDelayMs ({base})")]
    BackoffOrder { base: u64, max: u64 },

    /// A threshold is negative or not a number
    #[error("'{name}' must be a non-negative number, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    /// Host name is empty
    #[error("Telemetry host must not be empty")]
    EmptyHost,
}
