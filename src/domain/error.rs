//! Error types for the explorer core.

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Scale error: {0}")]
    Scale(#[from] ScaleError),
}

impl AppError {
    /// Stable short name of the error category, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ExternalService(_) => "external_service",
            Self::Cache(_) => "cache",
            Self::Codec(_) => "codec",
            Self::Scale(_) => "scale",
        }
    }
}

/// Invalid or inconsistent coin / provider configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Currency unit alias '{alias}' is claimed by both '{first}' and '{second}'")]
    AmbiguousUnitAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("Unknown currency unit: {0}")]
    UnknownUnit(String),
}

/// Failures talking to exchange-rate, geolocation or other HTTP providers
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    Configuration(String),
}

/// Distributed cache failures
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cached value could not be decoded: {0}")]
    Decode(String),
}

/// Lossless number conversion failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Not an integer: {0}")]
    NotAnInteger(String),

    #[error("Value out of decimal range: {0}")]
    OutOfRange(String),
}

/// Exponent scale selection failures
#[derive(Debug, Error, PartialEq)]
pub enum ScaleError {
    #[error("Unable to find exponent scale index for {0}")]
    Unrepresentable(f64),

    #[error("Exponent scale index {0} out of bounds")]
    IndexOutOfBounds(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_source_message() {
        let err = AppError::from(ExternalServiceError::ApiError {
            status_code: 503,
            message: "busy".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "External service error: API error (status 503): busy"
        );
        assert_eq!(err.kind(), "external_service");
    }

    #[test]
    fn test_config_error_alias_message() {
        let err = ConfigError::AmbiguousUnitAlias {
            alias: "nex".to_string(),
            first: "NEX".to_string(),
            second: "NEXA".to_string(),
        };
        assert!(err.to_string().contains("'nex'"));
    }
}
