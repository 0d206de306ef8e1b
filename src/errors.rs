//! Error types for the proxy harvester
//!
//! Each subsystem gets its own error enum so failures stay actionable at
//! the component boundary; `AppError` aggregates them for the CLI surface.
//! Worker loops contain transient failures internally (see the individual
//! component modules) and only contract violations propagate.

use thiserror::Error;

/// Errors raised while harvesting listing pages
#[derive(Error, Debug)]
pub enum SourceError {
    /// Page number no longer fits the configured pad width
    #[error("page number {page} does not fit in pad width {width}")]
    PadLengthExceeded { page: u64, width: usize },

    /// URL template is missing the page-number placeholder
    #[error("URL template has no {placeholder} placeholder: {template}")]
    MissingPlaceholder {
        placeholder: &'static str,
        template: String,
    },

    /// Invalid listing-page URL after substitution
    #[error("invalid listing URL: {url}")]
    InvalidUrl { url: String },

    /// Invalid CSS selector in a source definition
    #[error("invalid CSS selector: {selector}")]
    InvalidSelector { selector: String },

    /// HTTP request for a listing page failed
    #[error("listing page request failed")]
    Http(#[from] reqwest::Error),

    /// Page body failed the source's validity predicate
    #[error("source {source_name} returned a page failing its validity check")]
    InvalidPage { source_name: String },
}

/// Errors raised while probing a proxy candidate
///
/// These never escape the checker; they are recorded as the failure reason
/// on the candidate before being swallowed.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Proxy configuration could not be turned into an HTTP client
    #[error("failed to build probe client")]
    ClientBuild(#[source] reqwest::Error),

    /// Probe did not complete within the configured timeout
    #[error("probe timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Probe request failed at the transport or protocol level
    #[error("probe request failed")]
    Http(#[source] reqwest::Error),

    /// Probe reached the reference URL but got a non-success status
    #[error("probe returned HTTP {status}")]
    BadStatus { status: u16 },
}

/// Errors raised by the content generator loop
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// A starting-hook subscriber cancelled the fetch before it began
    #[error("fetch cancelled by subscriber")]
    Cancelled,

    /// Transport-level failure attributable to the proxy in use
    #[error("proxy transport failure: {message}")]
    ProxyTransport { message: String },

    /// Target responded with a non-success status
    #[error("target returned HTTP {status}")]
    BadStatus { status: u16 },

    /// Request failed without a proxy being involved
    #[error("fetch request failed")]
    Http(#[from] reqwest::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("configuration file not found: {path}")]
    NotFound { path: std::path::PathBuf },

    /// Invalid configuration format
    #[error("invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// I/O error reading or writing configuration
    #[error("configuration I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any subsystem error
#[derive(Error, Debug)]
pub enum AppError {
    /// Harvesting error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Validation error
    #[error(transparent)]
    Check(#[from] CheckError),

    /// Content generator error
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    ///
    /// Recoverable errors are retried or demote a candidate; everything
    /// else is a contract or format failure and fails fast.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Source(SourceError::Http(_))
            | AppError::Check(CheckError::Timeout { .. })
            | AppError::Check(CheckError::Http(_))
            | AppError::Check(CheckError::BadStatus { .. })
            | AppError::Generator(GeneratorError::ProxyTransport { .. })
            | AppError::Generator(GeneratorError::Http(_)) => true,

            AppError::Source(SourceError::PadLengthExceeded { .. })
            | AppError::Source(SourceError::MissingPlaceholder { .. })
            | AppError::Source(SourceError::InvalidPage { .. })
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Source(_) => "source",
            AppError::Check(_) => "check",
            AppError::Generator(_) => "generator",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Harvesting result type alias
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Validation result type alias
pub type CheckResult<T> = std::result::Result<T, CheckError>;

/// Generator result type alias
pub type GeneratorResult<T> = std::result::Result<T, GeneratorError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AppError::Source(SourceError::InvalidPage {
            source_name: "demo".to_string(),
        });
        assert_eq!(err.category(), "source");
        assert!(!err.is_recoverable());

        let err = AppError::Check(CheckError::Timeout { seconds: 10 });
        assert_eq!(err.category(), "check");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_pad_error_is_fatal() {
        let err = AppError::Source(SourceError::PadLengthExceeded {
            page: 1234,
            width: 3,
        });
        assert!(!err.is_recoverable());
    }
}
