//! Unified error handling for the rednote crate
//!
//! Domain errors stay in their modules; [`Error`] wraps them so the binary
//! and library callers can handle everything through one type.
//!
//! # Architecture
//!
//! - [`RednoteErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust
//! use rednote::error::{Error, ErrorCategory, RednoteErrorTrait};
//! use rednote::utils::error::FetchError;
//!
//! let err = Error::from(FetchError::IpBlocked { code: 300012 });
//! assert_eq!(err.category(), ErrorCategory::Blocked);
//! assert!(!err.is_recoverable());
//! ```

use std::io;
use thiserror::Error;

pub use crate::browser::BrowserError;
pub use crate::sign::SignError;
pub use crate::storage::StoreError;
pub use crate::utils::error::{CrawlerError, FetchError};

/// Common trait for all rednote error types
pub trait RednoteErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (transport, timeout, platform API)
    Network,
    /// The platform refused this client (IP block, captcha)
    Blocked,
    /// Session and login errors
    Auth,
    /// Request signing errors
    Signing,
    /// Browser automation errors
    Browser,
    /// Decoding and URL errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Blocked => "blocked by platform",
            Self::Auth => "authentication error",
            Self::Signing => "signing error",
            Self::Browser => "browser error",
            Self::Parsing => "parsing error",
            Self::Storage => "storage error",
            Self::Config => "configuration error",
            Self::Other => "other error",
        }
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

impl RednoteErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::Api { .. } | Self::Decode(_)
        )
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Api { .. } => ErrorCategory::Network,
            Self::IpBlocked { .. } | Self::CaptchaRequired { .. } => ErrorCategory::Blocked,
            Self::LoginRequired(_) => ErrorCategory::Auth,
            Self::Sign(_) => ErrorCategory::Signing,
            Self::Decode(_) | Self::InvalidUrl(_) => ErrorCategory::Parsing,
            Self::Cancelled => ErrorCategory::Other,
        }
    }
}

impl RednoteErrorTrait for CrawlerError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Browser(e) => e.is_recoverable(),
            Self::InvalidUrl(_) => true,
            Self::LoginFailed(_) | Self::UnsupportedMode(_) | Self::Cancelled => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Browser(e) => e.category(),
            Self::LoginFailed(_) => ErrorCategory::Auth,
            Self::UnsupportedMode(_) => ErrorCategory::Config,
            Self::InvalidUrl(_) => ErrorCategory::Parsing,
            Self::Cancelled => ErrorCategory::Other,
        }
    }
}

impl RednoteErrorTrait for SignError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Oracle(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Signing
    }
}

impl RednoteErrorTrait for BrowserError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Evaluate(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotCompiled => ErrorCategory::Config,
            _ => ErrorCategory::Browser,
        }
    }
}

impl RednoteErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Timeout { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Json(_) => ErrorCategory::Parsing,
            _ => ErrorCategory::Storage,
        }
    }
}

// ============================================================================
// Unified Error
// ============================================================================

/// Unified error type for the rednote crate
#[derive(Error, Debug)]
pub enum Error {
    /// Crawl-level errors
    #[error("Crawler error: {0}")]
    Crawler(#[from] CrawlerError),

    /// Signed request errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Signing errors
    #[error("Sign error: {0}")]
    Sign(#[from] SignError),

    /// Browser errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RednoteErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Crawler(e) => e.is_recoverable(),
            Self::Fetch(e) => e.is_recoverable(),
            Self::Sign(e) => e.is_recoverable(),
            Self::Browser(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Io(_) | Self::Http(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Crawler(e) => e.category(),
            Self::Fetch(e) => e.category(),
            Self::Sign(e) => e.category(),
            Self::Browser(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
