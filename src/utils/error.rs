//! Error types for the rednote crawler
//!
//! This module defines the transport and crawl-level error types used
//! throughout the application.

use thiserror::Error;

use crate::browser::BrowserError;
use crate::sign::SignError;
use crate::storage::StoreError;

/// Errors that can occur while issuing a signed platform request
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network-level failure (DNS, connection reset, TLS)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Structured failure reported by the platform
    #[error("API error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// The platform flagged this client's IP
    #[error("IP blocked by platform (code {code})")]
    IpBlocked { code: i64 },

    /// The platform demands a captcha before serving more data
    #[error("Captcha required (status {status}, verify type {verify_type:?}, verify uuid {verify_uuid:?})")]
    CaptchaRequired {
        status: u16,
        verify_type: Option<String>,
        verify_uuid: Option<String>,
    },

    /// The session is not logged in or has expired
    #[error("Login required: {0}")]
    LoginRequired(String),

    /// Signature generation failed
    #[error("Signing failed: {0}")]
    Sign(#[from] SignError),

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The surrounding crawl was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }

    /// Whether this error invalidates the whole session
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::IpBlocked { .. } | Self::CaptchaRequired { .. } | Self::LoginRequired(_)
        )
    }
}

/// General crawler errors
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Browser error
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Login did not produce a live session
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Crawler type not recognised
    #[error("Unsupported crawler type: {0}")]
    UnsupportedMode(String),

    /// Note or creator URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The crawl was cancelled
    #[error("Crawl cancelled")]
    Cancelled,
}

impl CrawlerError {
    /// Whether this error must terminate the whole run
    pub fn is_session_fatal(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_session_fatal() || matches!(e, FetchError::Cancelled),
            Self::LoginFailed(_) | Self::UnsupportedMode(_) | Self::Cancelled => true,
            _ => false,
        }
    }
}
