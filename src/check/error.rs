//! Error types for the check pipeline.
//!
//! Each stage returns a [`CheckError`] describing what went wrong. At the
//! batch boundary every variant is flattened into a [`TaskFailure`], the one
//! error kind callers see: a human-readable message for one resource.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures of a single check, by stage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Connection, DNS, TLS, timeout, invalid request header, body read error.
    #[error("http error: {detail}")]
    Transport {
        /// Description of the underlying failure.
        detail: String,
    },

    /// Declared or streamed body size exceeded the cap.
    #[error("content-size too big")]
    SizeLimitExceeded {
        /// The configured cap in bytes.
        limit: u64,
        /// Bytes declared or read when the cap was crossed.
        observed: u64,
    },

    /// Response status other than 200.
    #[error("http error: {summary}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Status line and URL of the response.
        summary: String,
    },

    /// The selector produced no anchor with an href.
    ///
    /// Reported the same way whether the page has no matching links or the
    /// selector could not be parsed.
    #[error("no link found. check your css_selector.")]
    NoLinksMatched,
}

/// Coarse classification of a [`CheckError`], used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckErrorKind {
    /// Network-level failure.
    Transport,
    /// Body too large.
    SizeLimitExceeded,
    /// Non-200 status.
    HttpStatus,
    /// Nothing extracted.
    NoLinksMatched,
}

impl fmt::Display for CheckErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transport => "transport",
            Self::SizeLimitExceeded => "size_limit_exceeded",
            Self::HttpStatus => "http_status",
            Self::NoLinksMatched => "no_links_matched",
        };
        write!(f, "{label}")
    }
}

impl CheckError {
    /// Creates a transport error from a reqwest error, including its source chain.
    pub fn transport(error: &reqwest::Error) -> Self {
        let mut detail = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Transport { detail }
    }

    /// Creates a transport error from a plain message.
    pub fn transport_message(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    /// Creates the transport-style error reported when a whole check times out.
    pub fn timed_out(limit: Duration) -> Self {
        Self::transport_message(format!("check timed out after {limit:?}"))
    }

    /// Creates a size-limit error.
    pub fn size_limit(limit: u64, observed: u64) -> Self {
        Self::SizeLimitExceeded { limit, observed }
    }

    /// Creates a status error from the response status and URL.
    pub fn http_status(status: reqwest::StatusCode, url: &str) -> Self {
        Self::HttpStatus {
            status: status.as_u16(),
            summary: format!("{status} ({url})"),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> CheckErrorKind {
        match self {
            Self::Transport { .. } => CheckErrorKind::Transport,
            Self::SizeLimitExceeded { .. } => CheckErrorKind::SizeLimitExceeded,
            Self::HttpStatus { .. } => CheckErrorKind::HttpStatus,
            Self::NoLinksMatched => CheckErrorKind::NoLinksMatched,
        }
    }
}

/// The single failure kind reported per resource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Creates a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CheckError> for TaskFailure {
    fn from(error: CheckError) -> Self {
        Self::new(error.to_string())
    }
}
