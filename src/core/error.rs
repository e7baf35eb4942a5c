//! Error types shared by source clients and the cache

use crate::core::indicator::SourceKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures a source client can report for an indicator or a whole request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The credential was rejected or has expired. Not retried.
    #[error("Invalid or expired credential for {0}")]
    Auth(SourceKind),

    /// Unknown id or a series with no usable data.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider quota is exhausted for now.
    #[error("Rate limited by {0}")]
    RateLimited(SourceKind),

    /// Transport failures, unexpected status codes and malformed payloads.
    #[error("{0}")]
    Network(String),
}

impl SourceError {
    /// Maps an HTTP status to the taxonomy. Success codes never reach here.
    pub fn from_status(source: SourceKind, status: reqwest::StatusCode, subject: &str) -> Self {
        match status.as_u16() {
            401 | 403 => SourceError::Auth(source),
            404 => SourceError::NotFound(subject.to_string()),
            429 => SourceError::RateLimited(source),
            _ => SourceError::Network(format!("HTTP error: {status} for {subject}")),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(format!("Request error: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryErrorKind {
    Auth,
    NotFound,
    RateLimited,
    Network,
    MissingCredential,
    UnknownSource,
}

/// The failure recorded on a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryError {
    pub kind: EntryErrorKind,
    pub message: String,
}

impl EntryError {
    pub fn missing_credential() -> Self {
        Self {
            kind: EntryErrorKind::MissingCredential,
            message: "missing credential".to_string(),
        }
    }

    pub fn unknown_source() -> Self {
        Self {
            kind: EntryErrorKind::UnknownSource,
            message: "unrecognized indicator id".to_string(),
        }
    }

    /// Recorded on ids skipped after their source hit its rate limit.
    pub fn skipped_after_rate_limit(source: SourceKind) -> Self {
        Self {
            kind: EntryErrorKind::RateLimited,
            message: format!("skipped: {source} rate limit reached"),
        }
    }
}

impl From<&SourceError> for EntryError {
    fn from(err: &SourceError) -> Self {
        let kind = match err {
            SourceError::Auth(_) => EntryErrorKind::Auth,
            SourceError::NotFound(_) => EntryErrorKind::NotFound,
            SourceError::RateLimited(_) => EntryErrorKind::RateLimited,
            SourceError::Network(_) => EntryErrorKind::Network,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}
