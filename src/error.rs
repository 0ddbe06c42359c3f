use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single expiry check.
///
/// Timeout and connection failures are transient and eligible for retry;
/// lookup and certificate failures are deterministic and are not.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("certificate error: {0}")]
    Certificate(String),
}

impl CheckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckError::Timeout(_) => ErrorKind::Timeout,
            CheckError::Connection(_) => ErrorKind::Connection,
            CheckError::Lookup(_) => ErrorKind::Lookup,
            CheckError::Certificate(_) => ErrorKind::Certificate,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CheckError::Timeout(_) | CheckError::Connection(_))
    }
}

/// Serializable discriminant of a [`CheckError`], recorded in failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    Lookup,
    Certificate,
}

/// Fatal configuration problem. Aborts the run before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Read(#[from] config::ConfigError),

    #[error("no domains configured")]
    NoDomains,

    #[error("domain entry {0} has an empty name")]
    EmptyDomainName(usize),

    #[error("duplicate domain: {0}")]
    DuplicateDomain(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("{channel} notifications are enabled but {key} is not set")]
    MissingChannelParameter {
        channel: &'static str,
        key: &'static str,
    },
}
