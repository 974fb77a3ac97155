use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants, EnumString};
use thiserror::Error;

/// Every failure the reconciliation engine can report.
///
/// Configuration-shaped errors abort a run; per-user and per-target errors are
/// collected into the [`RunReport`](crate::RunReport). See [`SyncError::is_fatal`].
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(
    name(SyncErrorKind),
    derive(EnumString, Display, Serialize, Deserialize, Hash, PartialOrd, Ord)
)]
pub enum SyncError {
    #[error("malformed user key: {0}")]
    MalformedKey(String),

    #[error("malformed group specification: {0}")]
    MalformedGroupSpec(String),

    #[error("no connector registered for target '{0}'")]
    UnknownTarget(String),

    #[error("attribute format error for {user}: {message}")]
    AttributeFormatError { user: String, message: String },

    #[error(
        "unable to process strays on target '{target}': count {count} exceeds max_adobe_only_users ({limit})"
    )]
    SafetyThresholdExceeded {
        target: String,
        count: usize,
        limit: String,
    },

    #[error("{operation} for {user} on target '{target}' failed: {message}")]
    SubmissionError {
        target: String,
        user: String,
        operation: String,
        message: String,
    },

    #[error("target '{target}' is unavailable: {message}")]
    TargetUnavailable { target: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("after-mapping hook failed: {0}")]
    HookError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Poisoned lock error: {0}")]
    PoisonedLock(String),
}

impl SyncError {
    /// Fatal errors abort the run; everything else is isolated to one user or target.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SyncError::AttributeFormatError { .. }
                | SyncError::SafetyThresholdExceeded { .. }
                | SyncError::SubmissionError { .. }
        )
    }

    pub fn kind(&self) -> SyncErrorKind {
        SyncErrorKind::from(self)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SyncError::PoisonedLock(err.to_string())
    }
}

/// A failure reported by a target connector for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("target unavailable: {0}")]
    Unavailable(String),
}
