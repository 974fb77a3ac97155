//! Summary of one reconciliation run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::SyncError;

/// One per-user or per-target failure recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Error variant, e.g. `SubmissionError`.
    pub kind: String,
    pub message: String,
}

impl From<&SyncError> for ErrorRecord {
    fn from(err: &SyncError) -> Self {
        ErrorRecord {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Counters and errors produced by [`RuleProcessor::run`](crate::RuleProcessor::run).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct RunReport {
    /// Directory records consumed.
    pub directory_users_read: usize,
    /// Directory records that passed key building and filters.
    pub directory_users_selected: usize,
    /// Target accounts left alone because of an exclusion rule.
    pub target_users_excluded: usize,
    pub created: usize,
    pub updated: usize,
    /// Users whose group membership changed on some target.
    pub groups_changed: usize,
    /// Strays found per target name after the directory pass.
    pub strays_found: BTreeMap<String, usize>,
    /// Strays that had removal or group-removal operations applied.
    pub strays_removed: usize,
    /// Targets whose stray disposition was skipped by the safety threshold.
    pub stray_thresholds_exceeded: Vec<String>,
    pub errors: Vec<ErrorRecord>,
    /// The run stopped early on an external cancellation request.
    pub cancelled: bool,
    /// Operations were computed but not submitted.
    pub test_mode: bool,
    /// Wall-clock time per run phase, in milliseconds.
    pub phase_ms: BTreeMap<String, f64>,
}

impl RunReport {
    pub fn record_error(&mut self, err: &SyncError) {
        self.errors.push(ErrorRecord::from(err));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
