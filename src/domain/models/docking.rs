//! Docking dispatch types: work items, backend jobs and their outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One (dispatch id, structure string) pair sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub name: String,
    #[serde(rename = "smiles")]
    pub structure: String,
}

/// A batch submission handed to a [`DockingBackend`](crate::domain::ports::DockingBackend).
#[derive(Debug, Clone)]
pub struct DockingJob {
    /// Base64-encoded structure file contents.
    pub structure_encoded: String,
    pub items: Vec<WorkItem>,
    pub samples_per_item: u32,
}

/// Backend job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// Map a RunPod-style status string. Unrecognized values count as still running.
    pub fn from_backend(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "IN_QUEUE" => Self::Queued,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "TIMED_OUT" => Self::TimedOut,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Running,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One scored item as returned by the backend, still keyed by dispatch id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub name: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub confidence_raw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_poses: Option<serde_json::Value>,
}

/// Result of polling a job once.
#[derive(Debug, Clone)]
pub struct JobPoll {
    pub status: JobStatus,
    /// Populated only when `status` is `Completed`.
    pub scores: Vec<RawScore>,
    pub error: Option<String>,
}

impl JobPoll {
    pub const fn pending(status: JobStatus) -> Self {
        Self {
            status,
            scores: Vec::new(),
            error: None,
        }
    }
}

/// A batch that ended without results. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub status: JobStatus,
    pub detail: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {} {}: {}", self.batch_index, self.status, self.detail)
    }
}
