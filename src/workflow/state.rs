//! Workflow state for tasks.
//!
//! A task's lifecycle is the composite of its board status and its submission
//! state. The two are stored as separate columns but modeled here as one
//! [`WorkflowState`] enum of *legal* pairs, so a combination like
//! (approved, todo) cannot exist in memory — loading one from the database is
//! a decode error, not a representable value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OpsError, OpsResult};

// ─── Board status and priority ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(OpsError::validation(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(OpsError::validation(
                "priority",
                format!("unknown priority '{other}'"),
            )),
        }
    }
}

// ─── Submission status ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    NotSubmitted,
    PendingReview,
    Approved,
    RevisionRequested,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::NotSubmitted => "not_submitted",
            SubmissionStatus::PendingReview => "pending_review",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::RevisionRequested => "revision_requested",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Composite workflow state ─────────────────────────────────────────────────

/// Legal (status, submission_status) pairs.
///
/// `Approved` carries no status field: an approved task is completed by
/// construction. Every other submission state may coexist with any board
/// status — in particular a task under `RevisionRequested` lands on todo at
/// review time but may be moved forward again while the revision tag and
/// notes remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Open(TaskStatus),
    PendingReview(TaskStatus),
    Approved,
    RevisionRequested(TaskStatus),
}

impl WorkflowState {
    /// Initial state at task creation.
    pub fn new() -> Self {
        WorkflowState::Open(TaskStatus::Todo)
    }

    /// Decode the two stored columns. An illegal pair — approved together
    /// with anything but completed — is a stored-data error, not a value.
    pub fn decode(status: &str, submission: &str) -> OpsResult<Self> {
        let status: TaskStatus = status.parse()?;
        match submission {
            "not_submitted" => Ok(WorkflowState::Open(status)),
            "pending_review" => Ok(WorkflowState::PendingReview(status)),
            "revision_requested" => Ok(WorkflowState::RevisionRequested(status)),
            "approved" if status == TaskStatus::Completed => Ok(WorkflowState::Approved),
            "approved" => Err(OpsError::validation(
                "submission_status",
                format!("approved task stored with status '{status}'"),
            )),
            other => Err(OpsError::validation(
                "submission_status",
                format!("unknown submission status '{other}'"),
            )),
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            WorkflowState::Open(s)
            | WorkflowState::PendingReview(s)
            | WorkflowState::RevisionRequested(s) => *s,
            WorkflowState::Approved => TaskStatus::Completed,
        }
    }

    pub fn submission(&self) -> SubmissionStatus {
        match self {
            WorkflowState::Open(_) => SubmissionStatus::NotSubmitted,
            WorkflowState::PendingReview(_) => SubmissionStatus::PendingReview,
            WorkflowState::Approved => SubmissionStatus::Approved,
            WorkflowState::RevisionRequested(_) => SubmissionStatus::RevisionRequested,
        }
    }

    /// Apply a board-status change. Status values are unconstrained between
    /// themselves (completed → todo is fine); only an approved task's status
    /// is fixed.
    pub fn with_status(self, status: TaskStatus) -> OpsResult<Self> {
        match self {
            WorkflowState::Open(_) => Ok(WorkflowState::Open(status)),
            WorkflowState::PendingReview(_) => Ok(WorkflowState::PendingReview(status)),
            WorkflowState::RevisionRequested(_) => Ok(WorkflowState::RevisionRequested(status)),
            WorkflowState::Approved => Err(OpsError::conflict(
                "task is approved; its status can no longer change",
            )),
        }
    }

    /// Submit for review. Legal from any state except an already-pending one.
    pub fn submit(self) -> OpsResult<Self> {
        match self {
            WorkflowState::PendingReview(_) => {
                Err(OpsError::conflict("task is already pending review"))
            }
            other => Ok(WorkflowState::PendingReview(other.status())),
        }
    }

    /// Approve a pending submission.
    pub fn approve(self) -> OpsResult<Self> {
        match self {
            WorkflowState::PendingReview(_) => Ok(WorkflowState::Approved),
            _ => Err(OpsError::conflict("task is not pending review")),
        }
    }

    /// Send a pending submission back for revision. The task returns to todo.
    pub fn request_revision(self) -> OpsResult<Self> {
        match self {
            WorkflowState::PendingReview(_) => {
                Ok(WorkflowState::RevisionRequested(TaskStatus::Todo))
            }
            _ => Err(OpsError::conflict("task is not pending review")),
        }
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
