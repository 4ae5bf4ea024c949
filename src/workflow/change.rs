//! Closed change-set types for task edits.
//!
//! Edits arrive as a list of tagged variants instead of a free-form field
//! map, so an unknown or mistyped field is rejected when the payload is
//! deserialized rather than silently ignored downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Priority, TaskStatus};

/// One field edit on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum TaskChange {
    Title { value: String },
    Description { value: String },
    Priority { value: Priority },
    DueDate { value: DateTime<Utc> },
    Assignee { user_id: String },
    Department { department_id: String },
    Status { value: TaskStatus },
}

/// The restricted subset of edits the bulk path accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum BulkChange {
    Status { value: TaskStatus },
    Priority { value: Priority },
    Assignee { user_id: String },
}

/// History-record kinds, one per logical change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Created,
    StatusChanged,
    Reassigned,
    PriorityChanged,
    DeadlineChanged,
    Submitted,
    Reviewed,
    Edited,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Created => "created",
            UpdateKind::StatusChanged => "status_changed",
            UpdateKind::Reassigned => "reassigned",
            UpdateKind::PriorityChanged => "priority_changed",
            UpdateKind::DeadlineChanged => "deadline_changed",
            UpdateKind::Submitted => "submitted",
            UpdateKind::Reviewed => "reviewed",
            UpdateKind::Edited => "edited",
        }
    }
}

/// Pick the history-record kind for a mixed change-set.
/// Precedence: status > reassignment > priority > deadline > generic edit.
pub fn dominant_kind(changes: &[TaskChange]) -> UpdateKind {
    let mut kind = UpdateKind::Edited;
    for change in changes {
        let candidate = match change {
            TaskChange::Status { .. } => UpdateKind::StatusChanged,
            TaskChange::Assignee { .. } => UpdateKind::Reassigned,
            TaskChange::Priority { .. } => UpdateKind::PriorityChanged,
            TaskChange::DueDate { .. } => UpdateKind::DeadlineChanged,
            _ => UpdateKind::Edited,
        };
        if rank(candidate) < rank(kind) {
            kind = candidate;
        }
    }
    kind
}

fn rank(kind: UpdateKind) -> u8 {
    match kind {
        UpdateKind::StatusChanged => 0,
        UpdateKind::Reassigned => 1,
        UpdateKind::PriorityChanged => 2,
        UpdateKind::DeadlineChanged => 3,
        _ => 4,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_dominates_everything() {
        let changes = vec![
            TaskChange::Title {
                value: "t".into(),
            },
            TaskChange::Priority {
                value: Priority::High,
            },
            TaskChange::Status {
                value: TaskStatus::InProgress,
            },
        ];
        assert_eq!(dominant_kind(&changes), UpdateKind::StatusChanged);
    }

    #[test]
    fn reassignment_beats_priority_and_deadline() {
        let changes = vec![
            TaskChange::DueDate { value: Utc::now() },
            TaskChange::Priority {
                value: Priority::Low,
            },
            TaskChange::Assignee {
                user_id: "u-2".into(),
            },
        ];
        assert_eq!(dominant_kind(&changes), UpdateKind::Reassigned);
    }

    #[test]
    fn plain_field_edits_are_edited() {
        let changes = vec![
            TaskChange::Title {
                value: "new title".into(),
            },
            TaskChange::Description {
                value: "new body".into(),
            },
        ];
        assert_eq!(dominant_kind(&changes), UpdateKind::Edited);
    }

    #[test]
    fn unknown_fields_are_rejected_at_the_boundary() {
        let err = serde_json::from_str::<TaskChange>(r#"{"field":"color","value":"red"}"#);
        assert!(err.is_err());
    }
}
