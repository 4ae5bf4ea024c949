//! `workflow` — the task lifecycle engine.
//!
//! - **state** — the composite (status, submission) state machine; illegal
//!   pairs are unrepresentable.
//! - **change** — closed change-set variants for edits and bulk edits.
//! - **store** — task rows, update history, filters, and stats over SQLite.
//! - **engine** — the transactional operations: create, edit, submit,
//!   review, bulk update, delete.

pub mod change;
pub mod engine;
pub mod state;
pub mod store;

pub use change::{BulkChange, TaskChange, UpdateKind};
pub use engine::{NewTask, ReviewAction, TaskWorkflow};
pub use state::{Priority, SubmissionStatus, TaskStatus, WorkflowState};
pub use store::{TaskListParams, TaskRow, TaskStore};
