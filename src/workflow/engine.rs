//! The task workflow engine.
//!
//! Every operation follows the same shape: resolve preconditions, open one
//! transaction, apply the task mutation plus its history record plus the
//! audit entry, commit, and only then emit notifications. A failure anywhere
//! before the commit leaves nothing behind; a notification failure after the
//! commit never fails the operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use super::change::{dominant_kind, BulkChange, TaskChange, UpdateKind};
use super::state::{Priority, TaskStatus, WorkflowState};
use super::store::{
    ArticleRow, StatsParams, TaskDetail, TaskListParams, TaskPage, TaskRow, TaskStats, TaskStore,
};
use crate::audit::{ActionType, AuditRecorder};
use crate::directory::Actor;
use crate::error::{OpsError, OpsResult};
use crate::notify::Notifier;
use crate::policy::{Action, Module, PermissionGuard};

/// Payload for task creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assignee_id: String,
    pub department_id: String,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub article_id: Option<String>,
}

/// Reviewer verdict on a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    RequestRevision,
}

#[derive(Clone)]
pub struct TaskWorkflow {
    pool: SqlitePool,
    store: TaskStore,
    guard: Arc<PermissionGuard>,
    notifier: Arc<Notifier>,
}

impl TaskWorkflow {
    pub fn new(pool: SqlitePool, guard: Arc<PermissionGuard>, notifier: Arc<Notifier>) -> Self {
        let store = TaskStore::new(pool.clone());
        Self {
            pool,
            store,
            guard,
            notifier,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    // ─── Create ─────────────────────────────────────────────────────────────

    pub async fn create_task(&self, actor: &Actor, new: &NewTask) -> OpsResult<TaskRow> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::Create)?;

        let mut tx = self.pool.begin().await?;
        Self::check_assignee(&mut tx, &new.assignee_id).await?;
        if !TaskStore::department_exists_tx(&mut tx, &new.department_id).await? {
            return Err(OpsError::validation(
                "department_id",
                format!("department '{}' does not exist", new.department_id),
            ));
        }
        if let Some(ref article_id) = new.article_id {
            if !TaskStore::article_exists_tx(&mut tx, article_id).await? {
                return Err(OpsError::validation(
                    "article_id",
                    format!("article '{article_id}' does not exist"),
                ));
            }
        }

        let state = WorkflowState::new();
        let now = Utc::now().to_rfc3339();
        let row = TaskRow {
            id: Uuid::new_v4().to_string(),
            title: new.title.clone(),
            description: new.description.clone(),
            assignee_id: new.assignee_id.clone(),
            department_id: new.department_id.clone(),
            status: state.status().as_str().to_string(),
            priority: new.priority.as_str().to_string(),
            due_date: new.due_date.to_rfc3339(),
            created_by: actor.id.clone(),
            started_at: None,
            completed_at: None,
            submission_status: state.submission().as_str().to_string(),
            submitted_at: None,
            reviewed_at: None,
            reviewer_id: None,
            revision_notes: None,
            article_id: new.article_id.clone(),
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        TaskStore::insert_tx(&mut tx, &row).await?;
        TaskStore::insert_update_tx(
            &mut tx,
            &row.id,
            UpdateKind::Created,
            &actor.id,
            None,
            Some(&json!({ "title": row.title })),
            None,
        )
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "task_created",
            ActionType::Create,
            Module::TaskAssignment,
            "task",
            Some(&row.id),
            Some(&row.title),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        info!(task_id = %row.id, assignee = %row.assignee_id, "task created");
        self.notifier
            .task_assigned(&row.assignee_id, &row.id, &row.title)
            .await;

        self.store
            .get(&row.id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", &row.id))
    }

    // ─── Edit ───────────────────────────────────────────────────────────────

    /// Apply a change-set to one task as a single transactional unit.
    ///
    /// The actor must be the task's current assignee or hold
    /// task-assignment/edit. No-op changes are dropped; if anything remains,
    /// one history record is written, tagged by the dominant change.
    /// `expected_revision` lets callers reject lost updates explicitly.
    pub async fn edit_task(
        &self,
        actor: &Actor,
        task_id: &str,
        changes: &[TaskChange],
        expected_revision: Option<i64>,
    ) -> OpsResult<TaskRow> {
        self.guard.ensure_active(actor)?;

        let mut tx = self.pool.begin().await?;
        let mut row = TaskStore::get_tx(&mut tx, task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;

        if actor.id != row.assignee_id {
            self.guard
                .authorize(actor, Module::TaskAssignment, Action::Edit)?;
        }
        if let Some(expected) = expected_revision {
            if expected != row.revision {
                return Err(OpsError::conflict(format!(
                    "task revision is {}, expected {expected}",
                    row.revision
                )));
            }
        }

        let loaded_revision = row.revision;
        let mut state = row.state()?;
        let mut old_values = serde_json::Map::new();
        let mut new_values = serde_json::Map::new();
        let mut applied: Vec<TaskChange> = Vec::new();
        let mut assignee_changed = false;
        let mut status_changed = false;

        for change in changes {
            match change {
                TaskChange::Title { value } => {
                    if *value != row.title {
                        old_values.insert("title".into(), row.title.clone().into());
                        new_values.insert("title".into(), value.clone().into());
                        row.title = value.clone();
                        applied.push(change.clone());
                    }
                }
                TaskChange::Description { value } => {
                    if *value != row.description {
                        old_values.insert("description".into(), row.description.clone().into());
                        new_values.insert("description".into(), value.clone().into());
                        row.description = value.clone();
                        applied.push(change.clone());
                    }
                }
                TaskChange::Priority { value } => {
                    if value.as_str() != row.priority {
                        old_values.insert("priority".into(), row.priority.clone().into());
                        new_values.insert("priority".into(), value.as_str().into());
                        row.priority = value.as_str().to_string();
                        applied.push(change.clone());
                    }
                }
                TaskChange::DueDate { value } => {
                    let due = value.to_rfc3339();
                    if due != row.due_date {
                        old_values.insert("due_date".into(), row.due_date.clone().into());
                        new_values.insert("due_date".into(), due.clone().into());
                        row.due_date = due;
                        applied.push(change.clone());
                    }
                }
                TaskChange::Assignee { user_id } => {
                    if *user_id != row.assignee_id {
                        Self::check_assignee(&mut tx, user_id).await?;
                        old_values.insert("assignee_id".into(), row.assignee_id.clone().into());
                        new_values.insert("assignee_id".into(), user_id.clone().into());
                        row.assignee_id = user_id.clone();
                        assignee_changed = true;
                        applied.push(change.clone());
                    }
                }
                TaskChange::Department { department_id } => {
                    if *department_id != row.department_id {
                        if !TaskStore::department_exists_tx(&mut tx, department_id).await? {
                            return Err(OpsError::validation(
                                "department_id",
                                format!("department '{department_id}' does not exist"),
                            ));
                        }
                        old_values.insert(
                            "department_id".into(),
                            row.department_id.clone().into(),
                        );
                        new_values.insert("department_id".into(), department_id.clone().into());
                        row.department_id = department_id.clone();
                        applied.push(change.clone());
                    }
                }
                TaskChange::Status { value } => {
                    if *value != state.status() {
                        old_values
                            .insert("status".into(), state.status().as_str().into());
                        new_values.insert("status".into(), value.as_str().into());
                        state = state.with_status(*value)?;
                        Self::apply_status_timestamps(&mut row, *value);
                        status_changed = true;
                        applied.push(change.clone());
                    }
                }
            }
        }

        if applied.is_empty() {
            drop(tx);
            return Ok(row);
        }

        row.apply_state(state);
        TaskStore::persist_tx(&mut tx, &row, loaded_revision).await?;
        let kind = dominant_kind(&applied);
        TaskStore::insert_update_tx(
            &mut tx,
            task_id,
            kind,
            &actor.id,
            Some(&serde_json::Value::Object(old_values.clone())),
            Some(&serde_json::Value::Object(new_values.clone())),
            None,
        )
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "task_updated",
            ActionType::Update,
            Module::TaskAssignment,
            "task",
            Some(task_id),
            Some(&row.title),
            Some(&serde_json::Value::Object(old_values)),
            Some(&serde_json::Value::Object(new_values)),
        )
        .await?;
        tx.commit().await?;

        info!(task_id, kind = kind.as_str(), "task updated");
        if assignee_changed {
            self.notifier
                .task_assigned(&row.assignee_id, task_id, &row.title)
                .await;
        }
        if status_changed {
            self.notifier
                .task_status_changed(&row.assignee_id, task_id, &row.title, &row.status)
                .await;
        }

        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))
    }

    // ─── Submit ─────────────────────────────────────────────────────────────

    /// Submit a task for review. Identity check only: the actor must be the
    /// current assignee, whatever their role.
    pub async fn submit_task(
        &self,
        actor: &Actor,
        task_id: &str,
        article_id: Option<&str>,
    ) -> OpsResult<TaskRow> {
        self.guard.ensure_active(actor)?;

        let mut tx = self.pool.begin().await?;
        let mut row = TaskStore::get_tx(&mut tx, task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;
        if actor.id != row.assignee_id {
            return Err(OpsError::Forbidden(
                "only the task assignee can submit for review".to_string(),
            ));
        }

        let loaded_revision = row.revision;
        let state = row.state()?.submit()?;
        row.apply_state(state);
        row.submitted_at = Some(Utc::now().to_rfc3339());
        row.reviewed_at = None;
        if let Some(article_id) = article_id {
            if row.article_id.is_none() {
                if !TaskStore::article_exists_tx(&mut tx, article_id).await? {
                    return Err(OpsError::validation(
                        "article_id",
                        format!("article '{article_id}' does not exist"),
                    ));
                }
                row.article_id = Some(article_id.to_string());
            }
        }

        TaskStore::persist_tx(&mut tx, &row, loaded_revision).await?;
        TaskStore::insert_update_tx(
            &mut tx,
            task_id,
            UpdateKind::Submitted,
            &actor.id,
            None,
            Some(&json!({ "submission_status": "pending_review" })),
            None,
        )
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "task_submitted",
            ActionType::Update,
            Module::TaskAssignment,
            "task",
            Some(task_id),
            Some(&row.title),
            None,
            Some(&json!({ "submission_status": "pending_review" })),
        )
        .await?;
        tx.commit().await?;

        info!(task_id, "task submitted for review");
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))
    }

    // ─── Review ─────────────────────────────────────────────────────────────

    /// Approve a pending submission or send it back for revision.
    pub async fn review_task(
        &self,
        actor: &Actor,
        task_id: &str,
        action: ReviewAction,
        revision_notes: Option<&str>,
    ) -> OpsResult<TaskRow> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::Approve)?;

        let notes = match action {
            ReviewAction::RequestRevision => {
                let notes = revision_notes.map(str::trim).unwrap_or_default();
                if notes.is_empty() {
                    return Err(OpsError::validation(
                        "revision_notes",
                        "revision_notes are required when requesting revision",
                    ));
                }
                Some(notes.to_string())
            }
            ReviewAction::Approve => None,
        };

        let mut tx = self.pool.begin().await?;
        let mut row = TaskStore::get_tx(&mut tx, task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;

        let loaded_revision = row.revision;
        let old_status = row.status.clone();
        let now = Utc::now().to_rfc3339();
        let (state, action_name) = match action {
            ReviewAction::Approve => {
                let state = row.state()?.approve()?;
                row.completed_at = Some(now.clone());
                (state, "task_approved")
            }
            ReviewAction::RequestRevision => {
                let state = row.state()?.request_revision()?;
                row.revision_notes = notes.clone();
                (state, "task_revision_requested")
            }
        };
        row.apply_state(state);
        row.reviewed_at = Some(now);
        row.reviewer_id = Some(actor.id.clone());

        TaskStore::persist_tx(&mut tx, &row, loaded_revision).await?;
        TaskStore::insert_update_tx(
            &mut tx,
            task_id,
            UpdateKind::Reviewed,
            &actor.id,
            Some(&json!({ "status": old_status })),
            Some(&json!({
                "status": row.status,
                "submission_status": row.submission_status,
            })),
            notes.as_deref(),
        )
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            action_name,
            ActionType::Update,
            Module::TaskAssignment,
            "task",
            Some(task_id),
            Some(&row.title),
            Some(&json!({ "status": old_status })),
            Some(&json!({
                "status": row.status,
                "submission_status": row.submission_status,
            })),
        )
        .await?;
        tx.commit().await?;

        info!(task_id, verdict = action_name, "task reviewed");
        self.notifier
            .task_status_changed(&row.assignee_id, task_id, &row.title, &row.status)
            .await;

        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))
    }

    // ─── Bulk update ────────────────────────────────────────────────────────

    /// Apply a restricted change-set across many tasks.
    ///
    /// Unknown ids are skipped, not errors — the one deliberately partial
    /// path in the workflow. Updated tasks get their timestamp and revision
    /// bumped but no per-task history record; the batch carries a single
    /// audit entry instead.
    pub async fn bulk_update_tasks(
        &self,
        actor: &Actor,
        task_ids: &[String],
        changes: &[BulkChange],
    ) -> OpsResult<u64> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::Edit)?;
        if changes.is_empty() || task_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        // An invalid target assignee fails the whole batch before any row moves.
        for change in changes {
            if let BulkChange::Assignee { user_id } = change {
                Self::check_assignee(&mut tx, user_id).await?;
            }
        }

        let mut updated = 0u64;
        for task_id in task_ids {
            let Some(mut row) = TaskStore::get_tx(&mut tx, task_id).await? else {
                continue;
            };
            let loaded_revision = row.revision;
            let mut state = row.state()?;
            for change in changes {
                match change {
                    BulkChange::Status { value } => {
                        state = state.with_status(*value)?;
                        Self::apply_status_timestamps(&mut row, *value);
                    }
                    BulkChange::Priority { value } => {
                        row.priority = value.as_str().to_string();
                    }
                    BulkChange::Assignee { user_id } => {
                        row.assignee_id = user_id.clone();
                    }
                }
            }
            row.apply_state(state);
            TaskStore::persist_tx(&mut tx, &row, loaded_revision).await?;
            updated += 1;
        }

        if updated > 0 {
            AuditRecorder::record_tx(
                &mut tx,
                &actor.id,
                "tasks_bulk_updated",
                ActionType::Update,
                Module::TaskAssignment,
                "task",
                None,
                None,
                None,
                Some(&json!({
                    "task_count": updated,
                    "changes": changes,
                })),
            )
            .await?;
        }
        tx.commit().await?;

        info!(updated, "bulk task update applied");
        Ok(updated)
    }

    // ─── Delete ─────────────────────────────────────────────────────────────

    /// Delete a task and its update history. Refused while an article is
    /// still linked; the deletion itself still lands in the audit trail.
    pub async fn delete_task(&self, actor: &Actor, task_id: &str) -> OpsResult<()> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::Delete)?;

        let mut tx = self.pool.begin().await?;
        let row = TaskStore::get_tx(&mut tx, task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;
        if row.article_id.is_some() {
            return Err(OpsError::conflict(
                "cannot delete a task with a linked article; unlink it first",
            ));
        }

        TaskStore::delete_tx(&mut tx, task_id).await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "task_deleted",
            ActionType::Delete,
            Module::TaskAssignment,
            "task",
            Some(task_id),
            Some(&row.title),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        info!(task_id, "task deleted");
        Ok(())
    }

    // ─── Projections ────────────────────────────────────────────────────────

    pub async fn list_tasks(&self, actor: &Actor, params: &TaskListParams) -> OpsResult<TaskPage> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::View)?;
        self.store.list(params).await
    }

    pub async fn get_task(&self, actor: &Actor, task_id: &str) -> OpsResult<TaskDetail> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::View)?;
        let task = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;
        let updates = self.store.history(task_id).await?;
        Ok(TaskDetail { task, updates })
    }

    pub async fn task_stats(&self, actor: &Actor, params: &StatsParams) -> OpsResult<TaskStats> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::View)?;
        self.store.stats(params).await
    }

    // ─── Articles (linkage only) ────────────────────────────────────────────

    /// Register an article so tasks can link against it. The generation
    /// pipeline lives elsewhere; this is just the row the workflow needs.
    pub async fn create_article(&self, actor: &Actor, title: &str) -> OpsResult<ArticleRow> {
        self.guard
            .authorize(actor, Module::AiContent, Action::Create)?;

        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;
        TaskStore::insert_article_tx(&mut tx, &id, title, &actor.id).await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "article_created",
            ActionType::Create,
            Module::AiContent,
            "article",
            Some(&id),
            Some(title),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        self.store
            .get_article(&id)
            .await?
            .ok_or_else(|| OpsError::not_found("article", &id))
    }

    /// Unlink a task's article so the task becomes deletable.
    pub async fn unlink_article(&self, actor: &Actor, task_id: &str) -> OpsResult<TaskRow> {
        self.guard
            .authorize(actor, Module::TaskAssignment, Action::Edit)?;

        let mut tx = self.pool.begin().await?;
        let mut row = TaskStore::get_tx(&mut tx, task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))?;
        let Some(article_id) = row.article_id.take() else {
            drop(tx);
            return Ok(row);
        };
        let loaded_revision = row.revision;

        TaskStore::persist_tx(&mut tx, &row, loaded_revision).await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "task_article_unlinked",
            ActionType::Update,
            Module::TaskAssignment,
            "task",
            Some(task_id),
            Some(&row.title),
            Some(&json!({ "article_id": article_id })),
            Some(&json!({ "article_id": serde_json::Value::Null })),
        )
        .await?;
        tx.commit().await?;

        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| OpsError::not_found("task", task_id))
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    /// Assignees must exist and be active before any row is touched.
    async fn check_assignee(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> OpsResult<()> {
        match TaskStore::staff_status_tx(tx, user_id).await? {
            None => Err(OpsError::validation(
                "assignee_id",
                format!("user '{user_id}' does not exist"),
            )),
            Some(status) if status != "active" => Err(OpsError::validation(
                "assignee_id",
                format!("user '{user_id}' is disabled"),
            )),
            Some(_) => Ok(()),
        }
    }

    /// First entry into in_progress stamps `started_at` exactly once; entry
    /// into completed stamps `completed_at`.
    fn apply_status_timestamps(row: &mut TaskRow, status: TaskStatus) {
        match status {
            TaskStatus::InProgress if row.started_at.is_none() => {
                row.started_at = Some(Utc::now().to_rfc3339());
            }
            TaskStatus::Completed => {
                row.completed_at = Some(Utc::now().to_rfc3339());
            }
            _ => {}
        }
    }
}
