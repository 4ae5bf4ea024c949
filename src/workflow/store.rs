//! Row types and queries for tasks, their update history, and the minimal
//! article registry the workflow links against.
//!
//! Mutating statements that belong to a workflow transaction take the
//! caller's `Transaction` so the task write, its history record, and the
//! audit entry commit or roll back as one unit.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::change::UpdateKind;
use super::state::{Priority, TaskStatus, WorkflowState};
use crate::error::{OpsError, OpsResult};
use crate::storage::with_timeout;

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub assignee_id: String,
    pub department_id: String,
    pub status: String,
    pub priority: String,
    pub due_date: String,
    pub created_by: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub submission_status: String,
    pub submitted_at: Option<String>,
    pub reviewed_at: Option<String>,
    pub reviewer_id: Option<String>,
    pub revision_notes: Option<String>,
    pub article_id: Option<String>,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    /// Decode the stored (status, submission_status) pair.
    pub fn state(&self) -> OpsResult<WorkflowState> {
        WorkflowState::decode(&self.status, &self.submission_status)
    }

    pub(crate) fn apply_state(&mut self, state: WorkflowState) {
        self.status = state.status().as_str().to_string();
        self.submission_status = state.submission().as_str().to_string();
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskUpdateRow {
    pub id: String,
    pub task_id: String,
    pub kind: String,
    pub actor_id: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ArticleRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

// ─── Query shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TaskListParams {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub department_id: Option<String>,
    pub assignee_id: Option<String>,
    pub created_by: Option<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub total: i64,
    pub items: Vec<TaskRow>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: TaskRow,
    pub updates: Vec<TaskUpdateRow>,
}

#[derive(Debug, Default)]
pub struct StatsParams {
    pub department_id: Option<String>,
    pub assignee_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub overdue: i64,
    pub due_today: i64,
    pub due_this_week: i64,
    pub completion_rate: f64,
}

// ─── Store ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> OpsResult<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> OpsResult<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?)
    }

    /// Filtered, paginated task list, newest first.
    pub async fn list(&self, params: &TaskListParams) -> OpsResult<TaskPage> {
        let pool = self.pool.clone();
        let mut rows: Vec<TaskRow> = with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tasks ORDER BY created_at DESC")
                    .fetch_all(&pool)
                    .await?,
            )
        })
        .await?;

        if let Some(status) = params.status {
            rows.retain(|r| r.status == status.as_str());
        }
        if let Some(priority) = params.priority {
            rows.retain(|r| r.priority == priority.as_str());
        }
        if let Some(ref dept) = params.department_id {
            rows.retain(|r| &r.department_id == dept);
        }
        if let Some(ref assignee) = params.assignee_id {
            rows.retain(|r| &r.assignee_id == assignee);
        }
        if let Some(ref creator) = params.created_by {
            rows.retain(|r| &r.created_by == creator);
        }
        if let Some(from) = params.due_from {
            let from = from.to_rfc3339();
            rows.retain(|r| r.due_date.as_str() >= from.as_str());
        }
        if let Some(to) = params.due_to {
            let to = to.to_rfc3339();
            rows.retain(|r| r.due_date.as_str() <= to.as_str());
        }
        if let Some(ref search) = params.search {
            let q = search.to_lowercase();
            rows.retain(|r| {
                r.title.to_lowercase().contains(&q) || r.description.to_lowercase().contains(&q)
            });
        }

        let total = rows.len() as i64;
        let offset = params.offset.unwrap_or(0).max(0) as usize;
        let limit = params.limit.unwrap_or(50).clamp(1, 100) as usize;
        let items = rows.into_iter().skip(offset).take(limit).collect();
        Ok(TaskPage { total, items })
    }

    /// A task's update history, newest first.
    pub async fn history(&self, task_id: &str) -> OpsResult<Vec<TaskUpdateRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM task_updates WHERE task_id = ? ORDER BY created_at DESC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ─── Transactional writes ───────────────────────────────────────────────

    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        row: &TaskRow,
    ) -> OpsResult<()> {
        sqlx::query(
            "INSERT INTO tasks
             (id, title, description, assignee_id, department_id, status, priority, due_date,
              created_by, started_at, completed_at, submission_status, submitted_at, reviewed_at,
              reviewer_id, revision_notes, article_id, revision, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.assignee_id)
        .bind(&row.department_id)
        .bind(&row.status)
        .bind(&row.priority)
        .bind(&row.due_date)
        .bind(&row.created_by)
        .bind(&row.started_at)
        .bind(&row.completed_at)
        .bind(&row.submission_status)
        .bind(&row.submitted_at)
        .bind(&row.reviewed_at)
        .bind(&row.reviewer_id)
        .bind(&row.revision_notes)
        .bind(&row.article_id)
        .bind(row.revision)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Persist a mutated row, guarded by its optimistic-concurrency counter.
    ///
    /// `expected_revision` is the revision the row carried when it was loaded
    /// inside this transaction; the UPDATE both checks it and increments it.
    /// Zero rows affected means a concurrent writer won — StateConflict.
    pub async fn persist_tx(
        tx: &mut Transaction<'_, Sqlite>,
        row: &TaskRow,
        expected_revision: i64,
    ) -> OpsResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE tasks SET
               title = ?, description = ?, assignee_id = ?, department_id = ?, status = ?,
               priority = ?, due_date = ?, started_at = ?, completed_at = ?,
               submission_status = ?, submitted_at = ?, reviewed_at = ?, reviewer_id = ?,
               revision_notes = ?, article_id = ?, revision = revision + 1, updated_at = ?
             WHERE id = ? AND revision = ?",
        )
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.assignee_id)
        .bind(&row.department_id)
        .bind(&row.status)
        .bind(&row.priority)
        .bind(&row.due_date)
        .bind(&row.started_at)
        .bind(&row.completed_at)
        .bind(&row.submission_status)
        .bind(&row.submitted_at)
        .bind(&row.reviewed_at)
        .bind(&row.reviewer_id)
        .bind(&row.revision_notes)
        .bind(&row.article_id)
        .bind(&now)
        .bind(&row.id)
        .bind(expected_revision)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(OpsError::conflict(format!(
                "task '{}' was modified concurrently",
                row.id
            )));
        }
        Ok(())
    }

    pub async fn insert_update_tx(
        tx: &mut Transaction<'_, Sqlite>,
        task_id: &str,
        kind: UpdateKind,
        actor_id: &str,
        old_value: Option<&serde_json::Value>,
        new_value: Option<&serde_json::Value>,
        comment: Option<&str>,
    ) -> OpsResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO task_updates (id, task_id, kind, actor_id, old_value, new_value, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(kind.as_str())
        .bind(actor_id)
        .bind(old_value.map(|v| v.to_string()))
        .bind(new_value.map(|v| v.to_string()))
        .bind(comment)
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Remove a task and its history. The update rows go with the task; the
    /// system-wide audit trail does not.
    pub async fn delete_tx(tx: &mut Transaction<'_, Sqlite>, task_id: &str) -> OpsResult<()> {
        sqlx::query("DELETE FROM task_updates WHERE task_id = ?")
            .bind(task_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // ─── Reference lookups (inside workflow transactions) ───────────────────

    /// Status of a staff row, or None if the user does not exist.
    pub async fn staff_status_tx(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> OpsResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|(s,)| s))
    }

    pub async fn department_exists_tx(
        tx: &mut Transaction<'_, Sqlite>,
        department_id: &str,
    ) -> OpsResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM departments WHERE id = ?")
            .bind(department_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    pub async fn article_exists_tx(
        tx: &mut Transaction<'_, Sqlite>,
        article_id: &str,
    ) -> OpsResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.is_some())
    }

    // ─── Articles ───────────────────────────────────────────────────────────

    pub async fn get_article(&self, id: &str) -> OpsResult<Option<ArticleRow>> {
        Ok(sqlx::query_as("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn insert_article_tx(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        title: &str,
        created_by: &str,
    ) -> OpsResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO articles (id, title, status, created_by, created_at, updated_at)
             VALUES (?, ?, 'draft', ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // ─── Stats ──────────────────────────────────────────────────────────────

    /// Board-level counts and due-date pressure for dashboards.
    pub async fn stats(&self, params: &StatsParams) -> OpsResult<TaskStats> {
        let pool = self.pool.clone();
        let mut rows: Vec<TaskRow> = with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM tasks")
                .fetch_all(&pool)
                .await?)
        })
        .await?;

        if let Some(ref dept) = params.department_id {
            rows.retain(|r| &r.department_id == dept);
        }
        if let Some(ref assignee) = params.assignee_id {
            rows.retain(|r| &r.assignee_id == assignee);
        }

        let mut by_status: BTreeMap<String, i64> = TaskStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_priority: BTreeMap<String, i64> = Priority::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), 0))
            .collect();

        let now = Utc::now();
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let today_end = today_start + Duration::days(1);
        let week_end = today_start + Duration::days(7);

        let mut overdue = 0;
        let mut due_today = 0;
        let mut due_this_week = 0;

        for row in &rows {
            *by_status.entry(row.status.clone()).or_insert(0) += 1;
            *by_priority.entry(row.priority.clone()).or_insert(0) += 1;

            let open = row.status == "todo" || row.status == "in_progress";
            if !open {
                continue;
            }
            let Ok(due) = DateTime::parse_from_rfc3339(&row.due_date) else {
                continue;
            };
            let due = due.with_timezone(&Utc);
            if due < now {
                overdue += 1;
            }
            if due >= today_start && due < today_end {
                due_today += 1;
            }
            if due >= today_start && due < week_end {
                due_this_week += 1;
            }
        }

        let total = rows.len() as i64;
        let completed = *by_status.get("completed").unwrap_or(&0);
        let completion_rate = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Ok(TaskStats {
            total,
            by_status,
            by_priority,
            overdue,
            due_today,
            due_this_week,
            completion_rate,
        })
    }
}
