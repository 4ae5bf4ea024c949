//! Post-commit notifications.
//!
//! Two delivery paths: a broadcast channel for connected clients (the
//! transport collaborator subscribes and forwards) and persistent per-user
//! notification rows. Both are fire-and-forget — a delivery failure is
//! logged and never fails or rolls back the operation that produced it.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::OpsResult;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub total: i64,
    pub unread: i64,
    pub items: Vec<NotificationRow>,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<String>,
    pool: SqlitePool,
}

impl Notifier {
    pub fn new(pool: SqlitePool) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx, pool }
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Send an event envelope to all subscribers.
    fn broadcast(&self, event: &str, params: Value) {
        let envelope = json!({ "event": event, "params": params });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&envelope).unwrap_or_default());
    }

    /// A task landed on someone's desk (creation or reassignment).
    pub async fn task_assigned(&self, assignee_id: &str, task_id: &str, task_title: &str) {
        self.broadcast(
            "task.assigned",
            json!({ "taskId": task_id, "assigneeId": assignee_id, "title": task_title }),
        );
        if let Err(e) = self
            .insert(
                assignee_id,
                "task_assigned",
                "New task assigned",
                &format!("You have been assigned: {task_title}"),
                Some(&format!("/tasks/{task_id}")),
            )
            .await
        {
            tracing::warn!(err = %e, task_id, "failed to persist task-assigned notification");
        }
    }

    /// A task's board status changed.
    pub async fn task_status_changed(
        &self,
        assignee_id: &str,
        task_id: &str,
        task_title: &str,
        status: &str,
    ) {
        self.broadcast(
            "task.statusChanged",
            json!({ "taskId": task_id, "status": status }),
        );
        if let Err(e) = self
            .insert(
                assignee_id,
                "task_status_changed",
                "Task status changed",
                &format!("'{task_title}' is now {status}"),
                Some(&format!("/tasks/{task_id}")),
            )
            .await
        {
            tracing::warn!(err = %e, task_id, "failed to persist status-changed notification");
        }
    }

    async fn insert(
        &self,
        user_id: &str,
        kind: &str,
        title: &str,
        message: &str,
        link: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, link, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(message)
        .bind(link)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Inbox ──────────────────────────────────────────────────────────────

    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> OpsResult<NotificationPage> {
        let items: Vec<NotificationRow> = if unread_only {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? AND is_read = 0
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        };

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let (unread,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(NotificationPage {
            total,
            unread,
            items,
        })
    }

    /// Mark one of the user's own notifications read. Unknown ids are a no-op.
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> OpsResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> OpsResult<u64> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
