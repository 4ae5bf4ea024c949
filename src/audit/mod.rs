//! Append-only audit trail.
//!
//! Every state-changing operation writes exactly one entry, inside the same
//! transaction as the change it records — if the audit insert fails, the
//! whole operation rolls back. There is no update or delete API; entries are
//! immutable once written.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::directory::Actor;
use crate::error::{OpsError, OpsResult};
use crate::policy::{Action, Module, PermissionGuard};
use crate::storage::with_timeout;

// ─── Entry ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::Login => "login",
            ActionType::Logout => "logout",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionType::Create),
            "update" => Ok(ActionType::Update),
            "delete" => Ok(ActionType::Delete),
            "login" => Ok(ActionType::Login),
            "logout" => Ok(ActionType::Logout),
            other => Err(OpsError::validation(
                "action_type",
                format!("unknown action type '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditLogRow {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub action_type: String,
    pub module: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub entity_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

/// Filters for querying the trail. All optional; unset means "any".
#[derive(Debug, Default)]
pub struct AuditQuery {
    pub actor_id: Option<String>,
    pub module: Option<Module>,
    pub action_type: Option<ActionType>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ─── Recorder ─────────────────────────────────────────────────────────────────

/// Pure sink for audit entries plus a guarded query surface.
///
/// `record_tx` carries no business knowledge — callers decide what counts as
/// one logically distinct mutation and call it once per mutation.
#[derive(Clone)]
pub struct AuditRecorder {
    pool: SqlitePool,
    guard: Arc<PermissionGuard>,
}

impl AuditRecorder {
    pub fn new(pool: SqlitePool, guard: Arc<PermissionGuard>) -> Self {
        Self { pool, guard }
    }

    /// Insert one entry inside the caller's transaction.
    ///
    /// Returns the entry id. A failure here fails the caller's transaction,
    /// which is what keeps "state changed but unaudited" unobservable.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_tx(
        tx: &mut Transaction<'_, Sqlite>,
        actor_id: &str,
        action: &str,
        action_type: ActionType,
        module: Module,
        entity_type: &str,
        entity_id: Option<&str>,
        entity_name: Option<&str>,
        old_value: Option<&serde_json::Value>,
        new_value: Option<&serde_json::Value>,
    ) -> OpsResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO audit_logs
             (id, actor_id, action, action_type, module, entity_type, entity_id, entity_name,
              old_value, new_value, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(actor_id)
        .bind(action)
        .bind(action_type.as_str())
        .bind(module.as_str())
        .bind(entity_type)
        .bind(entity_id)
        .bind(entity_name)
        .bind(old_value.map(|v| v.to_string()))
        .bind(new_value.map(|v| v.to_string()))
        .bind(&now)
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Query the trail, newest first. Requires administration/view.
    pub async fn query(&self, actor: &Actor, params: &AuditQuery) -> OpsResult<Vec<AuditLogRow>> {
        self.guard
            .authorize(actor, Module::Administration, Action::View)?;

        let limit = params.limit.unwrap_or(100).min(500);
        let offset = params.offset.unwrap_or(0);
        let pool = self.pool.clone();

        let mut rows: Vec<AuditLogRow> = with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM audit_logs ORDER BY created_at DESC")
                    .fetch_all(&pool)
                    .await?,
            )
        })
        .await?;

        if let Some(ref actor_id) = params.actor_id {
            rows.retain(|r| &r.actor_id == actor_id);
        }
        if let Some(module) = params.module {
            rows.retain(|r| r.module == module.as_str());
        }
        if let Some(action_type) = params.action_type {
            rows.retain(|r| r.action_type == action_type.as_str());
        }
        if let Some(ref from) = params.from {
            rows.retain(|r| r.created_at.as_str() >= from.as_str());
        }
        if let Some(ref to) = params.to {
            rows.retain(|r| r.created_at.as_str() <= to.as_str());
        }

        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    /// Unfiltered tail for the admin CLI; bypasses no guard because the CLI
    /// resolves its acting user like any other caller.
    pub async fn tail(&self, actor: &Actor, limit: i64) -> OpsResult<Vec<AuditLogRow>> {
        self.query(
            actor,
            &AuditQuery {
                limit: Some(limit),
                ..Default::default()
            },
        )
        .await
    }
}
