//! Staff and department registry.
//!
//! Every mutation here is hr-management-guarded and audited in the same
//! transaction as the row change. The registry also supplies the [`Actor`]
//! projection the permission guard and workflow engine run on.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::audit::{ActionType, AuditRecorder};
use crate::auth;
use crate::error::{OpsError, OpsResult};
use crate::policy::{Action, Module, PermissionGuard, Role};
use crate::storage::with_timeout;

// ─── Actor ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffStatus {
    Active,
    Disabled,
}

impl StaffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffStatus::Active => "active",
            StaffStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for StaffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffStatus {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StaffStatus::Active),
            "disabled" => Ok(StaffStatus::Disabled),
            other => Err(OpsError::validation(
                "status",
                format!("unknown staff status '{other}'"),
            )),
        }
    }
}

/// The authenticated staff member an operation runs as.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub status: StaffStatus,
}

// ─── Rows and payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaffRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
    pub department_id: Option<String>,
    pub position: Option<String>,
    pub status: String,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl StaffRow {
    /// Build the Actor projection. A row holding an out-of-set role or
    /// status is stored-data corruption and surfaces as a validation error.
    pub fn actor(&self) -> OpsResult<Actor> {
        Ok(Actor {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            role: self.role.parse()?,
            department_id: self.department_id.clone(),
            status: self.status.parse()?,
        })
    }
}

/// Staff projection exposed to callers — no password hash, plus task load.
#[derive(Debug, Clone, Serialize)]
pub struct StaffProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub department_id: Option<String>,
    pub position: Option<String>,
    pub status: String,
    pub last_login: Option<String>,
    pub created_at: String,
    pub active_tasks: i64,
    pub completed_tasks: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub position: Option<String>,
}

/// Partial staff update; unset fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<String>,
    pub position: Option<String>,
    pub status: Option<StaffStatus>,
}

#[derive(Debug, Default)]
pub struct StaffListParams {
    pub role: Option<Role>,
    pub status: Option<StaffStatus>,
    pub department_id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StaffPage {
    pub total: i64,
    pub items: Vec<StaffProfile>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DepartmentRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<String>,
    pub leader_name: Option<String>,
    pub member_count: i64,
    pub active_tasks: i64,
    pub completed_tasks: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDepartment {
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepartmentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub leader_id: Option<String>,
}

// ─── Service ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Directory {
    pool: SqlitePool,
    guard: Arc<PermissionGuard>,
}

impl Directory {
    pub fn new(pool: SqlitePool, guard: Arc<PermissionGuard>) -> Self {
        Self { pool, guard }
    }

    // ─── Lookups ────────────────────────────────────────────────────────────

    pub async fn get_staff(&self, id: &str) -> OpsResult<Option<StaffRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_by_username(&self, username: &str) -> OpsResult<Option<StaffRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_actor(&self, id: &str) -> OpsResult<Actor> {
        self.get_staff(id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", id))?
            .actor()
    }

    /// Oldest admin account, used as the default acting user for local admin
    /// tooling when no actor is named explicitly.
    pub async fn first_admin(&self) -> OpsResult<Option<StaffRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM users WHERE role = 'admin' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_department(&self, id: &str) -> OpsResult<Option<DepartmentRow>> {
        Ok(sqlx::query_as("SELECT * FROM departments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Bootstrap ──────────────────────────────────────────────────────────

    /// Seed the very first account. Only legal while the users table is
    /// empty — afterwards staff creation goes through the guarded path.
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> OpsResult<Actor> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Err(OpsError::conflict(
                "staff already exist; create users through an admin account",
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users
             (id, username, email, full_name, password_hash, role, department_id, position,
              status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'admin', NULL, NULL, 'active', ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(full_name)
        .bind(auth::hash_password(password))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &id,
            "admin_bootstrapped",
            ActionType::Create,
            Module::Administration,
            "user",
            Some(&id),
            Some(full_name),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        self.get_actor(&id).await
    }

    // ─── Staff mutations ────────────────────────────────────────────────────

    pub async fn create_staff(&self, actor: &Actor, new: &NewStaff) -> OpsResult<StaffRow> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Create)?;

        if self.find_by_username(&new.username).await?.is_some() {
            return Err(OpsError::conflict(format!(
                "username '{}' already exists",
                new.username
            )));
        }
        let email_taken: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = ?")
                .bind(&new.email)
                .fetch_optional(&self.pool)
                .await?;
        if email_taken.is_some() {
            return Err(OpsError::conflict(format!(
                "email '{}' already exists",
                new.email
            )));
        }
        if let Some(ref dept) = new.department_id {
            if self.get_department(dept).await?.is_none() {
                return Err(OpsError::validation(
                    "department_id",
                    format!("department '{dept}' does not exist"),
                ));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO users
             (id, username, email, full_name, password_hash, role, department_id, position,
              status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
        )
        .bind(&id)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(auth::hash_password(&new.password))
        .bind(new.role.as_str())
        .bind(&new.department_id)
        .bind(&new.position)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "user_created",
            ActionType::Create,
            Module::HrManagement,
            "user",
            Some(&id),
            Some(&new.full_name),
            None,
            Some(&serde_json::json!({
                "username": new.username,
                "role": new.role.as_str(),
            })),
        )
        .await?;
        tx.commit().await?;

        self.get_staff(&id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", &id))
    }

    pub async fn update_staff(
        &self,
        actor: &Actor,
        user_id: &str,
        patch: &StaffPatch,
    ) -> OpsResult<StaffRow> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Edit)?;

        let mut row = self
            .get_staff(user_id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", user_id))?;

        // An actor may be edited by an admin, but nobody rewrites their own role.
        if actor.id == row.id {
            if let Some(role) = patch.role {
                if role.as_str() != row.role {
                    return Err(OpsError::Forbidden(
                        "cannot change your own role".to_string(),
                    ));
                }
            }
        }
        if let Some(ref dept) = patch.department_id {
            if self.get_department(dept).await?.is_none() {
                return Err(OpsError::validation(
                    "department_id",
                    format!("department '{dept}' does not exist"),
                ));
            }
        }

        let mut old_values = serde_json::Map::new();
        let mut new_values = serde_json::Map::new();
        if let Some(ref email) = patch.email {
            if *email != row.email {
                old_values.insert("email".into(), row.email.clone().into());
                new_values.insert("email".into(), email.clone().into());
                row.email = email.clone();
            }
        }
        if let Some(ref full_name) = patch.full_name {
            if *full_name != row.full_name {
                old_values.insert("full_name".into(), row.full_name.clone().into());
                new_values.insert("full_name".into(), full_name.clone().into());
                row.full_name = full_name.clone();
            }
        }
        if let Some(role) = patch.role {
            if role.as_str() != row.role {
                old_values.insert("role".into(), row.role.clone().into());
                new_values.insert("role".into(), role.as_str().into());
                row.role = role.as_str().to_string();
            }
        }
        if let Some(ref dept) = patch.department_id {
            if Some(dept) != row.department_id.as_ref() {
                old_values.insert(
                    "department_id".into(),
                    row.department_id.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
                );
                new_values.insert("department_id".into(), dept.clone().into());
                row.department_id = Some(dept.clone());
            }
        }
        if let Some(ref position) = patch.position {
            if Some(position) != row.position.as_ref() {
                old_values.insert(
                    "position".into(),
                    row.position.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
                );
                new_values.insert("position".into(), position.clone().into());
                row.position = Some(position.clone());
            }
        }
        if let Some(status) = patch.status {
            if status.as_str() != row.status {
                old_values.insert("status".into(), row.status.clone().into());
                new_values.insert("status".into(), status.as_str().into());
                row.status = status.as_str().to_string();
            }
        }

        if new_values.is_empty() {
            return Ok(row);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE users SET email = ?, full_name = ?, role = ?, department_id = ?,
             position = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&row.email)
        .bind(&row.full_name)
        .bind(&row.role)
        .bind(&row.department_id)
        .bind(&row.position)
        .bind(&row.status)
        .bind(&now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "user_updated",
            ActionType::Update,
            Module::HrManagement,
            "user",
            Some(user_id),
            Some(&row.full_name),
            Some(&serde_json::Value::Object(old_values)),
            Some(&serde_json::Value::Object(new_values)),
        )
        .await?;
        tx.commit().await?;

        self.get_staff(user_id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", user_id))
    }

    pub async fn set_staff_status(
        &self,
        actor: &Actor,
        user_id: &str,
        status: StaffStatus,
    ) -> OpsResult<StaffRow> {
        self.update_staff(
            actor,
            user_id,
            &StaffPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn reset_password(
        &self,
        actor: &Actor,
        user_id: &str,
        new_password: &str,
    ) -> OpsResult<()> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Edit)?;
        let row = self
            .get_staff(user_id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", user_id))?;

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(auth::hash_password(new_password))
            .bind(&now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "password_reset",
            ActionType::Update,
            Module::HrManagement,
            "user",
            Some(user_id),
            Some(&row.full_name),
            None,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_staff(&self, actor: &Actor, user_id: &str) -> OpsResult<()> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Delete)?;
        if actor.id == user_id {
            return Err(OpsError::Forbidden(
                "cannot delete your own account".to_string(),
            ));
        }
        let row = self
            .get_staff(user_id)
            .await?
            .ok_or_else(|| OpsError::not_found("user", user_id))?;

        let (open_tasks,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE assignee_id = ? AND status IN ('todo', 'in_progress')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        if open_tasks > 0 {
            return Err(OpsError::conflict(format!(
                "user has {open_tasks} open tasks; reassign them first"
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "user_deleted",
            ActionType::Delete,
            Module::HrManagement,
            "user",
            Some(user_id),
            Some(&row.full_name),
            None,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ─── Staff queries ──────────────────────────────────────────────────────

    pub async fn list_staff(
        &self,
        actor: &Actor,
        params: &StaffListParams,
    ) -> OpsResult<StaffPage> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::View)?;

        let pool = self.pool.clone();
        let mut rows: Vec<StaffRow> = with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC")
                .fetch_all(&pool)
                .await?)
        })
        .await?;

        if let Some(role) = params.role {
            rows.retain(|r| r.role == role.as_str());
        }
        if let Some(status) = params.status {
            rows.retain(|r| r.status == status.as_str());
        }
        if let Some(ref dept) = params.department_id {
            rows.retain(|r| r.department_id.as_ref() == Some(dept));
        }
        if let Some(ref search) = params.search {
            let q = search.to_lowercase();
            rows.retain(|r| {
                r.full_name.to_lowercase().contains(&q)
                    || r.username.to_lowercase().contains(&q)
                    || r.email.to_lowercase().contains(&q)
            });
        }

        let total = rows.len() as i64;
        let offset = params.offset.unwrap_or(0).max(0) as usize;
        let limit = params.limit.unwrap_or(50).clamp(1, 100) as usize;

        let mut items = Vec::new();
        for row in rows.into_iter().skip(offset).take(limit) {
            let (active, completed) = self.task_counts(&row.id).await?;
            items.push(StaffProfile {
                id: row.id,
                username: row.username,
                email: row.email,
                full_name: row.full_name,
                role: row.role,
                department_id: row.department_id,
                position: row.position,
                status: row.status,
                last_login: row.last_login,
                created_at: row.created_at,
                active_tasks: active,
                completed_tasks: completed,
            });
        }

        Ok(StaffPage { total, items })
    }

    async fn task_counts(&self, user_id: &str) -> OpsResult<(i64, i64)> {
        let (active,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE assignee_id = ? AND status IN ('todo', 'in_progress')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let (completed,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE assignee_id = ? AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((active, completed))
    }

    // ─── Departments ────────────────────────────────────────────────────────

    pub async fn create_department(
        &self,
        actor: &Actor,
        new: &NewDepartment,
    ) -> OpsResult<DepartmentRow> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Create)?;
        if let Some(ref leader) = new.leader_id {
            if self.get_staff(leader).await?.is_none() {
                return Err(OpsError::validation(
                    "leader_id",
                    format!("user '{leader}' does not exist"),
                ));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO departments (id, name, description, leader_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.leader_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "department_created",
            ActionType::Create,
            Module::HrManagement,
            "department",
            Some(&id),
            Some(&new.name),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        self.get_department(&id)
            .await?
            .ok_or_else(|| OpsError::not_found("department", &id))
    }

    pub async fn update_department(
        &self,
        actor: &Actor,
        department_id: &str,
        patch: &DepartmentPatch,
    ) -> OpsResult<DepartmentRow> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Edit)?;
        let mut row = self
            .get_department(department_id)
            .await?
            .ok_or_else(|| OpsError::not_found("department", department_id))?;
        if let Some(ref leader) = patch.leader_id {
            if self.get_staff(leader).await?.is_none() {
                return Err(OpsError::validation(
                    "leader_id",
                    format!("user '{leader}' does not exist"),
                ));
            }
        }

        let mut old_values = serde_json::Map::new();
        let mut new_values = serde_json::Map::new();
        if let Some(ref name) = patch.name {
            if *name != row.name {
                old_values.insert("name".into(), row.name.clone().into());
                new_values.insert("name".into(), name.clone().into());
                row.name = name.clone();
            }
        }
        if let Some(ref description) = patch.description {
            if Some(description) != row.description.as_ref() {
                old_values.insert(
                    "description".into(),
                    row.description.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
                );
                new_values.insert("description".into(), description.clone().into());
                row.description = Some(description.clone());
            }
        }
        if let Some(ref leader) = patch.leader_id {
            if Some(leader) != row.leader_id.as_ref() {
                old_values.insert(
                    "leader_id".into(),
                    row.leader_id.clone().map(Into::into).unwrap_or(serde_json::Value::Null),
                );
                new_values.insert("leader_id".into(), leader.clone().into());
                row.leader_id = Some(leader.clone());
            }
        }
        if new_values.is_empty() {
            return Ok(row);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE departments SET name = ?, description = ?, leader_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&row.name)
        .bind(&row.description)
        .bind(&row.leader_id)
        .bind(&now)
        .bind(department_id)
        .execute(&mut *tx)
        .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "department_updated",
            ActionType::Update,
            Module::HrManagement,
            "department",
            Some(department_id),
            Some(&row.name),
            Some(&serde_json::Value::Object(old_values)),
            Some(&serde_json::Value::Object(new_values)),
        )
        .await?;
        tx.commit().await?;

        self.get_department(department_id)
            .await?
            .ok_or_else(|| OpsError::not_found("department", department_id))
    }

    pub async fn delete_department(&self, actor: &Actor, department_id: &str) -> OpsResult<()> {
        self.guard
            .authorize(actor, Module::HrManagement, Action::Delete)?;
        let row = self
            .get_department(department_id)
            .await?
            .ok_or_else(|| OpsError::not_found("department", department_id))?;

        let (members,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE department_id = ?")
                .bind(department_id)
                .fetch_one(&self.pool)
                .await?;
        if members > 0 {
            return Err(OpsError::conflict(format!(
                "department has {members} members; reassign them first"
            )));
        }
        let (tasks,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE department_id = ?")
                .bind(department_id)
                .fetch_one(&self.pool)
                .await?;
        if tasks > 0 {
            return Err(OpsError::conflict(format!(
                "department has {tasks} tasks; reassign them first"
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(department_id)
            .execute(&mut *tx)
            .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "department_deleted",
            ActionType::Delete,
            Module::HrManagement,
            "department",
            Some(department_id),
            Some(&row.name),
            None,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Departments with member and task counts. Any active staff member may
    /// read the department list.
    pub async fn list_departments(&self, actor: &Actor) -> OpsResult<Vec<DepartmentSummary>> {
        self.guard.ensure_active(actor)?;

        let rows: Vec<DepartmentRow> =
            sqlx::query_as("SELECT * FROM departments ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let (member_count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE department_id = ?")
                    .bind(&row.id)
                    .fetch_one(&self.pool)
                    .await?;
            let (active_tasks,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM tasks WHERE department_id = ? AND status IN ('todo', 'in_progress')",
            )
            .bind(&row.id)
            .fetch_one(&self.pool)
            .await?;
            let (completed_tasks,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM tasks WHERE department_id = ? AND status = 'completed'",
            )
            .bind(&row.id)
            .fetch_one(&self.pool)
            .await?;
            let leader_name = match row.leader_id {
                Some(ref leader) => self.get_staff(leader).await?.map(|s| s.full_name),
                None => None,
            };
            summaries.push(DepartmentSummary {
                id: row.id,
                name: row.name,
                description: row.description,
                leader_id: row.leader_id,
                leader_name,
                member_count,
                active_tasks,
                completed_tasks,
            });
        }
        Ok(summaries)
    }
}
