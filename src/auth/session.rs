//! Session issue and resolution.
//!
//! Tokens are opaque rows in the sessions table with a TTL — nothing is
//! encoded client-side, so revocation is a row delete. Expired rows are
//! pruned opportunistically whenever a token is resolved.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::audit::{ActionType, AuditRecorder};
use crate::auth;
use crate::directory::{Actor, StaffRow, StaffStatus};
use crate::error::{OpsError, OpsResult};
use crate::policy::{CapabilityMatrix, Module};

/// What a successful login hands back to the client.
#[derive(Debug, Serialize)]
pub struct LoginGrant {
    pub token: String,
    pub expires_at: String,
    pub actor: Actor,
    /// Full per-module capability flags for the actor's role, so clients can
    /// shape their UI without asking per-action.
    pub permissions: serde_json::Value,
}

#[derive(Clone)]
pub struct SessionManager {
    pool: SqlitePool,
    matrix: Arc<CapabilityMatrix>,
    ttl_minutes: i64,
}

impl SessionManager {
    pub fn new(pool: SqlitePool, matrix: Arc<CapabilityMatrix>, ttl_minutes: i64) -> Self {
        Self {
            pool,
            matrix,
            ttl_minutes,
        }
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown usernames and wrong passwords produce the same error text, so
    /// the response does not leak which accounts exist. A disabled account is
    /// rejected as an authentication failure even with a correct password.
    pub async fn login(&self, username: &str, password: &str) -> OpsResult<LoginGrant> {
        let row: Option<StaffRow> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let row = match row {
            Some(row) if auth::verify_password(password, &row.password_hash) => row,
            _ => {
                return Err(OpsError::Authentication(
                    "invalid username or password".to_string(),
                ))
            }
        };
        let actor = row.actor()?;
        if actor.status != StaffStatus::Active {
            return Err(OpsError::Authentication(format!(
                "account '{username}' is disabled"
            )));
        }

        let token = auth::new_token();
        let now = Utc::now();
        let expires_at = (now + Duration::minutes(self.ttl_minutes)).to_rfc3339();
        let now = now.to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(&actor.id)
        .bind(&now)
        .bind(&expires_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(&now)
            .bind(&actor.id)
            .execute(&mut *tx)
            .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &actor.id,
            "login",
            ActionType::Login,
            Module::Administration,
            "session",
            None,
            Some(&actor.username),
            None,
            None,
        )
        .await?;
        tx.commit().await?;

        Ok(LoginGrant {
            token,
            expires_at,
            permissions: self.matrix.permission_map(actor.role),
            actor,
        })
    }

    /// Close a session. Unknown tokens are an authentication error — there
    /// is nothing to log out of.
    pub async fn logout(&self, token: &str) -> OpsResult<()> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        let (user_id,) = row.ok_or_else(|| {
            OpsError::Authentication("invalid or expired session".to_string())
        })?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await?;
        AuditRecorder::record_tx(
            &mut tx,
            &user_id,
            "logout",
            ActionType::Logout,
            Module::Administration,
            "session",
            None,
            None,
            None,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Resolve a bearer token to its acting user.
    ///
    /// This is the `currentActor()` every mutating operation starts from:
    /// unknown or expired tokens and disabled accounts all fail here, before
    /// any capability is consulted.
    pub async fn resolve(&self, token: &str) -> OpsResult<Actor> {
        self.prune_expired().await?;

        let row: Option<StaffRow> = sqlx::query_as(
            "SELECT u.* FROM users u
             JOIN sessions s ON s.user_id = u.id
             WHERE s.token = ? AND s.expires_at > ?",
        )
        .bind(token)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| {
            OpsError::Authentication("invalid or expired session".to_string())
        })?;

        let actor = row.actor()?;
        if actor.status != StaffStatus::Active {
            return Err(OpsError::Authentication(format!(
                "account '{}' is disabled",
                actor.username
            )));
        }
        Ok(actor)
    }

    /// Drop sessions past their expiry. Called opportunistically on resolve.
    async fn prune_expired(&self) -> OpsResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
