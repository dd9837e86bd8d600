//! PostgreSQL store backends.
//!
//! Counter updates are single statements so lockout and token consumption
//! stay atomic under concurrent requests; the database, not the process,
//! decides who wins.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::store::{
    InsertOutcome, LockoutStatus, ResetToken, Session, SessionStore, TokenStore, User, UserStore,
};
use super::utils::is_unique_violation;

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        failed_login_attempts: row.get("failed_login_attempts"),
        locked_until: row.get("locked_until"),
        last_login_at: row.get("last_login_at"),
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
        last_activity_at: row.get("last_activity_at"),
        expires_at: row.get("expires_at"),
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, failed_login_attempts, locked_until, last_login_at
            FROM users WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, failed_login_attempts, locked_until, last_login_at
            FROM users WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<LockoutStatus> {
        // Increment and lock in one statement; concurrent failures serialize
        // on the row and each sees its own post-increment count.
        let query = r"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2
                    THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE locked_until
                END
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .bind(threshold)
            .bind(lock_for.num_seconds())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?
            .ok_or_else(|| anyhow!("user not found: {id}"))?;
        Ok(LockoutStatus {
            failed_attempts: row.get("failed_login_attempts"),
            locked_until: row.get("locked_until"),
        })
    }

    async fn record_login_success(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, last_login_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("user not found: {id}"));
        }
        Ok(())
    }
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: Session) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO user_sessions
                (id, user_id, token_hash, ip_address, user_agent,
                 created_at, last_activity_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.created_at)
            .bind(session.last_activity_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await;
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::DuplicateToken),
            Err(err) => Err(err).context("failed to insert session"),
        }
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        let query = r"
            SELECT id, user_id, token_hash, ip_address, user_agent,
                   created_at, last_activity_at, expires_at
            FROM user_sessions WHERE token_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session by token")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        let query = r"
            SELECT id, user_id, token_hash, ip_address, user_agent,
                   created_at, last_activity_at, expires_at
            FROM user_sessions WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session by id")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn update_last_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        // The guard keeps the column monotonic when touches race.
        let query = r"
            UPDATE user_sessions SET last_activity_at = $2
            WHERE id = $1 AND last_activity_at < $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update session activity")?;
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM user_sessions WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM user_sessions WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session by token")?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete sessions for user")?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE expires_at <= $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(before)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete expired sessions")?;
        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let query = r"
            SELECT id, user_id, token_hash, ip_address, user_agent,
                   created_at, last_activity_at, expires_at
            FROM user_sessions
            WHERE user_id = $1 AND expires_at > $2
            ORDER BY last_activity_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list sessions for user")?;
        Ok(rows.iter().map(session_from_row).collect())
    }
}

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM password_reset_tokens WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete reset tokens for user")?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, token: ResetToken) -> Result<()> {
        let query = r"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token.id)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .bind(token.used_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert reset token")?;
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<ResetToken>> {
        let query = r"
            SELECT id, user_id, token_hash, expires_at, used_at
            FROM password_reset_tokens WHERE token_hash = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup reset token")?;
        Ok(row.map(|row| ResetToken {
            id: row.get("id"),
            user_id: row.get("user_id"),
            token_hash: row.get("token_hash"),
            expires_at: row.get("expires_at"),
            used_at: row.get("used_at"),
        }))
    }

    async fn mark_used(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool> {
        // The IS NULL guard makes the claim first-writer-wins.
        let query = r"
            UPDATE password_reset_tokens SET used_at = $2
            WHERE token_hash = $1 AND used_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to claim reset token")?;
        Ok(result.rows_affected() > 0)
    }
}
