//! Store contracts and the records they own.
//!
//! User rows are owned by the wider platform; this subsystem only reads them
//! and mutates the lockout/login fields. Session and reset-token rows are
//! fully lifecycle-managed here. Every trait is an injection seam so the same
//! flows run against PostgreSQL in production and the in-memory backends in
//! tests and single-instance deployments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Account record as seen by the auth subsystem.
///
/// `password_hash` is `None` for OAuth-only accounts; those can never pass
/// credential verification but still burn a hash comparison.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// A bearer session. Only the token digest is kept; the raw token exists
/// client-side only.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Single-use password reset token (digest at rest).
#[derive(Clone, Debug)]
pub struct ResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Client metadata captured when a session is issued.
#[derive(Clone, Debug, Default)]
pub struct SessionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Lockout counters after a recorded failure.
#[derive(Clone, Copy, Debug)]
pub struct LockoutStatus {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Outcome of a session insert; token digests carry a unique constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateToken,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Record one failed login as a single atomic increment-and-fetch.
    ///
    /// The store applies the lock itself when the new count reaches
    /// `threshold`, so two concurrent failures cannot both observe the
    /// pre-increment count.
    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<LockoutStatus>;

    /// Reset failure counters, clear any lock, and stamp `last_login_at`.
    async fn record_login_success(&self, id: Uuid) -> Result<()>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<InsertOutcome>;

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>>;

    /// Last-writer-wins; implementations must keep the column monotonic.
    async fn update_last_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Returns whether a row was deleted; deleting twice is not an error.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<()>;

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Non-expired sessions, most recent activity first.
    async fn list_active_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<Vec<Session>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    async fn insert(&self, token: ResetToken) -> Result<()>;

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<ResetToken>>;

    /// Atomic claim: flips `used_at` from NULL exactly once.
    ///
    /// Returns `false` when the token is missing or already consumed, so of
    /// two concurrent confirms exactly one observes `true`.
    async fn mark_used(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_outcome_debug_names() {
        assert_eq!(format!("{:?}", InsertOutcome::Inserted), "Inserted");
        assert_eq!(
            format!("{:?}", InsertOutcome::DuplicateToken),
            "DuplicateToken"
        );
    }

    #[test]
    fn session_meta_default_is_empty() {
        let meta = SessionMeta::default();
        assert!(meta.ip_address.is_none());
        assert!(meta.user_agent.is_none());
    }
}
