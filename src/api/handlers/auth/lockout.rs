//! Failed-login tracking and temporary account lockout.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::api::handlers::auth::store::{LockoutStatus, User, UserStore};

pub struct LockoutTracker {
    users: Arc<dyn UserStore>,
    threshold: i32,
    lock_for: Duration,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, threshold: i32, lock_for: Duration) -> Self {
        Self {
            users,
            threshold,
            lock_for,
        }
    }

    /// Whether `user` is locked at `now`. A lock expires the instant
    /// `locked_until` passes; no store write is needed to unlock.
    #[must_use]
    pub fn locked(user: &User, now: DateTime<Utc>) -> bool {
        user.locked_until.is_some_and(|until| until > now)
    }

    /// Store-backed lock check by id. Fails closed: an unreadable account is
    /// treated as locked.
    pub async fn is_locked(&self, id: Uuid) -> bool {
        match self.users.find_by_id(id).await {
            Ok(Some(user)) => Self::locked(&user, Utc::now()),
            Ok(None) => true,
            Err(err) => {
                warn!(user_id = %id, "lock check failed, treating as locked: {err:#}");
                true
            }
        }
    }

    /// Count one failure; the store applies the lock when the new count
    /// reaches the threshold.
    pub async fn record_failure(&self, id: Uuid) -> Result<LockoutStatus> {
        let status = self
            .users
            .record_login_failure(id, self.threshold, self.lock_for)
            .await?;
        if let Some(until) = status.locked_until {
            warn!(
                user_id = %id,
                failed_attempts = status.failed_attempts,
                locked_until = %until,
                "account locked after repeated login failures"
            );
        }
        Ok(status)
    }

    /// Clear counters and any lock after a successful login.
    pub async fn record_success(&self, id: Uuid) -> Result<()> {
        self.users.record_login_success(id).await
    }
}
