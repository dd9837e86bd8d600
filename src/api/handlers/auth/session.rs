//! Session issuance, validation, and revocation.
//!
//! Raw session tokens never touch storage: the store holds SHA-256 digests,
//! and the raw token is returned to the caller exactly once at creation.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::api::handlers::auth::store::{InsertOutcome, Session, SessionMeta, SessionStore};
use crate::api::handlers::auth::utils::{generate_token, hash_token};

const CREATE_ATTEMPTS: usize = 3;

/// A freshly issued session with its one-time-visible raw token.
pub struct IssuedSession {
    pub session: Session,
    pub token: String,
}

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { sessions, ttl }
    }

    /// Issue a new session for `user_id`.
    ///
    /// Retries on token-digest collision; with 256-bit tokens a retry is
    /// effectively unreachable, but the unique constraint makes a silent
    /// session takeover impossible either way.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn create(&self, user_id: Uuid, meta: SessionMeta) -> Result<IssuedSession> {
        for _ in 0..CREATE_ATTEMPTS {
            let token = generate_token()?;
            let now = Utc::now();
            let session = Session {
                id: Uuid::new_v4(),
                user_id,
                token_hash: hash_token(&token),
                ip_address: meta.ip_address.clone(),
                user_agent: meta.user_agent.clone(),
                created_at: now,
                last_activity_at: now,
                expires_at: now + self.ttl,
            };
            match self.sessions.insert(session.clone()).await? {
                InsertOutcome::Inserted => {
                    info!(session_id = %session.id, "session created");
                    return Ok(IssuedSession { session, token });
                }
                InsertOutcome::DuplicateToken => {
                    debug!("session token digest collision, regenerating");
                }
            }
        }
        bail!("could not generate a unique session token after {CREATE_ATTEMPTS} attempts");
    }

    /// Resolve a raw token to its live session, touching `last_activity_at`.
    /// Expired and unknown tokens both resolve to `None`.
    pub async fn validate(&self, token: &str) -> Result<Option<Session>> {
        let hash = hash_token(token);
        let Some(session) = self.sessions.find_by_token_hash(&hash).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if now >= session.expires_at {
            return Ok(None);
        }
        self.sessions.update_last_activity(session.id, now).await?;
        Ok(Some(session))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Session>> {
        self.sessions.find_by_id(id).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        self.sessions.list_active_for_user(user_id, Utc::now()).await
    }

    /// Revoke by session id. Idempotent; returns whether a session existed.
    pub async fn revoke(&self, id: Uuid) -> Result<bool> {
        let deleted = self.sessions.delete_by_id(id).await?;
        if deleted {
            info!(session_id = %id, "session revoked");
        }
        Ok(deleted)
    }

    /// Revoke the session behind a raw token, if any.
    pub async fn revoke_by_token(&self, token: &str) -> Result<()> {
        self.sessions.delete_by_token_hash(&hash_token(token)).await
    }

    /// Revoke every session for a user. Returns how many were dropped.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64> {
        let dropped = self.sessions.delete_all_for_user(user_id).await?;
        if dropped > 0 {
            info!(user_id = %user_id, dropped, "revoked all sessions for user");
        }
        Ok(dropped)
    }

    /// Delete sessions whose expiry has passed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let swept = self.sessions.delete_expired(Utc::now()).await?;
        if swept > 0 {
            debug!(swept, "swept expired sessions");
        }
        Ok(swept)
    }
}

/// Periodic expired-session sweeper.
pub fn spawn_sweeper(
    manager: SessionManager,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = manager.sweep_expired().await {
                tracing::warn!("session sweep failed: {err:#}");
            }
        }
    })
}
