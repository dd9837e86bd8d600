//! Login, logout, and session-management flows composed over the core
//! components.
//!
//! Ordering inside `login` is deliberate: the hash comparison always runs
//! first so every denial costs the same, the lock check follows, and failed
//! attempts are not counted against an already-locked account.

use anyhow::Result;
use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::handlers::auth::lockout::LockoutTracker;
use crate::api::handlers::auth::reset::{ConfirmOutcome, PasswordResetFlow};
use crate::api::handlers::auth::session::{IssuedSession, SessionManager};
use crate::api::handlers::auth::store::{Session, SessionMeta};
use crate::api::handlers::auth::verifier::{CredentialVerifier, VerifyFailure, VerifyOutcome};

pub enum LoginOutcome {
    LoggedIn(IssuedSession),
    Denied(LoginDenied),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginDenied {
    InvalidCredentials,
    AccountLocked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NotFound,
    /// The session exists but belongs to another user. Handlers present
    /// this the same as `NotFound`.
    NotOwner,
}

pub struct AuthOrchestrator {
    verifier: CredentialVerifier,
    lockout: LockoutTracker,
    sessions: SessionManager,
    reset: PasswordResetFlow,
}

impl AuthOrchestrator {
    #[must_use]
    pub fn new(
        verifier: CredentialVerifier,
        lockout: LockoutTracker,
        sessions: SessionManager,
        reset: PasswordResetFlow,
    ) -> Self {
        Self {
            verifier,
            lockout,
            sessions,
            reset,
        }
    }

    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        meta: SessionMeta,
    ) -> Result<LoginOutcome> {
        match self.verifier.verify(email, password).await? {
            VerifyOutcome::Verified(user) => {
                if LockoutTracker::locked(&user, Utc::now()) {
                    return Ok(LoginOutcome::Denied(LoginDenied::AccountLocked));
                }
                self.lockout.record_success(user.id).await?;
                let issued = self.sessions.create(user.id, meta).await?;
                info!(user_id = %user.id, "login succeeded");
                Ok(LoginOutcome::LoggedIn(issued))
            }
            VerifyOutcome::Denied(VerifyFailure::WrongPassword(user)) => {
                if LockoutTracker::locked(&user, Utc::now()) {
                    // Locked accounts do not accumulate further failures.
                    return Ok(LoginOutcome::Denied(LoginDenied::AccountLocked));
                }
                self.lockout.record_failure(user.id).await?;
                Ok(LoginOutcome::Denied(LoginDenied::InvalidCredentials))
            }
            VerifyOutcome::Denied(
                VerifyFailure::NoSuchUser | VerifyFailure::NoPasswordSet,
            ) => Ok(LoginOutcome::Denied(LoginDenied::InvalidCredentials)),
        }
    }

    /// Resolve a raw token to its session, or `None` if unknown or expired.
    pub async fn session_info(&self, token: &str) -> Result<Option<Session>> {
        self.sessions.validate(token).await
    }

    /// End the session behind `token`; with `revoke_all`, end every session
    /// of that user. A stale token is a no-op.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str, revoke_all: bool) -> Result<()> {
        if revoke_all {
            if let Some(session) = self.sessions.validate(token).await? {
                self.sessions.revoke_all(session.user_id).await?;
                return Ok(());
            }
        }
        self.sessions.revoke_by_token(token).await
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>> {
        self.sessions.list_for_user(user_id).await
    }

    /// Revoke one session by id on behalf of `acting_user`.
    pub async fn revoke_session(&self, acting_user: Uuid, session_id: Uuid) -> Result<RevokeOutcome> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(RevokeOutcome::NotFound);
        };
        if session.user_id != acting_user {
            return Ok(RevokeOutcome::NotOwner);
        }
        self.sessions.revoke(session_id).await?;
        Ok(RevokeOutcome::Revoked)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.reset.request_reset(email).await
    }

    /// Confirm a password reset. On success every session of the affected
    /// user is revoked, so stolen sessions do not survive a reset.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &SecretString,
    ) -> Result<ConfirmOutcome> {
        let outcome = self.reset.confirm_reset(token, new_password).await?;
        if let ConfirmOutcome::Success { user_id } = outcome {
            self.sessions.revoke_all(user_id).await?;
        }
        Ok(outcome)
    }
}
