//! Password reset: token issuance and single-use confirmation.
//!
//! Requesting a reset never reveals whether the account exists. Issuing a
//! token invalidates any earlier tokens for the same user, and confirmation
//! claims the token atomically so it can succeed at most once.

use anyhow::Result;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::api::handlers::auth::notify::Notifier;
use crate::api::handlers::auth::password::{hash_password, validate_password};
use crate::api::handlers::auth::store::{ResetToken, TokenStore, UserStore};
use crate::api::handlers::auth::utils::{build_reset_url, generate_token, hash_token, normalize_email};

pub enum ConfirmOutcome {
    Success { user_id: Uuid },
    /// Unknown, already used, or otherwise unusable token.
    TokenInvalid,
    TokenExpired,
    InvalidPassword(Vec<String>),
}

pub struct PasswordResetFlow {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    token_ttl: Duration,
    frontend_base_url: String,
}

impl PasswordResetFlow {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        token_ttl: Duration,
        frontend_base_url: String,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            token_ttl,
            frontend_base_url,
        }
    }

    /// Issue a reset token for `email` and hand the link to the notifier.
    ///
    /// Returns `Ok(())` for unknown accounts too; only store errors surface.
    /// Notifier failures are logged and swallowed, since surfacing them
    /// would distinguish real accounts from unknown ones.
    #[instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };

        // A new request supersedes any outstanding token.
        self.tokens.delete_all_for_user(user.id).await?;

        let token = generate_token()?;
        self.tokens
            .insert(ResetToken {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash: hash_token(&token),
                expires_at: Utc::now() + self.token_ttl,
                used_at: None,
            })
            .await?;
        info!(user_id = %user.id, "password reset token issued");

        let reset_url = build_reset_url(&self.frontend_base_url, &token);
        if let Err(err) = self
            .notifier
            .send_password_reset_link(&email, &reset_url)
            .await
        {
            error!(user_id = %user.id, "failed to deliver password reset link: {err:#}");
        }
        Ok(())
    }

    /// Consume `token` and set `new_password` for its user.
    ///
    /// The policy check runs before the token lookup so a weak password does
    /// not burn the single use.
    #[instrument(skip_all)]
    pub async fn confirm_reset(
        &self,
        token: &str,
        new_password: &SecretString,
    ) -> Result<ConfirmOutcome> {
        let violations = validate_password(new_password.expose_secret());
        if !violations.is_empty() {
            return Ok(ConfirmOutcome::InvalidPassword(violations));
        }

        let hash = hash_token(token);
        let Some(record) = self.tokens.find_by_token_hash(&hash).await? else {
            return Ok(ConfirmOutcome::TokenInvalid);
        };
        if record.used_at.is_some() {
            return Ok(ConfirmOutcome::TokenInvalid);
        }
        let now = Utc::now();
        if now > record.expires_at {
            return Ok(ConfirmOutcome::TokenExpired);
        }

        // Atomic claim; the loser of a concurrent confirm lands here.
        if !self.tokens.mark_used(&hash, now).await? {
            return Ok(ConfirmOutcome::TokenInvalid);
        }

        // If this write fails the claimed token stays burned; the user has
        // to request a fresh link rather than retry the same token.
        let password_hash = hash_password(new_password.expose_secret())?;
        self.users
            .update_password_hash(record.user_id, &password_hash)
            .await?;
        info!(user_id = %record.user_id, "password reset completed");
        Ok(ConfirmOutcome::Success {
            user_id: record.user_id,
        })
    }
}
