//! Credential verification with uniform timing.
//!
//! Every code path performs exactly one Argon2 comparison, including unknown
//! emails and OAuth-only accounts, so response timing does not reveal whether
//! an account exists or has a password.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::instrument;

use crate::api::handlers::auth::password::{dummy_password_hash, verify_password};
use crate::api::handlers::auth::store::{User, UserStore};
use crate::api::handlers::auth::utils::normalize_email;

#[derive(Debug)]
pub enum VerifyOutcome {
    Verified(User),
    Denied(VerifyFailure),
}

#[derive(Debug)]
pub enum VerifyFailure {
    NoSuchUser,
    NoPasswordSet,
    /// Password mismatch on an existing account; the user is carried so the
    /// caller can record the failure against it.
    WrongPassword(User),
}

pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Check `password` against the account for `email`.
    ///
    /// The email is normalized before lookup. A dummy hash is compared when
    /// no real hash is available so all denials cost one hash comparison.
    #[instrument(skip_all)]
    pub async fn verify(&self, email: &str, password: &SecretString) -> Result<VerifyOutcome> {
        let email = normalize_email(email);
        let user = self.users.find_by_email(&email).await?;

        let Some(user) = user else {
            let _ = verify_password(password.expose_secret(), dummy_password_hash());
            return Ok(VerifyOutcome::Denied(VerifyFailure::NoSuchUser));
        };

        let Some(hash) = user.password_hash.clone() else {
            let _ = verify_password(password.expose_secret(), dummy_password_hash());
            return Ok(VerifyOutcome::Denied(VerifyFailure::NoPasswordSet));
        };

        if verify_password(password.expose_secret(), &hash)? {
            Ok(VerifyOutcome::Verified(user))
        } else {
            Ok(VerifyOutcome::Denied(VerifyFailure::WrongPassword(user)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::memory::InMemoryUserStore;
    use crate::api::handlers::auth::password::hash_password;
    use uuid::Uuid;

    async fn verifier_with(user: Option<User>) -> CredentialVerifier {
        let store = Arc::new(InMemoryUserStore::new());
        if let Some(user) = user {
            store.seed(user).await;
        }
        CredentialVerifier::new(store)
    }

    fn user(email: &str, password: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password.map(|p| hash_password(p).unwrap()),
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
        }
    }

    #[tokio::test]
    async fn correct_password_verifies() {
        let verifier = verifier_with(Some(user("alice@example.com", Some("Str0ng!pass")))).await;
        let outcome = verifier
            .verify("alice@example.com", &SecretString::from("Str0ng!pass"))
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified(_)));
    }

    #[tokio::test]
    async fn email_is_normalized_before_lookup() {
        let verifier = verifier_with(Some(user("alice@example.com", Some("Str0ng!pass")))).await;
        let outcome = verifier
            .verify("  Alice@Example.COM ", &SecretString::from("Str0ng!pass"))
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified(_)));
    }

    #[tokio::test]
    async fn wrong_password_carries_the_user() {
        let verifier = verifier_with(Some(user("alice@example.com", Some("Str0ng!pass")))).await;
        let outcome = verifier
            .verify("alice@example.com", &SecretString::from("nope"))
            .await
            .unwrap();
        match outcome {
            VerifyOutcome::Denied(VerifyFailure::WrongPassword(u)) => {
                assert_eq!(u.email, "alice@example.com");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_email_is_denied() {
        let verifier = verifier_with(None).await;
        let outcome = verifier
            .verify("ghost@example.com", &SecretString::from("whatever"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Denied(VerifyFailure::NoSuchUser)
        ));
    }

    #[tokio::test]
    async fn oauth_only_account_is_denied() {
        let verifier = verifier_with(Some(user("sso@example.com", None))).await;
        let outcome = verifier
            .verify("sso@example.com", &SecretString::from("whatever"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            VerifyOutcome::Denied(VerifyFailure::NoPasswordSet)
        ));
    }
}
