//! In-memory store backends.
//!
//! Used by the test suite and by single-instance deployments that do not
//! need durable sessions. Each store is a `tokio::sync::Mutex` over a
//! `HashMap`; mutations hold the lock for the whole read-modify-write so the
//! atomicity contracts of the traits hold without a database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::handlers::auth::store::{
    InsertOutcome, LockoutStatus, ResetToken, Session, SessionStore, TokenStore, User, UserStore,
};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }

    pub async fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<LockoutStatus> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user not found: {id}"))?;
        user.failed_login_attempts += 1;
        if user.failed_login_attempts >= threshold {
            user.locked_until = Some(Utc::now() + lock_for);
        }
        Ok(LockoutStatus {
            failed_attempts: user.failed_login_attempts,
            locked_until: user.locked_until,
        })
    }

    async fn record_login_success(&self, id: Uuid) -> Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user not found: {id}"))?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<InsertOutcome> {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .values()
            .any(|s| s.token_hash == session.token_hash)
        {
            return Ok(InsertOutcome::DuplicateToken);
        }
        sessions.insert(session.id, session);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.lock().await.get(&id).cloned())
    }

    async fn update_last_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&id) {
            if session.last_activity_at < at {
                session.last_activity_at = at;
            }
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.sessions.lock().await.remove(&id).is_some())
    }

    async fn delete_by_token_hash(&self, token_hash: &[u8]) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.token_hash != token_hash);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.retain(|_, s| s.expires_at > before);
        Ok((count - sessions.len()) as u64)
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<Uuid, ResetToken>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn insert(&self, token: ResetToken) -> Result<()> {
        self.tokens.lock().await.insert(token.id, token);
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Option<ResetToken>> {
        let tokens = self.tokens.lock().await;
        Ok(tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn mark_used(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool> {
        let mut tokens = self.tokens.lock().await;
        match tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.used_at.is_none())
        {
            Some(token) => {
                token.used_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(id: Uuid) -> User {
        User {
            id,
            email: format!("{id}@example.com"),
            password_hash: Some("$argon2id$fake".to_string()),
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
        }
    }

    #[tokio::test]
    async fn failure_count_locks_at_threshold() {
        let store = InMemoryUserStore::new();
        let id = Uuid::new_v4();
        store.seed(user(id)).await;

        for n in 1..5 {
            let status = store
                .record_login_failure(id, 5, Duration::minutes(15))
                .await
                .unwrap();
            assert_eq!(status.failed_attempts, n);
            assert!(status.locked_until.is_none());
        }

        let status = store
            .record_login_failure(id, 5, Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(status.failed_attempts, 5);
        assert!(status.locked_until.is_some());
    }

    #[tokio::test]
    async fn success_clears_counters_and_stamps_login() {
        let store = InMemoryUserStore::new();
        let id = Uuid::new_v4();
        let mut u = user(id);
        u.failed_login_attempts = 4;
        u.locked_until = Some(Utc::now() + Duration::minutes(5));
        store.seed(u).await;

        store.record_login_success(id).await.unwrap();
        let u = store.get(id).await.unwrap();
        assert_eq!(u.failed_login_attempts, 0);
        assert!(u.locked_until.is_none());
        assert!(u.last_login_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_token_hash_is_rejected() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: vec![1, 2, 3],
            ip_address: None,
            user_agent: None,
            created_at: now,
            last_activity_at: now,
            expires_at: now + Duration::days(30),
        };
        let mut twin = session.clone();
        twin.id = Uuid::new_v4();

        assert_eq!(store.insert(session).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert(twin).await.unwrap(),
            InsertOutcome::DuplicateToken
        );
    }

    #[tokio::test]
    async fn last_activity_never_moves_backwards() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let id = Uuid::new_v4();
        store
            .insert(Session {
                id,
                user_id: Uuid::new_v4(),
                token_hash: vec![9],
                ip_address: None,
                user_agent: None,
                created_at: now,
                last_activity_at: now,
                expires_at: now + Duration::days(1),
            })
            .await
            .unwrap();

        store
            .update_last_activity(id, now - Duration::minutes(1))
            .await
            .unwrap();
        let session = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(session.last_activity_at, now);
    }

    #[tokio::test]
    async fn mark_used_claims_exactly_once() {
        let store = InMemoryTokenStore::new();
        let hash = vec![7; 32];
        store
            .insert(ResetToken {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                token_hash: hash.clone(),
                expires_at: Utc::now() + Duration::hours(1),
                used_at: None,
            })
            .await
            .unwrap();

        assert!(store.mark_used(&hash, Utc::now()).await.unwrap());
        assert!(!store.mark_used(&hash, Utc::now()).await.unwrap());
    }
}
