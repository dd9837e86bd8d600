//! Auth state and configuration.

use chrono::Duration;
use std::sync::Arc;

use super::lockout::LockoutTracker;
use super::notify::Notifier;
use super::orchestrator::AuthOrchestrator;
use super::rate_limit::RateLimiter;
use super::reset::PasswordResetFlow;
use super::session::SessionManager;
use super::store::{SessionStore, TokenStore, UserStore};
use super::verifier::CredentialVerifier;

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
pub const DEFAULT_LOCKOUT_THRESHOLD: i32 = 5;
pub const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;
pub const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    lockout_threshold: i32,
    lockout_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: i32) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    auth: AuthOrchestrator,
    sessions: SessionManager,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let session_manager = SessionManager::new(
            sessions,
            Duration::seconds(config.session_ttl_seconds),
        );
        let auth = AuthOrchestrator::new(
            CredentialVerifier::new(users.clone()),
            LockoutTracker::new(
                users.clone(),
                config.lockout_threshold,
                Duration::seconds(config.lockout_seconds),
            ),
            session_manager.clone(),
            PasswordResetFlow::new(
                users,
                tokens,
                notifier,
                Duration::seconds(config.reset_token_ttl_seconds),
                config.frontend_base_url.clone(),
            ),
        );
        Self {
            config,
            auth,
            sessions: session_manager,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn auth(&self) -> &AuthOrchestrator {
        &self.auth
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::memory::{InMemorySessionStore, InMemoryTokenStore, InMemoryUserStore};
    use super::super::notify::LogNotifier;
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState};
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://chat.example.com".to_string());

        assert_eq!(config.frontend_base_url(), "https://chat.example.com");
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(600)
            .with_reset_token_ttl_seconds(120)
            .with_lockout_threshold(3)
            .with_lockout_seconds(60);

        assert_eq!(config.session_ttl_seconds(), 600);
        assert_eq!(config.reset_token_ttl_seconds, 120);
        assert_eq!(config.lockout_threshold, 3);
        assert_eq!(config.lockout_seconds, 60);
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let config = AuthConfig::new("https://chat.example.com".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(
            config,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(LogNotifier),
            limiter,
        );
        assert!(state.config().session_cookie_secure());
    }
}
