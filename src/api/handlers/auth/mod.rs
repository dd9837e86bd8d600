//! Auth handlers and supporting modules.
//!
//! This module coordinates credential verification, lockout tracking, session
//! management, and password reset for the chat platform.
//!
//! ## Enumeration defense
//!
//! Responses never reveal whether an account exists. Unknown emails, wrong
//! passwords, and passwordless (OAuth-only) accounts produce identical login
//! denials, each costing one Argon2 comparison; password reset requests
//! return the same body either way.
//!
//! ## Tokens at rest
//!
//! Session and reset tokens are 256-bit random values delivered to the client
//! once. Storage holds only their SHA-256 digests, so a leaked database dump
//! yields no usable credentials.

pub(crate) mod endpoints;
mod lockout;
pub mod memory;
mod notify;
mod orchestrator;
mod password;
pub(crate) mod postgres;
mod rate_limit;
mod reset;
mod session;
mod state;
mod store;
pub(crate) mod types;
mod utils;
mod verifier;

pub use lockout::LockoutTracker;
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{AuthOrchestrator, LoginDenied, LoginOutcome, RevokeOutcome};
pub use rate_limit::{
    FixedWindowRateLimiter, NoopRateLimiter, RateLimitClass, RateLimitConfig, RateLimitResult,
    RateLimiter, spawn_purge_task,
};
pub use reset::{ConfirmOutcome, PasswordResetFlow};
pub use session::{IssuedSession, SessionManager, spawn_sweeper};
pub use state::{
    AuthConfig, AuthState, DEFAULT_PURGE_INTERVAL_SECONDS, DEFAULT_SWEEP_INTERVAL_SECONDS,
};
pub use store::{
    InsertOutcome, LockoutStatus, ResetToken, Session, SessionMeta, SessionStore, TokenStore,
    User, UserStore,
};
pub use verifier::{CredentialVerifier, VerifyFailure, VerifyOutcome};
