//! # Gardi (Authentication & Session Security)
//!
//! `gardi` is the authentication authority for a multi-tenant chat platform.
//! It owns credential verification, account lockout, session lifecycle,
//! password-reset token lifecycle, and endpoint rate limiting. Everything else
//! (chat storage, AI plumbing, UI, email rendering) lives elsewhere and talks
//! to this service through its HTTP surface or its store/notifier traits.
//!
//! ## Enumeration defense
//!
//! Login and password-reset flows never reveal whether an email is registered:
//! missing accounts still pay for one password-hash comparison, and reset
//! requests return the same body whether or not a user exists.
//!
//! ## Fail closed
//!
//! A store failure on any security-guarding write (lockout counters, reset
//! token claims) denies the operation. An inability to record a failed login
//! attempt is never an excuse to let the login through.
//!
//! ## Tokens
//!
//! Session and reset tokens are 32 random bytes, handed to the client exactly
//! once. The database only ever sees their SHA-256 digest.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
