//! Password hashing, verification, and acceptance policy.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use std::sync::OnceLock;

const MIN_PASSWORD_LENGTH: usize = 8;

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Hash a password into a PHC string with the default Argon2id parameters.
///
/// # Errors
///
/// Returns an error if hashing fails (invalid parameters).
pub(super) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Verify a password against a stored PHC string.
///
/// Returns `Ok(false)` on a mismatch; `Err` only for malformed hashes.
pub(super) fn verify_password(password: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|err| anyhow!("invalid password hash: {err}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow!("failed to verify password: {err}")),
    }
}

/// Fixed hash used to keep lookup misses as expensive as real mismatches.
///
/// Verifying against this costs one Argon2 run with the same parameters as a
/// genuine comparison, so "no such user" and "wrong password" are not
/// distinguishable by response latency.
pub(super) fn dummy_password_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        // Hashing a constant with default parameters cannot realistically fail.
        hash_password("gardi-dummy-password").unwrap_or_default()
    })
}

/// Check a candidate password against the acceptance policy.
///
/// Returns one message per unmet requirement; empty means acceptable.
pub(super) fn validate_password(password: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        violations.push("Password must contain at least one special character".to_string());
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let phc = hash_password("Sup3r-secret").expect("hash");
        assert!(phc.starts_with("$argon2"));
        assert_eq!(verify_password("Sup3r-secret", &phc).ok(), Some(true));
        assert_eq!(verify_password("wrong-password", &phc).ok(), Some(false));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn dummy_hash_is_stable_and_verifiable() {
        let first = dummy_password_hash();
        let second = dummy_password_hash();
        assert_eq!(first, second);
        // A mismatching compare against the dummy must be a clean Ok(false).
        assert_eq!(verify_password("whatever", first).ok(), Some(false));
    }

    #[test]
    fn validate_password_accepts_strong_password() {
        assert!(validate_password("Str0ng-enough").is_empty());
    }

    #[test]
    fn validate_password_reports_each_violation() {
        let violations = validate_password("short");
        assert_eq!(violations.len(), 4);

        assert_eq!(validate_password("nouppercase1!").len(), 1);
        assert_eq!(validate_password("NOLOWERCASE1!").len(), 1);
        assert_eq!(validate_password("NoDigitsHere!").len(), 1);
        assert_eq!(validate_password("NoSymbols123").len(), 1);
    }

    #[test]
    fn validate_password_counts_chars_not_bytes() {
        // 8 multibyte chars with every required class present.
        assert!(validate_password("Pä55wör!").is_empty());
    }
}
