use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordPolicy;

/// Hash a plaintext password with a fresh random salt. Two calls with the same
/// input produce different strings.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Verify a plaintext password against a stored argon2 hash. Comparison goes
/// through the hash function, never string equality.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Password-length policy check, counting characters the way a user would.
pub fn meets_policy(plain: &str, policy: &PasswordPolicy) -> bool {
    plain.chars().count() >= policy.min_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_plaintext_hashes_differently_but_both_verify() {
        let password = "secret1";
        let first = hash_password(password).expect("first hash");
        let second = hash_password(password).expect("second hash");
        assert_ne!(first, second);
        assert!(verify_password(password, &first).unwrap());
        assert!(verify_password(password, &second).unwrap());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn policy_counts_characters_not_bytes() {
        let policy = PasswordPolicy { min_length: 6 };
        assert!(meets_policy("secret", &policy));
        assert!(!meets_policy("short", &policy));
        // six two-byte characters
        assert!(meets_policy("éééééé", &policy));
    }
}
