use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{error, warn};

const MIN_LEN: usize = 6;
const MAX_LEN: usize = 128;

/// Which strength rule applies to a write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    /// 6..=128 chars with a lowercase letter, an uppercase letter and a digit.
    Strong,
    /// 6..=128 chars with a letter and a digit.
    Legacy,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct WeakPassword(pub &'static str);

pub fn check_strength(password: &str, policy: PasswordPolicy) -> Result<(), WeakPassword> {
    let len = password.chars().count();
    if password.is_empty() {
        return Err(WeakPassword("Password is required"));
    }
    match policy {
        PasswordPolicy::Strong => {
            if !(MIN_LEN..=MAX_LEN).contains(&len) {
                return Err(WeakPassword("Password must be between 6 and 128 characters"));
            }
            let lower = password.chars().any(|c| c.is_ascii_lowercase());
            let upper = password.chars().any(|c| c.is_ascii_uppercase());
            let digit = password.chars().any(|c| c.is_ascii_digit());
            if !(lower && upper && digit) {
                return Err(WeakPassword(
                    "Password must contain at least one lowercase letter, one uppercase letter, and one number",
                ));
            }
        }
        PasswordPolicy::Legacy => {
            if len < MIN_LEN {
                return Err(WeakPassword("Password must be at least 6 characters long"));
            }
            if len > MAX_LEN {
                return Err(WeakPassword("Password must be at most 128 characters long"));
            }
            let letter = password.chars().any(|c| c.is_ascii_alphabetic());
            let digit = password.chars().any(|c| c.is_ascii_digit());
            if !(letter && digit) {
                return Err(WeakPassword(
                    "Password must contain at least one letter and one number",
                ));
            }
        }
    }
    Ok(())
}

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

/// `false` for a wrong password and for a hash that does not parse.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Hash on the blocking pool so other requests keep running.
pub async fn hash_password_async(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

pub async fn verify_password_async(plain: String, hash: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("Passw0rd").unwrap();
        let b = hash_password("Passw0rd").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("Passw0rd", &a));
        assert!(verify_password("Passw0rd", &b));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_is_false_on_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }

    #[test]
    fn strong_policy() {
        assert!(check_strength("Abcde1", PasswordPolicy::Strong).is_ok());
        assert!(check_strength("Ab1", PasswordPolicy::Strong).is_err());
        assert!(check_strength("abcdef1", PasswordPolicy::Strong).is_err());
        assert!(check_strength("ABCDEF1", PasswordPolicy::Strong).is_err());
        assert!(check_strength("Abcdefg", PasswordPolicy::Strong).is_err());
        let long = format!("Aa1{}", "x".repeat(126));
        assert!(check_strength(&long, PasswordPolicy::Strong).is_err());
    }

    #[test]
    fn legacy_policy_ignores_case() {
        assert!(check_strength("abcdef1", PasswordPolicy::Legacy).is_ok());
        assert!(check_strength("ABCDEF1", PasswordPolicy::Legacy).is_ok());
        assert!(check_strength("abcdefg", PasswordPolicy::Legacy).is_err());
        assert_eq!(
            check_strength("ab1", PasswordPolicy::Legacy).unwrap_err().0,
            "Password must be at least 6 characters long"
        );
    }

    #[test]
    fn legacy_policy_caps_length() {
        let at_cap = format!("a1{}", "b".repeat(MAX_LEN - 2));
        assert!(check_strength(&at_cap, PasswordPolicy::Legacy).is_ok());
        let over = format!("{at_cap}c");
        assert_eq!(
            check_strength(&over, PasswordPolicy::Legacy).unwrap_err().0,
            "Password must be at most 128 characters long"
        );
    }

    #[tokio::test]
    async fn async_wrappers_match_sync_behaviour() {
        let hash = hash_password_async("Blocking1".into()).await.unwrap();
        assert!(verify_password_async("Blocking1".into(), hash.clone()).await.unwrap());
        assert!(!verify_password_async("blocking1".into(), hash).await.unwrap());
    }
}
