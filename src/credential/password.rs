/// Password hashing and policy
///
/// Argon2id with per-hash random salt. Verification goes through the PHC
/// string, which is a constant-time comparison inside the argon2 crate.

use crate::error::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("Invalid stored hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!("Password verification failed: {}", e))),
    }
}

/// Check a candidate password against the account password policy:
/// at least 8 characters, at least one digit, at least one letter.
pub fn check_policy(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "Password must contain at least one digit".to_string(),
        ));
    }

    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AuthError::Validation(
            "Password must contain at least one letter".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("password123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let h1 = hash_password("password123").unwrap();
        let h2 = hash_password("password123").unwrap();

        assert_ne!(h1, h2);
    }

    #[test]
    fn test_policy_rejects_short() {
        assert!(check_policy("short1").is_err());
    }

    #[test]
    fn test_policy_rejects_no_digit() {
        assert!(check_policy("passwordonly").is_err());
    }

    #[test]
    fn test_policy_rejects_no_letter() {
        assert!(check_policy("12345678").is_err());
    }

    #[test]
    fn test_policy_accepts_valid() {
        assert!(check_policy("password123").is_ok());
    }
}
