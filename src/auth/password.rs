use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash as Argon2Hash, PasswordHasher as Argon2Hasher,
        PasswordVerifier, SaltString,
    },
    Argon2,
};

use crate::error::{AppError, AuthError};

/// One-way password hashing with Argon2id.
///
/// Digests are self-describing PHC strings (algorithm, cost parameters
/// and salt are all encoded in the output), so verification needs no
/// out-of-band configuration.
#[derive(Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a password with a fresh random salt.
    ///
    /// Argon2 hashing is CPU-bound, so it runs on the blocking thread
    /// pool rather than starving the async runtime.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|digest| digest.to_string())
        })
        .await
        .map_err(|e| AppError::InternalError(format!("password hash task panicked: {}", e)))?
        .map_err(|e| AuthError::Encoding(format!("password hashing failed: {}", e)).into())
    }

    /// Verify a password against a stored digest.
    ///
    /// Returns `false` for a wrong password and for a malformed digest;
    /// it never errors.
    pub async fn verify(&self, password: &str, digest: &str) -> bool {
        let password = password.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = match Argon2Hash::new(&digest) {
                Ok(parsed) => parsed,
                Err(_) => return false,
            };
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .unwrap_or(false)
    }
}

/// Minimum 8 characters with at least one uppercase letter, one
/// lowercase letter, one digit and one special character.
pub fn validate_password_strength(password: &str) -> bool {
    if password.chars().count() < 8 {
        return false;
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

    has_upper && has_lower && has_digit && has_special
}
