//! bcrypt password hashing on the blocking thread pool.
//!
//! Accepts `$2a$`/`$2b$`/`$2y$` hashes, so accounts created by earlier
//! tooling keep working.

/// Hashing failures.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// bcrypt rejected the input or the stored hash is malformed.
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    /// The blocking worker did not complete.
    #[error("password worker failed: {0}")]
    Worker(String),
}

/// Hash a password with the given bcrypt cost.
///
/// # Errors
///
/// Returns [`PasswordError`] for an out-of-range cost or a worker failure.
pub async fn hash_password(password: String, cost: u32) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| PasswordError::Worker(e.to_string()))?
        .map_err(PasswordError::from)
}

/// Check a password against a stored hash.
///
/// # Errors
///
/// Returns [`PasswordError::Bcrypt`] when the stored hash is malformed.
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| PasswordError::Worker(e.to_string()))?
        .map_err(PasswordError::from)
}
