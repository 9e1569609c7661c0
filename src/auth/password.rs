use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use tokio::task::spawn_blocking;
use tracing::error;

/// Argon2 hash with a fresh random salt per call.
///
/// Hashing is CPU-bound, so it runs on the blocking pool rather than a
/// request-serving worker thread.
pub async fn hash(plain: String) -> anyhow::Result<String> {
    spawn_blocking(move || hash_blocking(&plain)).await?
}

/// Constant-time verification against a stored PHC hash string.
pub async fn verify(plain: String, hash: String) -> anyhow::Result<bool> {
    spawn_blocking(move || verify_blocking(&plain, &hash)).await?
}

fn hash_blocking(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_blocking(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
