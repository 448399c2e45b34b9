//! Secret material: generation, hashing, verification, fingerprints.
//!
//! Plaintext secrets (master keys, database passwords, API key secrets) are
//! produced here and handed to the caller exactly once. Everything persisted
//! is an argon2 hash or a sha256 fingerprint. Nothing in this module logs.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Master key prefix length kept alongside the hash for O(1) lookup.
pub const MASTER_KEY_PREFIX_LEN: usize = 12;

const MASTER_KEY_TAG: &str = "mk_";
const API_KEY_TAG: &str = "ak_";
const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("hashing failed")]
    Hash,
}

/// `mk_` + 40 base64url chars (30 random bytes).
pub fn generate_master_key() -> String {
    let mut bytes = [0u8; 30];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", MASTER_KEY_TAG, general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// First [`MASTER_KEY_PREFIX_LEN`] chars of the key body. `None` when the
/// presented value is not even shaped like a master key, so callers can fail
/// authentication without touching the store.
pub fn master_key_prefix(key: &str) -> Option<&str> {
    let body = key.strip_prefix(MASTER_KEY_TAG)?;
    if body.len() < MASTER_KEY_PREFIX_LEN {
        return None;
    }
    Some(&body[..MASTER_KEY_PREFIX_LEN])
}

/// `ak_` + 43 base64url chars (32 random bytes).
pub fn generate_api_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", API_KEY_TAG, general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Database role password: 32 random bytes, base64url.
pub fn generate_db_password() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Database role name: `u_` + 12 lowercase alphanumerics.
pub fn generate_db_username() -> String {
    format!("u_{}", random_lower_alnum(12))
}

/// Public application id: `app_` + 10 lowercase alphanumerics.
pub fn generate_app_id() -> String {
    format!("app_{}", random_lower_alnum(10))
}

fn random_lower_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..LOWER_ALNUM.len());
            LOWER_ALNUM[idx] as char
        })
        .collect()
}

/// Salted argon2id hash of any secret string.
pub fn hash_secret(secret: &str) -> Result<String, SecretError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|_| SecretError::Hash)?;
    Ok(hash.to_string())
}

/// Constant-shape verification. Malformed stored hashes verify as false
/// rather than erroring, so authentication failures stay uniform.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Truncated sha256 hex of a secret. Safe to store, display, and log.
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let hash_str = format!("{:x}", hasher.finalize());
    hash_str[..16].to_string()
}
