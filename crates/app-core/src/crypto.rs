//! Derives the cookie signing/encryption key from the configured session
//! secret.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use thiserror::Error;
use tower_cookies::Key;

const KEY_LEN: usize = 64;
const ITERATIONS: u32 = 100_000;
const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Stretches an arbitrary-length secret into the 64 bytes `cookie::Key`
/// requires. The same secret and salt always yield the same key, so cookies
/// survive restarts.
pub fn derive_cookie_key(secret: &str, salt: &str) -> Result<Key, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidInput("session secret cannot be empty".to_string()));
    }

    if secret.len() < MIN_SECRET_LEN {
        tracing::warn!(min_len = MIN_SECRET_LEN, "Session secret is shorter than recommended");
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha512>(secret.as_bytes(), salt.as_bytes(), ITERATIONS, &mut key);

    Ok(Key::from(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let first = derive_cookie_key("a-very-long-session-secret-value-0001", "salt").unwrap();
        let second = derive_cookie_key("a-very-long-session-secret-value-0001", "salt").unwrap();

        assert_eq!(first.master(), second.master());
    }

    #[test]
    fn test_derive_depends_on_secret_and_salt() {
        let base = derive_cookie_key("a-very-long-session-secret-value-0001", "salt").unwrap();
        let other_secret = derive_cookie_key("a-very-long-session-secret-value-0002", "salt").unwrap();
        let other_salt = derive_cookie_key("a-very-long-session-secret-value-0001", "pepper").unwrap();

        assert_ne!(base.master(), other_secret.master());
        assert_ne!(base.master(), other_salt.master());
    }

    #[test]
    fn test_short_secret_is_accepted() {
        assert!(derive_cookie_key("keyboard cat", "salt").is_ok());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(derive_cookie_key("", "salt"), Err(CryptoError::InvalidInput(_))));
    }
}
