//! Session token generation.
//!
//! Tokens are URL-safe base64 of a sha-256 digest over the configured
//! secret, 32 bytes of OS randomness, and a v7 UUID. The randomness makes
//! tokens unguessable on its own; the secret scopes them to one deployment
//! so tokens cannot be precomputed offline, and the UUID's embedded
//! timestamp guarantees uniqueness even under a misbehaving RNG.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a fresh opaque session token.
pub fn generate(secret: &SecretString) -> String {
    let mut random = [0u8; 32];
    rand::rng().fill_bytes(&mut random);

    let mut hasher = Sha256::new();
    hasher.update(secret.expose_secret().as_bytes());
    hasher.update(random);
    hasher.update(Uuid::now_v7().as_bytes());

    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn secret() -> SecretString {
        SecretString::new("test-secret".to_string().into())
    }

    #[test]
    fn test_tokens_are_unique() {
        let secret = secret();
        let tokens: HashSet<String> = (0..1000).map(|_| generate(&secret)).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_tokens_are_url_safe() {
        let token = generate(&secret());
        // 32-byte digest, unpadded base64.
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
