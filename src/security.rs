use argon2::{Argon2, PasswordHasher as _, PasswordVerifier as _};
use password_hash::{PasswordHash, SaltString};

use crate::error::{AuthError, AuthResult};

/// Hashing collaborator used by the core. Digests are opaque to callers.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AuthResult<String>;
    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// Argon2id with the crate defaults, digests stored as PHC strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> { hash_password(password) }
    fn verify(&self, password: &str, digest: &str) -> bool { verify_password(digest, password) }
}

pub fn hash_password(password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Unparseable digests never verify.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = Argon2Hasher;
        let digest = h.hash("b4l0u").unwrap();
        assert!(digest.starts_with("$argon2"));
        assert!(h.verify("b4l0u", &digest));
        assert!(!h.verify("t4rt1fl3tt3", &digest));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
    }

    #[test]
    fn garbage_digest_does_not_verify() {
        assert!(!verify_password("not-a-phc-string", "pw"));
        assert!(!verify_password("", ""));
    }
}
