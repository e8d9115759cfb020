//! Password hashing
//! Mission: One-way salted hashes, never stored or compared in plaintext

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, password_hash: &str) -> Result<bool>;
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).context("Failed to hash password")
    }

    fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        verify(password, password_hash).context("Failed to verify password")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = BcryptHasher::new(4);
        let hashed = hasher.hash("secret1").unwrap();

        assert_ne!(hashed, "secret1");
        assert!(hasher.verify("secret1", &hashed).unwrap());
        assert!(!hasher.verify("secret2", &hashed).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = BcryptHasher::new(4);
        assert_ne!(hasher.hash("secret1").unwrap(), hasher.hash("secret1").unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        let hasher = BcryptHasher::new(4);
        assert!(hasher.verify("secret1", "not-a-bcrypt-hash").is_err());
    }
}
