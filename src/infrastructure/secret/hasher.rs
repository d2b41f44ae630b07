//! Secret hashing using Argon2id

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::Deserialize;
use std::fmt::Debug;

use crate::domain::DomainError;

/// One-way hashing for API keys and passwords
pub trait SecretHasher: Send + Sync + Debug {
    /// Hash a secret with a fresh random salt
    fn hash(&self, secret: &str) -> Result<String, DomainError>;

    /// Verify a secret against a stored hash
    ///
    /// Malformed hashes verify as `false`.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HashCost {
    /// Memory in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    /// Cheapest parameters Argon2 accepts, for tests
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

/// Argon2id-based secret hasher
#[derive(Clone)]
pub struct Argon2SecretHasher {
    argon2: Argon2<'static>,
    cost: HashCost,
}

impl Debug for Argon2SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2SecretHasher")
            .field("cost", &self.cost)
            .finish()
    }
}

impl Argon2SecretHasher {
    /// Create a hasher with the given cost
    pub fn new(cost: HashCost) -> Result<Self, DomainError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| DomainError::configuration(format!("Invalid Argon2 cost: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            cost,
        })
    }
}

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, secret: &str) -> Result<String, DomainError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| DomainError::internal(format!("Failed to hash secret: {}", e)))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };

        // Parameters come from the stored hash, so keys hashed under an older
        // cost keep verifying after the configured cost changes.
        self.argon2
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2SecretHasher {
        Argon2SecretHasher::new(HashCost::minimal()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let secret = "qk_3q2-7wEvQ_m0rT8dXzK1";

        let hash = hasher.hash(secret).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(secret, &hash));
        assert!(!hasher.verify("qk_wrong", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = hasher();
        let secret = "same-secret";

        let hash1 = hasher.hash(secret).unwrap();
        let hash2 = hasher.hash(secret).unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify(secret, &hash1));
        assert!(hasher.verify(secret, &hash2));
    }

    #[test]
    fn test_any_mutated_byte_fails() {
        let hasher = hasher();
        let secret = "qk_abcdefgh12345678";
        let hash = hasher.hash(secret).unwrap();

        for i in 0..secret.len() {
            let mut bytes = secret.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(!hasher.verify(&mutated, &hash), "mutation at {} verified", i);
        }
    }

    #[test]
    fn test_malformed_hash_fails_closed() {
        let hasher = hasher();

        assert!(!hasher.verify("secret", "invalid_hash_format"));
        assert!(!hasher.verify("secret", ""));
        assert!(!hasher.verify("secret", "$argon2id$v=19$m=8,t=1,p=1$"));
    }

    #[test]
    fn test_verifies_hash_made_under_other_cost() {
        let cheap = hasher();
        let other = Argon2SecretHasher::new(HashCost {
            memory_kib: 64,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();

        let hash = other.hash("secret").unwrap();
        assert!(cheap.verify("secret", &hash));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let result = Argon2SecretHasher::new(HashCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_shows_cost_only() {
        let debug = format!("{:?}", hasher());
        assert!(debug.contains("cost"));
    }
}
