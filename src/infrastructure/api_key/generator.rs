//! API key generation
//!
//! Keys are a type prefix followed by base64url-encoded random bytes. The
//! lookup prefix stored alongside the hash is the type prefix plus the first
//! eight characters of the random part.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Characters of the random part included in the lookup prefix
pub const LOOKUP_CHARS: usize = 8;

/// Default type prefix for generated keys
pub const DEFAULT_TYPE_PREFIX: &str = "qk_";

/// A freshly generated key
#[derive(Clone)]
pub struct GeneratedApiKey {
    /// The full plaintext key, shown once at creation
    pub key: String,
    /// The lookup prefix
    pub prefix: String,
}

impl std::fmt::Debug for GeneratedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedApiKey")
            .field("key", &"[redacted]")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Generator for secure API keys
#[derive(Debug, Clone)]
pub struct ApiKeyGenerator {
    type_prefix: String,
    key_bytes: usize,
}

impl ApiKeyGenerator {
    pub fn new(type_prefix: impl Into<String>) -> Self {
        Self {
            type_prefix: type_prefix.into(),
            key_bytes: 32,
        }
    }

    /// Set the number of random bytes
    pub fn with_key_bytes(mut self, bytes: usize) -> Self {
        self.key_bytes = bytes;
        self
    }

    /// Generate a new API key
    pub fn generate(&self) -> GeneratedApiKey {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let encoded = URL_SAFE_NO_PAD.encode(&random_bytes);
        let key = format!("{}{}", self.type_prefix, encoded);
        let prefix = format!(
            "{}{}",
            self.type_prefix,
            &encoded[..LOOKUP_CHARS.min(encoded.len())]
        );

        GeneratedApiKey { key, prefix }
    }

    /// Lookup prefix of a presented key
    ///
    /// `None` when the key lacks the type prefix or is too short to carry a
    /// full lookup prefix; such keys can never resolve.
    pub fn extract_prefix(&self, key: &str) -> Option<String> {
        let random_part = key.strip_prefix(self.type_prefix.as_str())?;
        let lookup = random_part.get(..LOOKUP_CHARS)?;

        Some(format!("{}{}", self.type_prefix, lookup))
    }
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE_PREFIX)
    }
}
