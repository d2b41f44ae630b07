//! Secret hashing

mod hasher;

pub use hasher::{Argon2SecretHasher, HashCost, SecretHasher};
