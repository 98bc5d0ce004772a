//! Field obfuscation and login secret hashing.
//!
//! This module provides:
//! - XOR/base64 obfuscation of record fields (not encryption)
//! - Argon2id hashing of account passwords

pub mod obfuscation;
pub mod secret;

pub use obfuscation::{generate_salt, generate_user_key, obscure, reveal};
pub use secret::{hash_secret, verify_secret};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Password hashing failed: {0}")]
    HashFailed(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
