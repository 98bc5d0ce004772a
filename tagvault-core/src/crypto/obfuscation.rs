//! Reversible field obfuscation for stored secrets and notes.
//!
//! **This is not encryption.** Each byte of the UTF-8 plaintext is XORed with
//! the per-user key and the per-record salt, each cycled on its own, and the
//! result is base64 encoded for storage. Both streams reach every byte, so a
//! new salt changes the whole ciphertext even for short secrets. Anyone holding the stored
//! user key can reverse it. It only keeps secrets from being readable at a
//! glance in the backing store and must never be presented as a security
//! boundary.
//!
//! - Empty plaintext obscures to an empty string
//! - An empty key and salt leave the bytes unchanged (base64 only)
//! - `reveal` never fails: undecodable input is returned unchanged

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use tracing::debug;

/// Length of generated salts and user keys, in characters
pub const TOKEN_LENGTH: usize = 26;

/// XOR `data` in place with `key` and `salt`, each repeated cyclically
fn xor_with_key(data: &mut [u8], key: &str, salt: &str) {
    for stream in [key.as_bytes(), salt.as_bytes()] {
        if stream.is_empty() {
            continue;
        }
        for (byte, k) in data.iter_mut().zip(stream.iter().cycle()) {
            *byte ^= k;
        }
    }
}

/// Obscure a plaintext field with the user key and record salt
pub fn obscure(plaintext: &str, key: &str, salt: &str) -> String {
    if plaintext.is_empty() {
        return String::new();
    }

    let mut bytes = plaintext.as_bytes().to_vec();
    xor_with_key(&mut bytes, key, salt);
    STANDARD.encode(bytes)
}

/// Recover the plaintext produced by [`obscure`].
///
/// Falls back to returning `ciphertext` untouched when it is not valid
/// base64 or does not decode to UTF-8 under this key, so legacy plaintext
/// values pass through.
pub fn reveal(ciphertext: &str, key: &str, salt: &str) -> String {
    if ciphertext.is_empty() {
        return String::new();
    }

    let mut bytes = match STANDARD.decode(ciphertext) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Stored field is not base64, treating as plaintext: {}", e);
            return ciphertext.to_string();
        }
    };
    xor_with_key(&mut bytes, key, salt);

    match String::from_utf8(bytes) {
        Ok(plaintext) => plaintext,
        Err(_) => {
            debug!("Revealed field is not UTF-8, treating as plaintext");
            ciphertext.to_string()
        }
    }
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a fresh per-record salt
pub fn generate_salt() -> String {
    random_token()
}

/// Generate a new per-user obfuscation key
pub fn generate_user_key() -> String {
    random_token()
}
