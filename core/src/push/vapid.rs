//! Application-server (VAPID) key decoding.
//!
//! The key is distributed as unpadded base64url text, while the push platform
//! wants raw bytes. Decoding restores the padding, maps the URL-safe alphabet
//! back to the standard one and decodes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{DashError, Result};

/// Length of an uncompressed P-256 public key (0x04 || X || Y).
pub const P256_PUBLIC_KEY_LEN: usize = 65;

/// Decode a base64url application-server key into raw bytes.
pub fn decode_application_server_key(key: &str) -> Result<Vec<u8>> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(DashError::MissingApplicationServerKey);
    }

    let padding = (4 - trimmed.len() % 4) % 4;
    let mut standard: String = trimmed
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    standard.extend(std::iter::repeat('=').take(padding));

    let bytes = STANDARD
        .decode(standard.as_bytes())
        .map_err(|e| DashError::InvalidKey(e.to_string()))?;

    if bytes.len() != P256_PUBLIC_KEY_LEN {
        tracing::warn!(
            "application-server key decodes to {} bytes, expected {}",
            bytes.len(),
            P256_PUBLIC_KEY_LEN
        );
    }
    Ok(bytes)
}
