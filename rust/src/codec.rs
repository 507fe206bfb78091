//! Marker codec: one JSON value ⇄ one `{age:<hex>}` string.
//!
//! The value is serialized to JSON before encryption, so a single marker can
//! carry a number, a boolean or a whole subtree and still decode to the same
//! typed value.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{CipherError, Decrypt, Encrypt};

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{age:(.*)\}$").expect("marker pattern is valid"));

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("value is not an encrypted marker")]
    NotAMarker,
    #[error("marker payload is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("marker cipher failure: {0}")]
    Cipher(#[from] CipherError),
    #[error("decrypted payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("value could not be serialized for encryption: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Returns true when `value` has the `{age:<hex>}` marker shape.
pub fn is_marker(value: &str) -> bool {
    MARKER.is_match(value)
}

/// Encrypts `value` and wraps the hex ciphertext as a marker string.
pub fn encode_value(value: &Value, cipher: &dyn Encrypt) -> Result<String, CodecError> {
    let plaintext = Zeroizing::new(serde_json::to_vec(value).map_err(CodecError::Encode)?);
    let ciphertext = cipher.encrypt(&plaintext)?;
    Ok(format!("{{age:{}}}", hex::encode(ciphertext)))
}

/// Decrypts a marker string back into the value it was built from.
pub fn decode_value(marker: &str, cipher: &dyn Decrypt) -> Result<Value, CodecError> {
    let payload = MARKER
        .captures(marker)
        .and_then(|caps| caps.get(1))
        .ok_or(CodecError::NotAMarker)?
        .as_str();
    let ciphertext = hex::decode(payload)?;
    let plaintext = Zeroizing::new(cipher.decrypt_text(&ciphertext)?);
    serde_json::from_str(&plaintext).map_err(CodecError::Json)
}
