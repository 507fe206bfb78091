//! Shared test doubles.

use serde_json::Value;

use crate::crypto::{generate_identity, AgeDecrypter, AgeEncrypter, CipherError, Decrypt, Encrypt};

/// Flips every byte; enough to exercise markers without real keys.
pub(crate) struct Inverted;

impl Encrypt for Inverted {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.iter().map(|b| !b).collect())
    }
}

impl Decrypt for Inverted {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(ciphertext.iter().map(|b| !b).collect())
    }
}

/// Generates a fresh identity and the matching encrypter/decrypter pair.
pub(crate) fn age_pair() -> (AgeEncrypter, AgeDecrypter) {
    let generated = generate_identity();
    let mut encrypter = AgeEncrypter::new();
    encrypter.add_recipient(&generated.recipient).expect("generated recipient parses");
    let mut decrypter = AgeDecrypter::new();
    decrypter.add_identity(&generated.identity).expect("generated identity parses");
    (encrypter, decrypter)
}

/// Collects every scalar leaf of a tree, depth first.
pub(crate) fn leaves(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(leaves).collect(),
        Value::Object(map) => map.values().flat_map(leaves).collect(),
        scalar => vec![scalar],
    }
}
