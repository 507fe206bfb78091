//! Byte-level cipher seams. Implementors turn plaintext bytes into ciphertext
//! bytes and back; nothing here knows about markers or documents.

use thiserror::Error;

use super::age_cipher::KeyError;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(#[from] age::EncryptError),
    #[error("decryption failed: {0}")]
    Decrypt(#[from] age::DecryptError),
    #[error("cipher stream failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("decrypted payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("cipher has no usable key: {0}")]
    Key(#[from] KeyError),
    #[error("cipher backend failed: {0}")]
    Backend(String),
}

/// Encryption half of a cipher capability.
pub trait Encrypt {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Decryption half of a cipher capability.
///
/// Raw bytes and decoded text are separate operations so callers never have
/// to guess which representation comes back.
pub trait Decrypt {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;

    fn decrypt_text(&self, ciphertext: &[u8]) -> Result<String, CipherError> {
        Ok(String::from_utf8(self.decrypt(ciphertext)?)?)
    }
}

impl<T: Encrypt + ?Sized> Encrypt for &T {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        (**self).encrypt(plaintext)
    }
}

impl<T: Decrypt + ?Sized> Decrypt for &T {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        (**self).decrypt(ciphertext)
    }

    fn decrypt_text(&self, ciphertext: &[u8]) -> Result<String, CipherError> {
        (**self).decrypt_text(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::{CipherError, Decrypt};

    struct Reversed;

    impl Decrypt for Reversed {
        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
            Ok(ciphertext.iter().rev().copied().collect())
        }
    }

    #[test]
    fn decrypt_text_decodes_utf8() {
        let text = Reversed.decrypt_text(b"\"olleh\"").expect("valid utf-8");
        assert_eq!(text, "\"hello\"");
    }

    #[test]
    fn decrypt_text_rejects_invalid_utf8() {
        let err = Reversed.decrypt_text(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, CipherError::Utf8(_)));
    }
}
