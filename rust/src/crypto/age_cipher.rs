//! age (x25519) backend for the cipher seams.
//! Encrypters hold public recipients, decrypters hold secret identities, and
//! both are resolved once per top-level call before any node is visited.

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use age::secrecy::ExposeSecret;
use age::x25519;
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::{CipherError, Decrypt, Encrypt};

const IDENTITY_PREFIX: &str = "AGE-SECRET-KEY-";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid age identity: {0}")]
    InvalidIdentity(&'static str),
    #[error("invalid age recipient: {0}")]
    InvalidRecipient(&'static str),
    #[error("no recipient or identity available for encryption")]
    NoRecipients,
    #[error("no identity available for decryption")]
    NoIdentities,
    #[error("key source unreadable: {0}")]
    KeySourceUnreadable(String),
}

fn parse_identity(identity: &str) -> Result<x25519::Identity, KeyError> {
    x25519::Identity::from_str(identity.trim()).map_err(KeyError::InvalidIdentity)
}

fn parse_recipient(recipient: &str) -> Result<x25519::Recipient, KeyError> {
    x25519::Recipient::from_str(recipient.trim()).map_err(KeyError::InvalidRecipient)
}

/// Returns the public recipient string matching a secret identity.
pub fn recipient_for(identity: &str) -> Result<String, KeyError> {
    Ok(parse_identity(identity)?.to_public().to_string())
}

/// A freshly generated identity and its recipient.
pub struct GeneratedIdentity {
    pub identity: Zeroizing<String>,
    pub recipient: String,
}

impl fmt::Debug for GeneratedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedIdentity")
            .field("identity", &"<redacted>")
            .field("recipient", &self.recipient)
            .finish()
    }
}

pub fn generate_identity() -> GeneratedIdentity {
    let identity = x25519::Identity::generate();
    let recipient = identity.to_public().to_string();
    GeneratedIdentity {
        identity: Zeroizing::new(identity.to_string().expose_secret().to_string()),
        recipient,
    }
}

/// Reads an identity string from an environment variable.
pub fn identity_from_env_var(var: &str) -> Result<Zeroizing<String>, KeyError> {
    let value = Zeroizing::new(
        std::env::var(var).map_err(|e| KeyError::KeySourceUnreadable(format!("{var}: {e}")))?,
    );
    parse_identity(&value)?;
    Ok(Zeroizing::new(value.trim().to_string()))
}

/// Reads the first identity from an age key file. Blank lines and `#`
/// comments (as written by `age-keygen`) are skipped.
pub fn identity_from_file(path: &Path) -> Result<Zeroizing<String>, KeyError> {
    let content = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
        KeyError::KeySourceUnreadable(format!("{}: {e}", path.display()))
    })?);
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(IDENTITY_PREFIX))
        .ok_or_else(|| {
            KeyError::KeySourceUnreadable(format!("{}: no identity found", path.display()))
        })?;
    parse_identity(line)?;
    Ok(Zeroizing::new(line.to_string()))
}

/// Encrypts to every configured x25519 recipient.
#[derive(Default)]
pub struct AgeEncrypter {
    recipients: Vec<x25519::Recipient>,
}

impl AgeEncrypter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recipient(&mut self, recipient: &str) -> Result<(), KeyError> {
        self.recipients.push(parse_recipient(recipient)?);
        Ok(())
    }

    /// Adds the public half of a secret identity as a recipient.
    pub fn add_identity(&mut self, identity: &str) -> Result<(), KeyError> {
        self.recipients.push(parse_identity(identity)?.to_public());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl fmt::Debug for AgeEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeEncrypter")
            .field("recipients", &self.recipients.len())
            .finish()
    }
}

impl Encrypt for AgeEncrypter {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if self.recipients.is_empty() {
            return Err(KeyError::NoRecipients.into());
        }
        let encryptor = age::Encryptor::with_recipients(
            self.recipients.iter().map(|r| r as &dyn age::Recipient),
        )?;
        let mut ciphertext = Vec::with_capacity(plaintext.len() + 256);
        let mut writer = encryptor.wrap_output(&mut ciphertext)?;
        writer.write_all(plaintext)?;
        writer.finish()?;
        Ok(ciphertext)
    }
}

/// Decrypts with any of the configured x25519 identities.
#[derive(Default)]
pub struct AgeDecrypter {
    identities: Vec<x25519::Identity>,
}

impl AgeDecrypter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_identity(&mut self, identity: &str) -> Result<(), KeyError> {
        self.identities.push(parse_identity(identity)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl fmt::Debug for AgeDecrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeDecrypter")
            .field("identities", &self.identities.len())
            .finish()
    }
}

impl Decrypt for AgeDecrypter {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if self.identities.is_empty() {
            return Err(KeyError::NoIdentities.into());
        }
        let decryptor = age::Decryptor::new(ciphertext)?;
        let mut reader = decryptor.decrypt(self.identities.iter().map(|i| i as &dyn age::Identity))?;
        let mut plaintext = Vec::new();
        reader.read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }
}
