//! Selective age encryption for JSON and YAML configuration documents.
//! Keys and structure stay readable; scalar values become `{age:<hex>}`
//! markers that any later decrypt pass with a matching identity can open.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod format;
pub mod session;
pub mod walk;

#[cfg(test)]
mod testing;

use serde_json::Value;

pub use codec::{decode_value, encode_value, is_marker, CodecError};
pub use config::{transform_file, FileOptions, TextEncoding};
pub use crypto::{generate_identity, AgeDecrypter, AgeEncrypter, CipherError, Decrypt, Encrypt, KeyError};
pub use error::{Error, Result};
pub use format::{ConfigFormat, FormatError, FormatOptions, JsonHook, JsonOptions, YamlOptions};
pub use session::{
    decrypt_config_with, encrypt_config_with, DecryptOptions, EncryptOptions, PathOptions, Session,
};
pub use walk::{Inclusion, InclusionPolicy, PathRules, WalkError};

/// Encrypts a parsed document with the keys named in `options`.
pub fn encrypt_config(config: Value, options: &EncryptOptions) -> Result<Value> {
    Session::new().encrypt_config(config, options)
}

/// Decrypts a parsed document with the identity named in `options`.
pub fn decrypt_config(config: Value, options: &DecryptOptions) -> Result<Value> {
    Session::new().decrypt_config(config, options)
}

/// Encrypts the document at `file.file_path`, rewriting it when `file.overwrite` is set.
pub fn encrypt_config_file(file: &FileOptions, options: &EncryptOptions) -> Result<Value> {
    Session::new().encrypt_config_file(file, options)
}

/// Decrypts the document at `file.file_path`, rewriting it when `file.overwrite` is set.
pub fn decrypt_config_file(file: &FileOptions, options: &DecryptOptions) -> Result<Value> {
    Session::new().decrypt_config_file(file, options)
}
