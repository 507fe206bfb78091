//! Top-level entry points. A `Session` owns the default identity used when a
//! call does not name its own key, so independent sessions never see each
//! other's keys. Ciphers are resolved once per call, before the walk starts.

use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{self, FileOptions};
use crate::crypto::age_cipher::{identity_from_env_var, identity_from_file};
use crate::crypto::{AgeDecrypter, AgeEncrypter, Decrypt, Encrypt};
use crate::error::Result;
use crate::walk::{self, InclusionPolicy};

/// Path-based overrides for the encrypt walk.
#[derive(Default)]
pub struct PathOptions {
    pub include: Option<Box<dyn InclusionPolicy>>,
}

impl fmt::Debug for PathOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathOptions")
            .field("include", &self.include.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct EncryptOptions {
    /// Secret identity whose public half becomes a recipient.
    pub identity: Option<String>,
    /// Public `age1…` recipient.
    pub recipient: Option<String>,
    pub paths: PathOptions,
}

impl EncryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_policy(mut self, policy: impl InclusionPolicy + 'static) -> Self {
        self.paths.include = Some(Box::new(policy));
        self
    }
}

impl fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("identity", &self.identity.as_ref().map(|_| "<redacted>"))
            .field("recipient", &self.recipient)
            .field("paths", &self.paths)
            .finish()
    }
}

#[derive(Default)]
pub struct DecryptOptions {
    pub identity: Option<String>,
}

impl DecryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

impl fmt::Debug for DecryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptOptions")
            .field("identity", &self.identity.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Holds an optional default identity for every call made through it.
#[derive(Default)]
pub struct Session {
    default_identity: Option<Zeroizing<String>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("default_identity", &self.default_identity.is_some())
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.use_identity(identity);
        session
    }

    /// Builds a session whose default identity comes from an environment variable.
    pub fn from_env_var(var: &str) -> Result<Self> {
        Ok(Self {
            default_identity: Some(identity_from_env_var(var)?),
        })
    }

    /// Builds a session whose default identity is the first key in an age key file.
    pub fn from_identity_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            default_identity: Some(identity_from_file(path.as_ref())?),
        })
    }

    /// Sets the identity used when a call supplies neither identity nor recipient.
    pub fn use_identity(&mut self, identity: impl Into<String>) {
        self.default_identity = Some(Zeroizing::new(identity.into()));
    }

    pub fn clear_identity(&mut self) {
        self.default_identity = None;
    }

    pub fn has_identity(&self) -> bool {
        self.default_identity.is_some()
    }

    /// Resolves the encrypter for one call: an explicit recipient and an
    /// explicit identity are both used; the default identity only fills in
    /// when neither was given. Without any key the encrypter is empty and
    /// fails on the first value it has to seal.
    pub fn encrypter(&self, options: &EncryptOptions) -> Result<AgeEncrypter> {
        let mut encrypter = AgeEncrypter::new();
        if let Some(recipient) = &options.recipient {
            encrypter.add_recipient(recipient)?;
        }
        match (&options.identity, &self.default_identity) {
            (Some(identity), _) => encrypter.add_identity(identity)?,
            (None, Some(default)) if options.recipient.is_none() => encrypter.add_identity(default)?,
            _ => {}
        }
        if encrypter.is_empty() {
            debug!("no encryption key configured");
        }
        Ok(encrypter)
    }

    /// Resolves the decrypter for one call: the explicit identity, else the
    /// default. Without either the decrypter is empty and fails on the first
    /// marker it meets.
    pub fn decrypter(&self, options: &DecryptOptions) -> Result<AgeDecrypter> {
        let mut decrypter = AgeDecrypter::new();
        match (&options.identity, &self.default_identity) {
            (Some(identity), _) => decrypter.add_identity(identity)?,
            (None, Some(default)) => decrypter.add_identity(default)?,
            (None, None) => debug!("no decryption identity configured"),
        }
        Ok(decrypter)
    }

    pub fn encrypt_config(&self, config: Value, options: &EncryptOptions) -> Result<Value> {
        let encrypter = self.encrypter(options)?;
        encrypt_config_with(config, &encrypter, options.paths.include.as_deref())
    }

    pub fn decrypt_config(&self, config: Value, options: &DecryptOptions) -> Result<Value> {
        let decrypter = self.decrypter(options)?;
        decrypt_config_with(config, &decrypter)
    }

    pub fn encrypt_config_file(&self, file: &FileOptions, options: &EncryptOptions) -> Result<Value> {
        config::transform_file(file, |tree| self.encrypt_config(tree, options))
    }

    pub fn decrypt_config_file(&self, file: &FileOptions, options: &DecryptOptions) -> Result<Value> {
        config::transform_file(file, |tree| self.decrypt_config(tree, options))
    }
}

/// Encrypts with a caller-supplied cipher instead of an age key.
pub fn encrypt_config_with(
    config: Value,
    cipher: &dyn Encrypt,
    policy: Option<&dyn InclusionPolicy>,
) -> Result<Value> {
    Ok(walk::encrypt_tree(config, cipher, policy)?)
}

/// Decrypts with a caller-supplied cipher instead of an age key.
pub fn decrypt_config_with(config: Value, cipher: &dyn Decrypt) -> Result<Value> {
    Ok(walk::decrypt_tree(config, cipher)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{is_marker, CodecError};
    use crate::crypto::{generate_identity, CipherError, KeyError};
    use crate::error::Error;
    use crate::testing::leaves;
    use crate::walk::{Inclusion, PathRules, WalkError};
    use serde_json::json;
    use std::fs;
    use tempfile::NamedTempFile;

    fn original() -> Value {
        json!({
            "foo": 1,
            "bar": "bar",
            "baz": {
                "bat": {
                    "cat": [
                        {"url": "http://you-wont-believe"},
                        {"url": "https://what-this-points-to"}
                    ]
                }
            }
        })
    }

    fn marked(value: &Value) -> bool {
        value.as_str().is_some_and(is_marker)
    }

    #[test]
    fn default_identity_encrypts_and_decrypts() {
        let generated = generate_identity();
        let mut session = Session::new();
        session.use_identity(generated.identity.as_str());

        let encrypted = session.encrypt_config(original(), &EncryptOptions::new()).unwrap();
        assert!(marked(&encrypted["foo"]));
        assert!(marked(&encrypted["baz"]["bat"]["cat"][0]["url"]));

        let decrypted = session.decrypt_config(encrypted, &DecryptOptions::new()).unwrap();
        assert_eq!(decrypted, original());
    }

    #[test]
    fn explicit_recipient_and_identity() {
        let generated = generate_identity();
        let session = Session::new();

        let options = EncryptOptions::new().with_recipient(generated.recipient.clone());
        let encrypted = session.encrypt_config(original(), &options).unwrap();
        assert!(leaves(&encrypted).iter().all(|leaf| marked(leaf)));

        let options = DecryptOptions::new().with_identity(generated.identity.as_str());
        assert_eq!(session.decrypt_config(encrypted, &options).unwrap(), original());
    }

    #[test]
    fn explicit_identity_overrides_default() {
        let default = generate_identity();
        let explicit = generate_identity();
        let session = Session::with_identity(default.identity.as_str());

        let options = EncryptOptions::new().with_identity(explicit.identity.as_str());
        let encrypted = session.encrypt_config(json!({"k": "v"}), &options).unwrap();

        let err = session
            .decrypt_config(encrypted.clone(), &DecryptOptions::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Walk(WalkError {
                source: CodecError::Cipher(_),
                ..
            })
        ));
        let options = DecryptOptions::new().with_identity(explicit.identity.as_str());
        assert_eq!(session.decrypt_config(encrypted, &options).unwrap(), json!({"k": "v"}));
    }

    #[test]
    fn explicit_recipient_skips_default_identity() {
        let default = generate_identity();
        let other = generate_identity();
        let session = Session::with_identity(default.identity.as_str());

        let options = EncryptOptions::new().with_recipient(other.recipient.clone());
        let encrypted = session.encrypt_config(json!({"k": 1}), &options).unwrap();
        assert!(session.decrypt_config(encrypted, &DecryptOptions::new()).is_err());
    }

    #[test]
    fn missing_keys_only_fail_when_a_value_needs_them() {
        let session = Session::new();
        let plain = json!({"a": "plain", "n": 1, "nested": [true, null]});
        assert_eq!(
            session.decrypt_config(plain.clone(), &DecryptOptions::new()).unwrap(),
            plain
        );
        assert_eq!(
            session.encrypt_config(json!({"empty": {}, "list": []}), &EncryptOptions::new()).unwrap(),
            json!({"empty": {}, "list": []})
        );
        let rules = EncryptOptions::new().with_policy(PathRules::new().exclude(""));
        assert_eq!(session.encrypt_config(plain.clone(), &rules).unwrap(), plain);

        let err = session.encrypt_config(plain, &EncryptOptions::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Walk(WalkError {
                source: CodecError::Cipher(CipherError::Key(KeyError::NoRecipients)),
                ..
            })
        ));

        let generated = generate_identity();
        let options = EncryptOptions::new().with_recipient(generated.recipient.clone());
        let sealed = session.encrypt_config(json!({"db": {"pw": "x"}}), &options).unwrap();
        match session.decrypt_config(sealed, &DecryptOptions::new()).unwrap_err() {
            Error::Walk(walk) => {
                assert_eq!(walk.path, "db.pw");
                assert!(matches!(
                    walk.source,
                    CodecError::Cipher(CipherError::Key(KeyError::NoIdentities))
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_keys_are_cipher_config_errors() {
        let session = Session::new();
        let options = DecryptOptions::new().with_identity("AGE-SECRET-KEY-garbage");
        let err = session.decrypt_config(json!({"a": 1}), &options).unwrap_err();
        assert!(matches!(err, Error::CipherConfig(KeyError::InvalidIdentity(_))));

        let options = EncryptOptions::new().with_recipient("age1nope");
        let err = session.encrypt_config(json!({}), &options).unwrap_err();
        assert!(matches!(err, Error::CipherConfig(KeyError::InvalidRecipient(_))));
    }

    #[test]
    fn sessions_do_not_share_identities() {
        let first = Session::with_identity(generate_identity().identity.as_str());
        let mut second = Session::new();
        assert!(first.has_identity());
        assert!(!second.has_identity());

        second.use_identity(generate_identity().identity.as_str());
        let encrypted = first.encrypt_config(json!({"a": "b"}), &EncryptOptions::new()).unwrap();
        assert!(second.decrypt_config(encrypted, &DecryptOptions::new()).is_err());

        second.clear_identity();
        assert!(!second.has_identity());
    }

    #[test]
    fn policy_travels_with_options() {
        let session = Session::with_identity(generate_identity().identity.as_str());
        let options = EncryptOptions::new().with_policy(|path: &[String]| {
            if path == ["baz", "bat"] {
                Inclusion::Include
            } else {
                Inclusion::Undecided
            }
        });
        let tree = json!({"baz": {"bat": {"x": 1, "y": 2}}, "plain": true});
        let encrypted = session.encrypt_config(tree.clone(), &options).unwrap();
        assert!(marked(&encrypted["baz"]["bat"]));
        assert!(marked(&encrypted["plain"]));
        assert_eq!(session.decrypt_config(encrypted, &DecryptOptions::new()).unwrap(), tree);

        let options = EncryptOptions::new().with_policy(PathRules::new().exclude("plain"));
        let encrypted = session.encrypt_config(json!({"plain": true, "s": 1}), &options).unwrap();
        assert_eq!(encrypted["plain"], json!(true));
        assert!(marked(&encrypted["s"]));
    }

    #[test]
    fn garbage_marker_is_a_decode_error() {
        let session = Session::with_identity(generate_identity().identity.as_str());
        let err = session
            .decrypt_config(json!({"token": "{age:0badc0de}"}), &DecryptOptions::new())
            .unwrap_err();
        match err {
            Error::Walk(walk) => {
                assert_eq!(walk.path, "token");
                assert!(matches!(walk.source, CodecError::Cipher(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn identity_file_session() {
        let generated = generate_identity();
        let file = NamedTempFile::new().expect("temp file");
        fs::write(file.path(), format!("# public key: {}\n{}\n", generated.recipient, generated.identity.as_str()))
            .unwrap();

        let session = Session::from_identity_file(file.path()).expect("key file readable");
        let options = EncryptOptions::new().with_recipient(generated.recipient.clone());
        let encrypted = session.encrypt_config(json!([1, 2]), &options).unwrap();
        assert_eq!(
            session.decrypt_config(encrypted, &DecryptOptions::new()).unwrap(),
            json!([1, 2])
        );
    }

    #[test]
    fn debug_output_redacts_identities() {
        let generated = generate_identity();
        let session = Session::with_identity(generated.identity.as_str());
        let options = EncryptOptions::new().with_identity(generated.identity.as_str());
        assert!(!format!("{session:?}").contains(generated.identity.as_str()));
        assert!(!format!("{options:?}").contains(generated.identity.as_str()));
    }
}
