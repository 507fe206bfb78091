//! Cipher capabilities used by the value codec. The walk only sees the
//! `Encrypt`/`Decrypt` traits; `age_cipher` provides the x25519 backend and
//! the identity key sources.

pub mod age_cipher;
pub mod cipher;

pub use age_cipher::{
    generate_identity, recipient_for, AgeDecrypter, AgeEncrypter, GeneratedIdentity, KeyError,
};
pub use cipher::{CipherError, Decrypt, Encrypt};
