//! Crate-wide error type. Every failure aborts the whole call; there is no
//! partially transformed result.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::KeyError;
use crate::format::FormatError;
use crate::walk::WalkError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("config file `{}` could not be accessed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cipher configuration error: {0}")]
    CipherConfig(#[from] KeyError),
}
