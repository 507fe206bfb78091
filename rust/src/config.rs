//! File pipeline for configuration documents. A file is read, parsed, run
//! through one walk and, when asked, written back in place. The transformed
//! tree is returned either way so callers can use it without re-reading.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{self, ConfigFormat, FormatOptions, JsonOptions, YamlOptions};

/// Text encoding used to read and rewrite configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
    Utf16Le,
}

impl TextEncoding {
    pub fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "utf-16 input has an odd number of bytes",
                    ));
                }
                let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
                char::decode_utf16(units)
                    .collect::<std::result::Result<String, _>>()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
        }
    }

    pub fn encode(self, text: &str) -> io::Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("character {c:?} cannot be written as latin-1"),
                        )
                    })
                })
                .collect(),
            TextEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        }
    }
}

/// Where a configuration document lives and how to read and write it.
#[derive(Debug, Clone)]
pub struct FileOptions {
    pub file_path: PathBuf,
    /// Overrides inference from the file name.
    pub format: Option<ConfigFormat>,
    /// Write the transformed document back to `file_path`.
    pub overwrite: bool,
    pub encoding: TextEncoding,
    pub format_options: FormatOptions,
}

impl FileOptions {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            format: None,
            overwrite: false,
            encoding: TextEncoding::default(),
            format_options: FormatOptions::default(),
        }
    }

    pub fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_json(mut self, json: JsonOptions) -> Self {
        self.format_options.json = json;
        self
    }

    pub fn with_yaml(mut self, yaml: YamlOptions) -> Self {
        self.format_options.yaml = yaml;
        self
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Replaces `path` with `contents` via a temporary file in the same
/// directory, keeping the original permissions.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let original_perms = fs::metadata(path).ok().map(|m| m.permissions());
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    if let Some(perms) = original_perms {
        tmp.as_file().set_permissions(perms)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reads the document at `options.file_path`, applies `transform` and, when
/// `options.overwrite` is set, atomically rewrites the file with the result.
pub fn transform_file<F>(options: &FileOptions, transform: F) -> Result<Value>
where
    F: FnOnce(Value) -> Result<Value>,
{
    let path = options.file_path.as_path();
    let bytes = fs::read(path).map_err(io_error(path))?;
    let text = options.encoding.decode(bytes).map_err(io_error(path))?;
    let format = ConfigFormat::infer(path, options.format)?;
    debug!(path = %path.display(), %format, overwrite = options.overwrite, "transforming config file");

    let parsed = format::parse(&text, format, &options.format_options)?;
    let transformed = transform(parsed)?;

    if options.overwrite {
        let serialized = format::serialize(&transformed, format, &options.format_options)?;
        let encoded = options.encoding.encode(&serialized).map_err(io_error(path))?;
        atomic_write(path, &encoded).map_err(io_error(path))?;
        debug!(path = %path.display(), bytes = encoded.len(), "rewrote config file");
    }

    Ok(transformed)
}
