//! Tree transformer. Both walks take a parsed document by value and rebuild
//! it with the same shape: object keys and their order, array order and
//! untouched scalars all survive. Only string leaves can carry a marker, so
//! the decrypt walk ignores every other scalar.
//!
//! Encryption is the default at leaves; an [`InclusionPolicy`] can force a
//! whole subtree into a single marker or keep it in plaintext.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::codec::{self, CodecError};
use crate::crypto::{Decrypt, Encrypt};

/// Per-path decision returned by an [`InclusionPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Encrypt the whole subtree at this path as one marker.
    Include,
    /// Leave the subtree at this path untouched.
    Exclude,
    /// No opinion; fall through to the default behaviour.
    Undecided,
}

impl From<Option<bool>> for Inclusion {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Inclusion::Include,
            Some(false) => Inclusion::Exclude,
            None => Inclusion::Undecided,
        }
    }
}

/// Decides, per node path, whether the encrypt walk should deviate from its
/// default. Array indices appear in the path as decimal strings.
pub trait InclusionPolicy {
    fn decide(&self, path: &[String]) -> Inclusion;
}

impl<F> InclusionPolicy for F
where
    F: Fn(&[String]) -> Inclusion,
{
    fn decide(&self, path: &[String]) -> Inclusion {
        self(path)
    }
}

/// Dotted path patterns (`db.password`, `servers.*.url`) where `*` matches
/// exactly one segment. Exclusions win over inclusions on the same node.
#[derive(Debug, Clone, Default)]
pub struct PathRules {
    include: Vec<Vec<String>>,
    exclude: Vec<Vec<String>>,
}

impl PathRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.include.push(split_pattern(pattern));
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude.push(split_pattern(pattern));
        self
    }
}

fn split_pattern(pattern: &str) -> Vec<String> {
    if pattern.is_empty() {
        return Vec::new();
    }
    pattern.split('.').map(str::to_string).collect()
}

fn pattern_matches(pattern: &[String], path: &[String]) -> bool {
    pattern.len() == path.len()
        && pattern
            .iter()
            .zip(path)
            .all(|(expected, actual)| expected == "*" || expected == actual)
}

impl InclusionPolicy for PathRules {
    fn decide(&self, path: &[String]) -> Inclusion {
        if self.exclude.iter().any(|p| pattern_matches(p, path)) {
            Inclusion::Exclude
        } else if self.include.iter().any(|p| pattern_matches(p, path)) {
            Inclusion::Include
        } else {
            Inclusion::Undecided
        }
    }
}

/// A codec failure together with the node it happened at.
#[derive(Debug, Error)]
#[error("cannot transform value at `{path}`: {source}")]
pub struct WalkError {
    pub path: String,
    #[source]
    pub source: CodecError,
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(".")
    }
}

struct EncryptWalk<'a> {
    cipher: &'a dyn Encrypt,
    policy: Option<&'a dyn InclusionPolicy>,
    path: Vec<String>,
    sealed: usize,
}

impl EncryptWalk<'_> {
    fn seal(&mut self, node: &Value) -> Result<Value, WalkError> {
        let marker = codec::encode_value(node, self.cipher).map_err(|source| WalkError {
            path: display_path(&self.path),
            source,
        })?;
        self.sealed += 1;
        Ok(Value::String(marker))
    }

    fn child(&mut self, segment: String, node: Value) -> Result<Value, WalkError> {
        self.path.push(segment);
        let result = self.visit(node);
        self.path.pop();
        result
    }

    fn visit(&mut self, node: Value) -> Result<Value, WalkError> {
        if let Some(policy) = self.policy {
            match policy.decide(&self.path) {
                Inclusion::Include => {
                    trace!(path = %display_path(&self.path), "policy included subtree");
                    return self.seal(&node);
                }
                Inclusion::Exclude => {
                    trace!(path = %display_path(&self.path), "policy excluded subtree");
                    return Ok(node);
                }
                Inclusion::Undecided => {}
            }
        }

        match node {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| self.child(idx.to_string(), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, item)| {
                    let item = self.child(key.clone(), item)?;
                    Ok::<_, WalkError>((key, item))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            scalar => self.seal(&scalar),
        }
    }
}

struct DecryptWalk<'a> {
    cipher: &'a dyn Decrypt,
    path: Vec<String>,
    opened: usize,
}

impl DecryptWalk<'_> {
    fn child(&mut self, segment: String, node: Value) -> Result<Value, WalkError> {
        self.path.push(segment);
        let result = self.visit(node);
        self.path.pop();
        result
    }

    fn visit(&mut self, node: Value) -> Result<Value, WalkError> {
        match node {
            Value::String(text) if codec::is_marker(&text) => {
                let value = codec::decode_value(&text, self.cipher).map_err(|source| WalkError {
                    path: display_path(&self.path),
                    source,
                })?;
                self.opened += 1;
                Ok(value)
            }
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| self.child(idx.to_string(), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, item)| {
                    let item = self.child(key.clone(), item)?;
                    Ok::<_, WalkError>((key, item))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other),
        }
    }
}

/// Encrypts every scalar leaf of `tree` unless `policy` says otherwise.
///
/// The policy is consulted at every node, composites included, before
/// descending. Strings that already look like markers are sealed like any
/// other scalar.
pub fn encrypt_tree(
    tree: Value,
    cipher: &dyn Encrypt,
    policy: Option<&dyn InclusionPolicy>,
) -> Result<Value, WalkError> {
    let mut walk = EncryptWalk {
        cipher,
        policy,
        path: Vec::new(),
        sealed: 0,
    };
    let result = walk.visit(tree)?;
    debug!(markers = walk.sealed, "encrypted configuration tree");
    Ok(result)
}

/// Replaces every marker string in `tree` with the value it encodes.
pub fn decrypt_tree(tree: Value, cipher: &dyn Decrypt) -> Result<Value, WalkError> {
    let mut walk = DecryptWalk {
        cipher,
        path: Vec::new(),
        opened: 0,
    };
    let result = walk.visit(tree)?;
    debug!(markers = walk.opened, "decrypted configuration tree");
    Ok(result)
}
