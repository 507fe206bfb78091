//! JSON and YAML adapters between document text and the in-memory tree.
//!
//! Both formats land in the same `serde_json::Value` tree (with insertion
//! order preserved) so the walks never care where a document came from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Json => write!(f, "json"),
            ConfigFormat::Yaml => write!(f, "yaml"),
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(FormatError::UnknownFormat(s.to_string())),
        }
    }
}

impl ConfigFormat {
    /// Picks the format for `path`. An explicit format always wins; otherwise
    /// `.yml`/`.yaml` suffixes mean YAML and any `.json` in the path means JSON.
    pub fn infer(path: &Path, explicit: Option<ConfigFormat>) -> Result<Self, FormatError> {
        if let Some(format) = explicit {
            return Ok(format);
        }
        let name = path.to_string_lossy();
        if name.ends_with(".yml") || name.ends_with(".yaml") {
            return Ok(ConfigFormat::Yaml);
        }
        if name.contains(".json") {
            return Ok(ConfigFormat::Json);
        }
        Err(FormatError::Uninferable(path.to_path_buf()))
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to infer config format from `{}`; pass the format explicitly", .0.display())]
    Uninferable(PathBuf),
    #[error("unknown config format `{0}`")]
    UnknownFormat(String),
    #[error("invalid JSON document: {0}")]
    JsonParse(#[source] serde_json::Error),
    #[error("invalid YAML document: {0}")]
    YamlParse(#[source] serde_yaml::Error),
    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),
    #[error("YAML serialization failed: {0}")]
    YamlSerialize(#[source] serde_yaml::Error),
}

/// Hook called with `(key, value)`; `None` drops an object entry (or turns
/// an array slot into `null`). Array slots are keyed by their index and the
/// document root by `""`.
pub type JsonHook = Arc<dyn Fn(&str, Value) -> Option<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct JsonOptions {
    /// Applied bottom-up to every parsed value.
    pub reviver: Option<JsonHook>,
    /// Applied top-down to every value before serialization.
    pub replacer: Option<JsonHook>,
    /// Indent output instead of writing a single line.
    pub pretty: bool,
}

impl fmt::Debug for JsonOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonOptions")
            .field("reviver", &self.reviver.is_some())
            .field("replacer", &self.replacer.is_some())
            .field("pretty", &self.pretty)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct YamlLoadOptions {
    /// Resolve `<<` merge keys while loading.
    pub merge_keys: bool,
}

impl Default for YamlLoadOptions {
    fn default() -> Self {
        Self { merge_keys: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct YamlDumpOptions {
    /// Start the document with an explicit `---` marker.
    pub explicit_start: bool,
}

#[derive(Debug, Clone, Default)]
pub struct YamlOptions {
    pub load: YamlLoadOptions,
    pub dump: YamlDumpOptions,
}

#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    pub json: JsonOptions,
    pub yaml: YamlOptions,
}

fn revive(key: &str, value: Value, reviver: &JsonHook) -> Option<Value> {
    let value = match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| revive(&idx.to_string(), item, reviver).unwrap_or(Value::Null))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .filter_map(|(k, v)| revive(&k, v, reviver).map(|v| (k, v)))
                .collect(),
        ),
        other => other,
    };
    reviver(key, value)
}

fn replace(key: &str, value: Value, replacer: &JsonHook) -> Option<Value> {
    let value = replacer(key, value)?;
    Some(match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| replace(&idx.to_string(), item, replacer).unwrap_or(Value::Null))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .filter_map(|(k, v)| replace(&k, v, replacer).map(|v| (k, v)))
                .collect(),
        ),
        other => other,
    })
}

fn yaml_error(message: String) -> FormatError {
    FormatError::YamlParse(<serde_yaml::Error as serde::de::Error>::custom(message))
}

fn yaml_number(number: &serde_yaml::Number) -> Value {
    if let Some(n) = number.as_i64() {
        Value::from(n)
    } else if let Some(n) = number.as_u64() {
        Value::from(n)
    } else {
        number
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

/// Scalar mapping keys become strings (`404`, `true`, `null`); composite
/// keys have no string form and are rejected.
fn yaml_key(key: serde_yaml::Value) -> Result<String, FormatError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Null => Ok("null".to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(match yaml_number(&n) {
            Value::Number(n) => n.to_string(),
            _ => n.to_string(),
        }),
        serde_yaml::Value::Tagged(tagged) => Err(yaml_error(format!(
            "tagged mapping key `{}` is not supported",
            tagged.tag
        ))),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => {
            Err(yaml_error("mapping keys must be scalars".to_string()))
        }
    }
}

fn from_yaml(node: serde_yaml::Value) -> Result<Value, FormatError> {
    Ok(match node {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(from_yaml)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_yaml::Value::Mapping(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, item)| Ok::<_, FormatError>((yaml_key(key)?, from_yaml(item)?)))
                .collect::<Result<serde_json::Map<_, _>, _>>()?,
        ),
        serde_yaml::Value::Tagged(tagged) => {
            return Err(yaml_error(format!("tagged value `{}` is not supported", tagged.tag)))
        }
    })
}

/// Parses document text into a tree.
pub fn parse(text: &str, format: ConfigFormat, options: &FormatOptions) -> Result<Value, FormatError> {
    match format {
        ConfigFormat::Json => {
            let value: Value = serde_json::from_str(text).map_err(FormatError::JsonParse)?;
            Ok(match &options.json.reviver {
                Some(reviver) => revive("", value, reviver).unwrap_or(Value::Null),
                None => value,
            })
        }
        ConfigFormat::Yaml => {
            let mut document: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(FormatError::YamlParse)?;
            if options.yaml.load.merge_keys {
                document.apply_merge().map_err(FormatError::YamlParse)?;
            }
            from_yaml(document)
        }
    }
}

/// Serializes a tree back into document text.
pub fn serialize(tree: &Value, format: ConfigFormat, options: &FormatOptions) -> Result<String, FormatError> {
    match format {
        ConfigFormat::Json => {
            let replaced;
            let tree = match &options.json.replacer {
                Some(replacer) => {
                    replaced = replace("", tree.clone(), replacer).unwrap_or(Value::Null);
                    &replaced
                }
                None => tree,
            };
            let text = if options.json.pretty {
                serde_json::to_string_pretty(tree)
            } else {
                serde_json::to_string(tree)
            };
            text.map_err(FormatError::JsonSerialize)
        }
        ConfigFormat::Yaml => {
            let body = serde_yaml::to_string(tree).map_err(FormatError::YamlSerialize)?;
            if options.yaml.dump.explicit_start {
                Ok(format!("---\n{body}"))
            } else {
                Ok(body)
            }
        }
    }
}
