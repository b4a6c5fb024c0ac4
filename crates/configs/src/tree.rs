use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::ConfigError;
use crate::merge::{deep_merge, lowercase_keys};

pub const DEFAULT_CONFIG_PATH: &str = "conf/env.toml";

/// Resolved, case-normalized configuration.
///
/// Top-level keys name sections (`postgres`, `redis`, `aws`, `directory`, ...)
/// or plain scalars. The shape of each section belongs to whoever consumes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Map<String, Value>,
}

impl ConfigTree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a tree from an in-memory document. Non-mapping documents yield an empty tree.
    pub fn from_value(value: Value) -> Self {
        match lowercase_keys(value) {
            Value::Object(root) => Self { root },
            _ => Self::default(),
        }
    }

    /// Read `path` and apply overrides from the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        // Variables that are not valid UTF-8 cannot name a config key; skip them.
        let env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Self::load_with_env(path, env)
    }

    /// Same as [`ConfigTree::load`] with an explicit environment.
    pub fn load_with_env<I>(path: impl AsRef<Path>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::read_file(path.as_ref())?.resolve(env)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config file unavailable, starting from an empty tree");
                return Ok(Self::empty());
            }
        };
        let doc: Value = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "config file loaded");
        Ok(Self::from_value(doc))
    }

    /// Layer environment variables over the tree.
    ///
    /// Only variables whose lower-cased name matches an existing top-level key
    /// are considered. Variables are applied in name order.
    pub fn resolve<I>(mut self, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: BTreeMap<String, String> = env.into_iter().collect();
        for (name, raw) in env {
            let key = name.to_lowercase();
            let Some(current) = self.root.get_mut(&key) else {
                continue;
            };
            if current.is_object() || current.is_array() {
                let overlay: Value = serde_json::from_str(&raw)
                    .map_err(|source| ConfigError::Override { key: name.clone(), source })?;
                deep_merge(current, lowercase_keys(overlay));
            } else {
                *current = coerce_scalar(current, raw);
            }
            debug!(%key, "environment override applied");
        }
        Ok(self)
    }

    /// Top-level lookup; `key` is matched case-insensitively.
    pub fn find(&self, key: &str) -> Option<&Value> {
        self.root.get(&key.to_lowercase())
    }

    pub fn find_or(&self, key: &str, fallback: Value) -> Value {
        self.find(key).cloned().unwrap_or(fallback)
    }

    pub fn find_str(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(Value::as_str)
    }

    /// Dotted lookup into nested sections, e.g. `redis.host`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.find(parts.next()?)?;
        for part in parts {
            current = current.get(part.to_lowercase())?;
        }
        Some(current)
    }

    /// Deserialize a top-level section. Absent or null sections are `Ok(None)`.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.find(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|source| ConfigError::Section {
                section: key.to_lowercase(),
                source,
            }),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

// Keep numbers and booleans typed when the override still reads as one.
fn coerce_scalar(current: &Value, raw: String) -> Value {
    match (current, serde_json::from_str::<Value>(raw.trim())) {
        (Value::Number(_), Ok(Value::Number(n))) => Value::Number(n),
        (Value::Bool(_), Ok(Value::Bool(b))) => Value::Bool(b),
        _ => Value::String(raw),
    }
}
