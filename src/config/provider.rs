use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::config::ResolvedEnvironment;
use crate::core::{BootstrapError, Result};

/// Read-only view over `<config root>/<environment>/<dir>/<file>.json`.
///
/// A section key `dir:file` names one JSON file. Overrides named
/// `dir__file__field` replace `field` inside that section.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    environment_dir: PathBuf,
    overrides: BTreeMap<String, String>,
}

impl ConfigProvider {
    pub fn new(environment: &ResolvedEnvironment, overrides: BTreeMap<String, String>) -> Self {
        Self {
            environment_dir: environment.environment_dir(),
            overrides,
        }
    }

    /// Returns a provider with `extra` layered over the existing overrides.
    pub fn with_overrides(&self, extra: &BTreeMap<String, String>) -> Self {
        let mut overrides = self.overrides.clone();
        overrides.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            environment_dir: self.environment_dir.clone(),
            overrides,
        }
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    pub fn section_path(&self, key: &str) -> Result<PathBuf> {
        let (dir, file) = split_key(key)?;
        Ok(self.environment_dir.join(dir).join(format!("{}.json", file)))
    }

    /// Loads a section; a missing file yields an empty object.
    pub fn section(&self, key: &str) -> Result<JsonValue> {
        let path = self.section_path(key)?;

        let mut section = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                BootstrapError::Configuration(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            serde_json::from_str::<JsonValue>(&content).map_err(|e| {
                BootstrapError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            JsonValue::Object(Map::new())
        };

        let (dir, file) = split_key(key)?;
        let prefix = format!("{}__{}__", dir, file);
        for (name, raw) in &self.overrides {
            if let Some(field_path) = name.strip_prefix(&prefix) {
                let segments: Vec<&str> = field_path.split("__").collect();
                let value = override_value(raw, get_path(&section, &segments));
                set_path(&mut section, &segments, value);
            }
        }

        Ok(section)
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let section = self.section(key)?;
        serde_json::from_value(section).map_err(|e| {
            BootstrapError::Configuration(format!("Invalid configuration '{}': {}", key, e))
        })
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once(':')
        .filter(|(dir, file)| !dir.is_empty() && !file.is_empty())
        .ok_or_else(|| {
            BootstrapError::Configuration(format!(
                "Config key '{}' must have the form 'dir:file'",
                key
            ))
        })
}

/// An override is a string unless the value it replaces is a number or boolean and
/// `raw` parses as the same kind.
fn override_value(raw: &str, current: Option<&JsonValue>) -> JsonValue {
    let parsed = serde_json::from_str::<JsonValue>(raw.trim());
    match (current, parsed) {
        (Some(JsonValue::Number(_)), Ok(value @ JsonValue::Number(_))) => value,
        (Some(JsonValue::Bool(_)), Ok(value @ JsonValue::Bool(_))) => value,
        _ => JsonValue::String(raw.to_string()),
    }
}

fn get_path<'a>(target: &'a JsonValue, segments: &[&str]) -> Option<&'a JsonValue> {
    segments
        .iter()
        .try_fold(target, |value, segment| value.get(segment))
}

/// Port given as a JSON number or as decimal text, the form an override takes when
/// the file does not set the port.
pub fn port_number<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", text))),
    }
}

fn set_path(target: &mut JsonValue, segments: &[&str], value: JsonValue) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(object) = target {
        let child = object.entry(first.to_string()).or_insert(JsonValue::Null);
        set_path(child, rest, value);
    }
}
