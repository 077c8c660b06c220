//! Ordered configuration layers
//!
//! Precedence, lowest first: hardcoded defaults, the persisted file,
//! runtime overrides (record-store sync and learning deltas), and values
//! supplied through the environment. The stack is merged in that order on
//! every read.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::merge::{deep_merge, merge_all};
use super::schema;
use super::ClassifierConfig;

/// Identity of a configuration layer, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    Defaults,
    File,
    Runtime,
    Environment,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Defaults => write!(f, "defaults"),
            LayerKind::File => write!(f, "file"),
            LayerKind::Runtime => write!(f, "runtime"),
            LayerKind::Environment => write!(f, "environment"),
        }
    }
}

/// The four layers owned by a `ConfigStore`
#[derive(Debug, Clone)]
pub struct LayerStack {
    pub defaults: Value,
    /// `None` when no readable file (or backup) exists
    pub file: Option<Value>,
    pub runtime: Value,
    pub environment: Value,
}

impl LayerStack {
    pub fn new(environment: Value) -> Self {
        Self {
            defaults: ClassifierConfig::defaults_value(),
            file: None,
            runtime: empty(),
            environment,
        }
    }

    /// Layers in merge order
    pub fn ordered(&self) -> Vec<(LayerKind, &Value)> {
        let mut layers = vec![(LayerKind::Defaults, &self.defaults)];
        if let Some(file) = &self.file {
            layers.push((LayerKind::File, file));
        }
        layers.push((LayerKind::Runtime, &self.runtime));
        layers.push((LayerKind::Environment, &self.environment));
        layers
    }

    /// All layers merged
    pub fn merged(&self) -> Value {
        merge_all(self.ordered().into_iter().map(|(_, v)| v))
    }

    /// Same stack with `runtime` in place of the current runtime layer
    pub fn merged_with_runtime(&self, runtime: &Value) -> Value {
        let file = self.file.clone().unwrap_or_else(empty);
        merge_all([&self.defaults, &file, runtime, &self.environment])
    }

    /// Everything except the environment: the base a persisted write starts from
    pub fn persistable(&self) -> Value {
        let file = self.file.clone().unwrap_or_else(empty);
        merge_all([&self.defaults, &file, &self.runtime])
    }

    pub fn has_runtime_overrides(&self) -> bool {
        self.runtime.as_object().is_some_and(|m| !m.is_empty())
    }
}

/// Empty object layer
pub fn empty() -> Value {
    Value::Object(Map::new())
}

/// Environment-supplied values, highest precedence and never persisted
pub fn environment_layer() -> Value {
    environment_layer_from(|key| std::env::var(key).ok())
}

/// Build the environment layer from an arbitrary variable lookup
pub fn environment_layer_from(lookup: impl Fn(&str) -> Option<String>) -> Value {
    let mut record_store = Map::new();
    if let Some(raw) = lookup("RECORD_STORE_ENABLED") {
        match parse_flag(&raw) {
            Some(enabled) => {
                record_store.insert("enabled".into(), json!(enabled));
            }
            None => warn!("Ignoring RECORD_STORE_ENABLED={:?}: expected true or false", raw),
        }
    }
    if let Some(url) = lookup("RECORD_STORE_BASE_URL") {
        record_store.insert("base_url".into(), json!(url));
    }
    if let Some(key) = lookup("RECORD_STORE_API_KEY") {
        record_store.insert("api_key".into(), json!(key));
    }

    let mut layer = Map::new();
    if !record_store.is_empty() {
        layer.insert("record_store".into(), Value::Object(record_store));
    }
    Value::Object(layer)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Drop environment entries that would make the configuration invalid.
///
/// Each `section.key` entry is checked on its own against the defaults, so
/// one bad variable does not discard the others.
pub fn validated_environment(environment: Value) -> Value {
    let Value::Object(sections) = environment else {
        warn!("Ignoring environment layer that is not an object");
        return empty();
    };
    let defaults = ClassifierConfig::defaults_value();

    let mut kept = Map::new();
    for (section, entries) in sections {
        let Value::Object(entries) = entries else {
            warn!("Ignoring environment section '{}': not a table", section);
            continue;
        };
        let mut kept_entries = Map::new();
        for (key, value) in entries {
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            let mut candidate = Map::new();
            candidate.insert(section.clone(), Value::Object(single));

            match schema::validate(&deep_merge(&defaults, &Value::Object(candidate))) {
                Ok(_) => {
                    kept_entries.insert(key, value);
                }
                Err(e) => warn!("Ignoring environment value for {}.{}: {}", section, key, e),
            }
        }
        if !kept_entries.is_empty() {
            kept.insert(section, Value::Object(kept_entries));
        }
    }
    Value::Object(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_wins_over_runtime() {
        let env = environment_layer_from(|k| match k {
            "RECORD_STORE_BASE_URL" => Some("https://records.internal/api".to_string()),
            "RECORD_STORE_ENABLED" => Some("TRUE".to_string()),
            _ => None,
        });
        let mut stack = LayerStack::new(env);
        stack.runtime = json!({"record_store": {"base_url": "http://other"}});
        let merged = stack.merged();
        assert_eq!(merged["record_store"]["base_url"], "https://records.internal/api");
        assert_eq!(merged["record_store"]["enabled"], true);
    }

    #[test]
    fn test_empty_environment_is_empty_object() {
        assert_eq!(environment_layer_from(|_| None), empty());
    }

    #[test]
    fn test_layer_order() {
        let mut stack = LayerStack::new(empty());
        stack.file = Some(json!({"thresholds": {"document": 2.0}}));
        stack.runtime = json!({"thresholds": {"document": 2.5}});
        let kinds: Vec<LayerKind> = stack.ordered().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![LayerKind::Defaults, LayerKind::File, LayerKind::Runtime, LayerKind::Environment]
        );
        assert_eq!(stack.merged()["thresholds"]["document"], 2.5);
        assert!(stack.has_runtime_overrides());
    }

    #[test]
    fn test_persistable_includes_runtime_but_not_environment() {
        let mut stack = LayerStack::new(json!({"record_store": {"base_url": "https://env.example"}}));
        stack.file = Some(json!({"thresholds": {"document": 2.0, "photo": 0.8}}));
        stack.runtime = json!({"thresholds": {"document": 2.5}});

        let base = stack.persistable();
        assert_eq!(base["thresholds"]["document"], 2.5);
        assert_eq!(base["thresholds"]["photo"], 0.8);
        assert_eq!(base["record_store"]["base_url"], "http://localhost/api/v1");
    }

    #[test]
    fn test_enabled_flag_spellings() {
        for (raw, expected) in [("1", true), ("yes", true), (" On ", true), ("0", false), ("off", false)] {
            let env = environment_layer_from(|k| (k == "RECORD_STORE_ENABLED").then(|| raw.to_string()));
            assert_eq!(env["record_store"]["enabled"], expected, "{:?}", raw);
        }
        let garbled = environment_layer_from(|k| (k == "RECORD_STORE_ENABLED").then(|| "maybe".to_string()));
        assert_eq!(garbled, empty());
    }

    #[test]
    fn test_invalid_environment_entries_are_dropped() {
        let env = environment_layer_from(|k| match k {
            "RECORD_STORE_BASE_URL" => Some(String::new()),
            "RECORD_STORE_API_KEY" => Some("secret".to_string()),
            _ => None,
        });
        let env = validated_environment(env);
        assert!(env["record_store"].get("base_url").is_none());
        assert_eq!(env["record_store"]["api_key"], "secret");

        assert_eq!(validated_environment(json!({"record_store": {"base_url": ""}})), empty());
    }
}
