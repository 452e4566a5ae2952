//! Configuration system for the virtual platform.
//!
//! Two layers live here:
//!
//! - [`PlatformConfig`]: the declarative platform document (YAML or JSON)
//!   naming the components to instantiate and the port bindings between them.
//! - [`ConfigNode`]: the typed, read-only view of one component's subtree,
//!   handed to the component while it builds.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   max_time: 100000
//!   log_level: info
//!
//! components:
//!   - name: soc_ctrl
//!     type: soc_ctrl
//!     config:
//!       nb_harts: 2
//!       cluster_power_event: 3
//!       cluster_clock_gate_event: 4
//!       nb_l2_shared_banks: 4
//!   - name: fast_clk
//!     type: clock_gen
//!     config:
//!       period: 10
//!
//! bindings:
//!   - master: fast_clk/out
//!     slave: soc_ctrl/fast_clock
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::types::{PortPath, SimTime};

/// Errors that can occur while loading or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Missing configuration key '{key}' in '{path}'")]
    MissingKey { path: String, key: String },

    #[error("Configuration key '{key}' in '{path}' has the wrong type (expected {expected})")]
    TypeMismatch {
        path: String,
        key: String,
        expected: &'static str,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Typed view over one node of the configuration tree.
///
/// Getters fail with [`ConfigError::MissingKey`] or
/// [`ConfigError::TypeMismatch`]; the `*_or` variants only fall back to the
/// default when the key is absent, never when it has the wrong type.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigNode {
    path: String,
    value: Value,
}

impl Default for ConfigNode {
    fn default() -> Self {
        Self::empty("")
    }
}

impl ConfigNode {
    /// Wraps a JSON value found at `path`.
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    /// Creates an empty object node.
    pub fn empty(path: impl Into<String>) -> Self {
        Self::new(path, Value::Object(Default::default()))
    }

    /// Parses a YAML document into a node.
    pub fn from_yaml(path: impl Into<String>, yaml: &str) -> ConfigResult<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::new(path, value))
    }

    /// Returns a copy of this node with `key` set to `value`.
    ///
    /// Turns a non-object node into an object first.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.value.is_object() {
            self.value = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut self.value {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Returns the path of this node in the tree.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw value of this node.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the raw value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the child node stored under `key`.
    pub fn get_child(&self, key: &str) -> ConfigResult<ConfigNode> {
        let value = self.require(key)?;
        Ok(ConfigNode::new(format!("{}/{}", self.path, key), value.clone()))
    }

    /// Reads a signed integer. Strings of the form `0x...` are accepted.
    pub fn get_int(&self, key: &str) -> ConfigResult<i64> {
        let value = self.require(key)?;
        as_int(value).ok_or_else(|| self.mismatch(key, "integer"))
    }

    /// Reads an unsigned integer. Strings of the form `0x...` are accepted.
    pub fn get_u64(&self, key: &str) -> ConfigResult<u64> {
        let value = self.require(key)?;
        as_u64(value).ok_or_else(|| self.mismatch(key, "unsigned integer"))
    }

    /// Reads a count (non-negative integer that fits `usize`).
    pub fn get_usize(&self, key: &str) -> ConfigResult<usize> {
        let value = self.get_u64(key)?;
        usize::try_from(value).map_err(|_| self.mismatch(key, "count"))
    }

    /// Reads a boolean.
    pub fn get_bool(&self, key: &str) -> ConfigResult<bool> {
        let value = self.require(key)?;
        value.as_bool().ok_or_else(|| self.mismatch(key, "boolean"))
    }

    /// Reads a string.
    pub fn get_str(&self, key: &str) -> ConfigResult<&str> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| self.mismatch(key, "string"))
    }

    /// Reads a signed integer, or `default` when the key is absent.
    pub fn get_int_or(&self, key: &str, default: i64) -> ConfigResult<i64> {
        if self.contains(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }

    /// Reads an unsigned integer, or `default` when the key is absent.
    pub fn get_u64_or(&self, key: &str, default: u64) -> ConfigResult<u64> {
        if self.contains(key) {
            self.get_u64(key)
        } else {
            Ok(default)
        }
    }

    /// Reads a boolean, or `default` when the key is absent.
    pub fn get_bool_or(&self, key: &str, default: bool) -> ConfigResult<bool> {
        if self.contains(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }

    fn require(&self, key: &str) -> ConfigResult<&Value> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            path: self.path.clone(),
            key: key.to_string(),
        })
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> ConfigError {
        ConfigError::TypeMismatch {
            path: self.path.clone(),
            key: key.to_string(),
            expected,
        }
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_hex(s).and_then(|v| i64::try_from(v).ok()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_hex(s),
        _ => None,
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// Global simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Maximum simulation time
    #[serde(default = "default_max_time")]
    pub max_time: SimTime,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to print a statistics summary at the end of the run
    #[serde(default)]
    pub collect_stats: bool,
}

fn default_max_time() -> SimTime {
    1_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            max_time: default_max_time(),
            log_level: default_log_level(),
            collect_stats: false,
        }
    }
}

/// Declaration of one component instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Unique instance name
    pub name: String,

    /// Registered component type name
    #[serde(rename = "type")]
    pub component_type: String,

    /// Component-specific subtree
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl ComponentConfig {
    /// Returns the typed view of this component's subtree.
    pub fn node(&self) -> ConfigNode {
        ConfigNode::new(self.name.clone(), self.config.clone())
    }
}

/// One edge of the port binding manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Master port, `component/port`
    pub master: String,
    /// Slave port, `component/port`
    pub slave: String,
}

/// Complete platform configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Component instances, built in this order
    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    /// Port bindings
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

impl PlatformConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: PlatformConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: PlatformConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for component in &self.components {
            if component.name.is_empty() || component.name.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "Invalid component name: '{}'",
                    component.name
                )));
            }
            if component.component_type.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Component '{}' has no type",
                    component.name
                )));
            }
            if !names.insert(component.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate component name: {}",
                    component.name
                )));
            }
        }

        for binding in &self.bindings {
            for end in [&binding.master, &binding.slave] {
                let path = PortPath::parse(end).ok_or_else(|| {
                    ConfigError::Validation(format!("Malformed port path: '{}'", end))
                })?;
                if !names.contains(path.component.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Binding references non-existent component: {}",
                        path.component
                    )));
                }
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the number of component instances.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Returns the number of bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Finds a component declaration by name.
    pub fn find_component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Builder for creating a `PlatformConfig` programmatically.
#[derive(Default)]
pub struct PlatformConfigBuilder {
    config: PlatformConfig,
}

impl PlatformConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum simulation time.
    pub fn max_time(mut self, time: SimTime) -> Self {
        self.config.simulation.max_time = time;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables the statistics summary.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Adds a component instance.
    pub fn add_component(
        mut self,
        name: impl Into<String>,
        component_type: impl Into<String>,
        config: Value,
    ) -> Self {
        self.config.components.push(ComponentConfig {
            name: name.into(),
            component_type: component_type.into(),
            config,
        });
        self
    }

    /// Adds a binding between two `component/port` paths.
    pub fn bind(mut self, master: impl Into<String>, slave: impl Into<String>) -> Self {
        self.config.bindings.push(BindingConfig {
            master: master.into(),
            slave: slave.into(),
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<PlatformConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = PlatformConfig::new();
        assert_eq!(config.simulation.max_time, 1_000_000);
        assert_eq!(config.simulation.log_level, "info");
        assert!(config.components.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
simulation:
  max_time: 5000
  log_level: debug

components:
  - name: ctrl
    type: soc_ctrl
    config:
      nb_harts: 2
  - name: clk
    type: clock_gen
    config:
      period: 10

bindings:
  - master: clk/out
    slave: ctrl/fast_clock
"#;

        let config = PlatformConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.max_time, 5000);
        assert_eq!(config.component_count(), 2);
        assert_eq!(config.binding_count(), 1);
        let ctrl = config.find_component("ctrl").unwrap().node();
        assert_eq!(ctrl.get_int("nb_harts").unwrap(), 2);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": { "max_time": 1000 },
            "components": [ { "name": "mem", "type": "memory", "config": { "size": 4096 } } ],
            "bindings": []
        }"#;

        let config = PlatformConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.max_time, 1000);
        assert_eq!(config.components[0].node().get_u64("size").unwrap(), 4096);
    }

    #[test]
    fn test_builder() {
        let config = PlatformConfigBuilder::new()
            .max_time(2000)
            .add_component("clk", "clock_gen", json!({ "period": 4 }))
            .add_component("probe", "clock_counter", json!({}))
            .bind("clk/out", "probe/clock")
            .build()
            .unwrap();

        assert_eq!(config.simulation.max_time, 2000);
        assert_eq!(config.component_count(), 2);
        assert_eq!(config.binding_count(), 1);
    }

    #[test]
    fn test_validation_duplicate_component() {
        let yaml = r#"
components:
  - name: a
    type: memory
  - name: a
    type: memory
"#;
        assert!(PlatformConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_binding_to_unknown_component() {
        let result = PlatformConfigBuilder::new()
            .add_component("clk", "clock_gen", json!({}))
            .bind("clk/out", "ghost/clock")
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_malformed_path() {
        let result = PlatformConfigBuilder::new()
            .add_component("clk", "clock_gen", json!({}))
            .bind("clk", "clk/in")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_node_typed_getters() {
        let node = ConfigNode::empty("ctrl")
            .with("nb_harts", 4)
            .with("base", "0x1000")
            .with("strict", true)
            .with("label", "soc");

        assert_eq!(node.get_int("nb_harts").unwrap(), 4);
        assert_eq!(node.get_u64("base").unwrap(), 0x1000);
        assert!(node.get_bool("strict").unwrap());
        assert_eq!(node.get_str("label").unwrap(), "soc");
        assert_eq!(node.get_usize("nb_harts").unwrap(), 4);
    }

    #[test]
    fn test_node_missing_key_is_error() {
        let node = ConfigNode::empty("ctrl");
        match node.get_int("nb_harts") {
            Err(ConfigError::MissingKey { path, key }) => {
                assert_eq!(path, "ctrl");
                assert_eq!(key, "nb_harts");
            }
            other => panic!("Expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_node_type_mismatch_is_error() {
        let node = ConfigNode::empty("ctrl").with("nb_harts", "many");
        assert!(matches!(
            node.get_int("nb_harts"),
            Err(ConfigError::TypeMismatch { .. })
        ));
        // A default never hides a wrong type.
        assert!(node.get_int_or("nb_harts", 1).is_err());
        assert_eq!(node.get_int_or("absent", 7).unwrap(), 7);
    }

    #[test]
    fn test_node_child() {
        let node = ConfigNode::from_yaml("top", "child:\n  value: 3\n").unwrap();
        let child = node.get_child("child").unwrap();
        assert_eq!(child.path(), "top/child");
        assert_eq!(child.get_int("value").unwrap(), 3);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = PlatformConfigBuilder::new()
            .max_time(1000)
            .add_component("mem", "memory", json!({ "size": 64 }))
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = PlatformConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.simulation.max_time, restored.simulation.max_time);
        assert_eq!(config.component_count(), restored.component_count());
    }
}
