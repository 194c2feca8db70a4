//! Layered YAML configuration.
//!
//! The on-disk user file is deep-merged onto the built-in defaults so that a
//! partial config never loses nested keys. Loading always succeeds: a missing
//! or malformed file falls back to defaults with a warning. Updates are held
//! in memory and written back with an explicit [`Config::save`] call.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("model type must be 'text' or 'vision', got '{0}'")]
    UnknownModelKind(String),

    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureRange(f64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which family of model a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Text,
    Vision,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Text => "text",
            ModelKind::Vision => "vision",
        }
    }

    fn builtin_model(&self) -> &'static str {
        match self {
            ModelKind::Text => "llama3.2",
            ModelKind::Vision => "llama3.2-vision",
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ModelKind::Text),
            "vision" => Ok(ModelKind::Vision),
            other => Err(ConfigError::UnknownModelKind(other.to_string())),
        }
    }
}

const DEFAULT_CONFIG_YAML: &str = r#"
models:
  text: llama3.2
  vision: llama3.2-vision
  last_used: null
temperature:
  text: 0.7
  vision: 0.7
default_prompts:
  .py: "Review this Python code and provide suggestions for improvement:"
  .js: "Review this JavaScript code and provide suggestions for improvement:"
  .rs: "Review this Rust code and provide suggestions for improvement:"
  .md: "Can you explain this markdown document?"
  .txt: "Can you analyze this text?"
  .json: "Can you explain this JSON data?"
  .yaml: "Can you explain this YAML configuration?"
  .jpg: "What do you see in this image?"
  .png: "What do you see in this image?"
  .gif: "What do you see in this image?"
"#;

/// The built-in default configuration as an untyped YAML mapping.
pub fn default_config() -> Value {
    // The literal above is part of the crate; parsing it cannot fail.
    serde_yaml::from_str(DEFAULT_CONFIG_YAML).expect("built-in default config is valid YAML")
}

/// Deep merge two YAML values, with `overrides` taking precedence.
///
/// Nested mappings are merged recursively, so missing nested keys stay
/// populated from `defaults` while explicit overrides win. Keys present only
/// in `overrides` are preserved verbatim.
pub fn deep_merge(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Mapping(base), Value::Mapping(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                let entry = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Mapping(merged)
        }
        // Scalars (and mapping-vs-scalar mismatches) are replaced outright.
        _ => overrides.clone(),
    }
}

/// Effective configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    values: Value,
    path: PathBuf,
}

impl Config {
    /// Per-user config path: `~/.config/ol/config.yaml`.
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("ol").join("config.yaml")
    }

    pub fn load_default() -> Self {
        Self::load(Self::default_path())
    }

    /// Load the configuration from `path`, merged onto the built-in defaults.
    ///
    /// Never fails: an absent file yields the defaults (and writes an initial
    /// config file, best effort), a malformed file yields the defaults with a
    /// warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let defaults = default_config();

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, creating defaults");
                let config = Self {
                    values: defaults,
                    path,
                };
                config.save();
                return config;
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to read config file, using defaults");
                debug!(error = %e, "config read error");
                return Self {
                    values: defaults,
                    path,
                };
            }
        };

        let values = match serde_yaml::from_str::<Value>(&contents) {
            Ok(Value::Mapping(user)) => deep_merge(&defaults, &Value::Mapping(user)),
            Ok(Value::Null) => defaults,
            Ok(_) => {
                warn!(path = %path.display(), "config root is not a mapping, using defaults");
                defaults
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to parse config file, using defaults");
                debug!(error = %e, "config parse error");
                defaults
            }
        };

        Self { values, path }
    }

    /// Write the configuration back to its file. Failures are warned, not fatal.
    pub fn save(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "failed to create config directory");
                return;
            }
        }
        let serialized = match serde_yaml::to_string(&self.values) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize config");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), error = %e, "failed to save config");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default model for the given kind.
    pub fn model_for(&self, kind: ModelKind) -> String {
        self.lookup("models", kind.as_str())
            .and_then(Value::as_str)
            .unwrap_or_else(|| kind.builtin_model())
            .to_string()
    }

    /// Default temperature for the given kind.
    pub fn temperature_for(&self, kind: ModelKind) -> f64 {
        self.lookup("temperature", kind.as_str())
            .and_then(Value::as_f64)
            .unwrap_or(0.7)
    }

    pub fn last_used_model(&self) -> Option<String> {
        self.lookup("models", "last_used")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Record the last-used model in memory. Persisted on the next [`save`].
    ///
    /// [`save`]: Config::save
    pub fn set_last_used_model(&mut self, model: Option<&str>) {
        let value = match model {
            Some(m) => Value::String(m.to_string()),
            None => Value::Null,
        };
        self.set("models", "last_used", value);
    }

    pub fn set_model_for(&mut self, kind: ModelKind, model: &str) {
        self.set("models", kind.as_str(), Value::String(model.to_string()));
    }

    pub fn set_temperature_for(&mut self, kind: ModelKind, temperature: f64) -> Result<()> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::TemperatureRange(temperature));
        }
        self.set("temperature", kind.as_str(), Value::from(temperature));
        Ok(())
    }

    /// Default prompt registered for the file's extension, if any.
    pub fn default_prompt_for(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.lookup("default_prompts", &format!(".{ext}"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set_default_prompt(&mut self, extension: &str, prompt: &str) {
        self.set(
            "default_prompts",
            extension,
            Value::String(prompt.to_string()),
        );
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        self.values.get(section)?.get(key)
    }

    fn set(&mut self, section: &str, key: &str, value: Value) {
        let root = match &mut self.values {
            Value::Mapping(root) => root,
            _ => return,
        };
        let section_key = Value::String(section.to_string());
        if !matches!(root.get(&section_key), Some(Value::Mapping(_))) {
            root.insert(section_key.clone(), Value::Mapping(Mapping::new()));
        }
        if let Some(Value::Mapping(map)) = root.get_mut(&section_key) {
            map.insert(Value::String(key.to_string()), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_deep_merge_preserves_nested_defaults() {
        let defaults = default_config();
        let overrides = yaml("models:\n  text: custom-model\n");

        let merged = deep_merge(&defaults, &overrides);

        assert_eq!(
            merged.get("models").unwrap().get("text").unwrap().as_str(),
            Some("custom-model")
        );
        assert_eq!(
            merged.get("models").unwrap().get("vision").unwrap().as_str(),
            Some("llama3.2-vision")
        );
        assert_eq!(
            merged
                .get("temperature")
                .unwrap()
                .get("text")
                .unwrap()
                .as_f64(),
            Some(0.7)
        );
    }

    #[test]
    fn test_deep_merge_user_overrides_win() {
        let defaults = yaml("a:\n  x: 1\n  y: 2\nb: base\n");
        let overrides = yaml("a:\n  x: 10\nb: over\n");

        let merged = deep_merge(&defaults, &overrides);

        assert_eq!(merged.get("a").unwrap().get("x").unwrap().as_i64(), Some(10));
        assert_eq!(merged.get("a").unwrap().get("y").unwrap().as_i64(), Some(2));
        assert_eq!(merged.get("b").unwrap().as_str(), Some("over"));
    }

    #[test]
    fn test_deep_merge_multiple_nested_levels() {
        let defaults = yaml("l1:\n  l2:\n    l3: default\n    other: kept\n  sibling: kept\n");
        let overrides = yaml("l1:\n  l2:\n    l3: override\n");

        let merged = deep_merge(&defaults, &overrides);
        let l2 = merged.get("l1").unwrap().get("l2").unwrap();

        assert_eq!(l2.get("l3").unwrap().as_str(), Some("override"));
        assert_eq!(l2.get("other").unwrap().as_str(), Some("kept"));
        assert_eq!(
            merged.get("l1").unwrap().get("sibling").unwrap().as_str(),
            Some("kept")
        );
    }

    #[test]
    fn test_deep_merge_preserves_unknown_keys() {
        let defaults = yaml("known:\n  key: value\n");
        let overrides = yaml("known:\n  extra: added\nfuture_section:\n  setting: 1\n");

        let merged = deep_merge(&defaults, &overrides);

        assert_eq!(
            merged.get("known").unwrap().get("key").unwrap().as_str(),
            Some("value")
        );
        assert_eq!(
            merged.get("known").unwrap().get("extra").unwrap().as_str(),
            Some("added")
        );
        assert_eq!(
            merged
                .get("future_section")
                .unwrap()
                .get("setting")
                .unwrap()
                .as_i64(),
            Some(1)
        );
    }

    #[test]
    fn test_deep_merge_scalar_replaces_mapping() {
        let defaults = yaml("nested:\n  key: value\nscalar: 1\n");
        let overrides = yaml("nested: replaced\nscalar: 2\n");

        let merged = deep_merge(&defaults, &overrides);

        assert_eq!(merged.get("nested").unwrap().as_str(), Some("replaced"));
        assert_eq!(merged.get("scalar").unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_deep_merge_idempotent() {
        let defaults = default_config();
        let overrides = yaml("models:\n  text: custom\ntemperature:\n  vision: 0.2\n");

        let once = deep_merge(&defaults, &overrides);
        let twice = deep_merge(&once, &overrides);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_load_partial_config_keeps_sibling_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "models:\n  text: custom-model\n");

        let config = Config::load(&path);

        assert_eq!(config.model_for(ModelKind::Text), "custom-model");
        assert_eq!(config.model_for(ModelKind::Vision), "llama3.2-vision");
        assert_eq!(config.temperature_for(ModelKind::Text), 0.7);
        assert_eq!(config.temperature_for(ModelKind::Vision), 0.7);
    }

    #[test]
    fn test_load_empty_config_uses_all_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");

        let config = Config::load(&path);

        assert_eq!(config.model_for(ModelKind::Text), "llama3.2");
        assert_eq!(config.model_for(ModelKind::Vision), "llama3.2-vision");
        assert_eq!(config.last_used_model(), None);
    }

    #[test]
    fn test_load_malformed_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "models: [not: {valid yaml");

        let config = Config::load(&path);

        assert_eq!(config.model_for(ModelKind::Text), "llama3.2");
        assert_eq!(config.temperature_for(ModelKind::Vision), 0.7);
    }

    /// Collects everything a subscriber writes so log output can be asserted.
    #[derive(Clone, Default)]
    struct CaptureWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_at(level: tracing::Level, f: impl FnOnce()) -> String {
        let writer = CaptureWriter::default();
        let sink = writer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        output
    }

    #[test]
    fn test_parse_failure_detail_is_logged_at_debug_only() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "models: [not: {valid yaml");

        let warn_output = logs_at(tracing::Level::WARN, || {
            Config::load(&path);
        });
        assert!(warn_output.contains("failed to parse config file"));
        assert!(!warn_output.contains("config parse error"));

        let debug_output = logs_at(tracing::Level::DEBUG, || {
            Config::load(&path);
        });
        assert!(debug_output.contains("config parse error"));
    }

    #[test]
    fn test_load_absent_file_creates_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("config.yaml");

        let config = Config::load(&path);

        assert_eq!(config.model_for(ModelKind::Text), "llama3.2");
        // Initial defaults were written back so the next load sees a file.
        assert!(path.exists());
    }

    #[test]
    fn test_last_used_model_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::load(&path);
        assert_eq!(config.last_used_model(), None);

        config.set_last_used_model(Some("codellama"));
        config.save();

        let reloaded = Config::load(&path);
        assert_eq!(reloaded.last_used_model(), Some("codellama".to_string()));
    }

    #[test]
    fn test_save_preserves_user_overrides_and_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "models:\n  text: custom\nexperimental:\n  flag: true\n",
        );

        let mut config = Config::load(&path);
        config.set_last_used_model(Some("custom"));
        config.save();

        let reloaded = Config::load(&path);
        assert_eq!(reloaded.model_for(ModelKind::Text), "custom");
        assert_eq!(
            reloaded.values.get("experimental").unwrap().get("flag"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_set_temperature_validates_range() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::load(dir.path().join("config.yaml"));

        assert!(config.set_temperature_for(ModelKind::Text, 1.5).is_ok());
        assert_eq!(config.temperature_for(ModelKind::Text), 1.5);

        assert!(matches!(
            config.set_temperature_for(ModelKind::Text, 2.5),
            Err(ConfigError::TemperatureRange(_))
        ));
        assert!(matches!(
            config.set_temperature_for(ModelKind::Vision, -0.1),
            Err(ConfigError::TemperatureRange(_))
        ));
    }

    #[test]
    fn test_default_prompt_for_extension() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("config.yaml"));

        assert_eq!(
            config.default_prompt_for(Path::new("photo.PNG")),
            Some("What do you see in this image?".to_string())
        );
        assert_eq!(
            config.default_prompt_for(Path::new("script.py")),
            Some("Review this Python code and provide suggestions for improvement:".to_string())
        );
        assert_eq!(config.default_prompt_for(Path::new("data.bin")), None);
        assert_eq!(config.default_prompt_for(Path::new("noext")), None);
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("text".parse::<ModelKind>().unwrap(), ModelKind::Text);
        assert_eq!("vision".parse::<ModelKind>().unwrap(), ModelKind::Vision);
        assert!(matches!(
            "audio".parse::<ModelKind>(),
            Err(ConfigError::UnknownModelKind(_))
        ));
    }
}
