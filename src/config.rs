use serde_json::{Map, Value};

use crate::record::Level;
use crate::registry::ConfigError;

/// Key of the logging section inside the application settings document.
pub const SETTINGS_SECTION: &str = "clientLog";

/// One `{target: {enabled, level, ...options}}` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub target: String,
    pub enabled: bool,
    /// Required once the entry is enabled; checked when streams are built.
    pub level: Option<Level>,
    /// Every key other than `enabled` and `level`.
    pub options: Map<String, Value>,
}

impl TargetConfig {
    pub fn new(target: impl Into<String>, level: Level) -> Self {
        TargetConfig {
            target: target.into(),
            enabled: true,
            level: Some(level),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Declarative stream configuration, read once at startup.
///
/// Entries keep the order of the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamsConfig {
    entries: Vec<TargetConfig>,
}

impl StreamsConfig {
    pub fn new(entries: Vec<TargetConfig>) -> Self {
        StreamsConfig { entries }
    }

    pub fn entries(&self) -> &[TargetConfig] {
        &self.entries
    }

    /// Parse a `{target: {enabled, level, ...}}` mapping.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = value.as_object().ok_or(ConfigError::NotAnObject)?;
        let mut entries = Vec::with_capacity(map.len());
        for (target, entry) in map {
            let fields = entry.as_object().ok_or_else(|| ConfigError::InvalidEntry {
                target: target.clone(),
            })?;

            let mut options = fields.clone();
            let enabled = options.remove("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
            // Disabled entries are never built, so their level is not validated.
            let level = match options.remove("level") {
                None | Some(Value::Null) => None,
                Some(raw) if !enabled => serde_json::from_value::<Level>(raw).ok(),
                Some(raw) => Some(serde_json::from_value::<Level>(raw).map_err(|source| {
                    ConfigError::InvalidLevel {
                        target: target.clone(),
                        source,
                    }
                })?),
            };

            entries.push(TargetConfig {
                target: target.clone(),
                enabled,
                level,
                options,
            });
        }
        Ok(StreamsConfig { entries })
    }

    /// Parse a JSON string holding the mapping.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Take the `clientLog` section of an application settings document,
    /// or the default configuration when the section is absent.
    pub fn from_settings(settings: &Value) -> Result<Self, ConfigError> {
        match settings.get(SETTINGS_SECTION) {
            Some(section) if !section.is_null() => Self::from_value(section),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for StreamsConfig {
    /// Console at `debug`, server reporting configured but disabled.
    fn default() -> Self {
        StreamsConfig {
            entries: vec![
                TargetConfig::new("console", Level::Debug),
                TargetConfig::new("server", Level::Debug).disabled(),
            ],
        }
    }
}
