use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::device::DeviceInformation;

/// Severity of a [`LogRecord`], ordered from least to most severe.
///
/// The numeric values follow the bunyan convention (`trace = 10` up to
/// `fatal = 60`) so that settings written for bunyan-style loggers parse
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace = 10,
    Debug = 20,
    Info = 30,
    Warn = 40,
    Error = 50,
    Fatal = 60,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Lowercase level name as sent over the wire (`"info"`, `"warn"`...).
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    pub fn as_number(self) -> u64 {
        self as u64
    }

    pub fn from_number(n: u64) -> Option<Level> {
        Level::ALL.into_iter().find(|l| l.as_number() == n)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name or number is not recognized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) => Level::from_number(n)
                .ok_or_else(|| serde::de::Error::custom(ParseLevelError(n.to_string()))),
        }
    }
}

/// Structured fields a producer attaches to a log call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Value>,
}

impl LogFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(log_code: impl Into<String>) -> Self {
        Self {
            log_code: Some(log_code.into()),
            extra_info: None,
        }
    }

    pub fn with_extra(mut self, extra_info: Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Where a record was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Snapshot of the application's auth context.
///
/// Only `host` and `meeting_id` are interpreted by the pipeline; any other
/// keys the application provides are kept and forwarded as `userInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthInfo {
    /// Whether the context describes an active meeting/session.
    pub fn has_active_meeting(&self) -> bool {
        self.meeting_id.is_some()
    }

    /// The host, if present and non-empty.
    pub fn resolved_host(&self) -> Option<&str> {
        self.host.as_deref().filter(|h| !h.is_empty())
    }
}

/// An enriched log entry as seen by every stream.
///
/// The logger builds one record per call and hands out shared references;
/// streams that need to attach per-delivery fields work on their own clone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub name: String,
    pub level: Level,
    pub time: DateTime<Utc>,
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<SourceLocation>,
    pub app_version: String,
    pub client_build: u64,
    pub device_information: DeviceInformation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<AuthInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_are_ordered_by_severity() {
        for pair in Level::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn level_parses_names_and_bunyan_numbers() {
        assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(serde_json::from_value::<Level>(json!("debug")).unwrap(), Level::Debug);
        assert_eq!(serde_json::from_value::<Level>(json!(50)).unwrap(), Level::Error);
        assert!(serde_json::from_value::<Level>(json!(35)).is_err());
        assert!(serde_json::from_value::<Level>(json!("loud")).is_err());
    }

    #[test]
    fn auth_info_keeps_unknown_keys() {
        let info: AuthInfo = serde_json::from_value(json!({
            "host": "example.com",
            "meetingId": "m-1",
            "userId": "u-7",
        }))
        .unwrap();
        assert_eq!(info.resolved_host(), Some("example.com"));
        assert!(info.has_active_meeting());
        assert_eq!(info.extra.get("userId"), Some(&json!("u-7")));

        let back = serde_json::to_value(&info).unwrap();
        assert_eq!(back["userId"], json!("u-7"));
    }

    #[test]
    fn empty_host_is_not_resolved() {
        let info = AuthInfo {
            host: Some(String::new()),
            ..AuthInfo::default()
        };
        assert_eq!(info.resolved_host(), None);
    }
}
