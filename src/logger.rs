use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::capabilities::Capabilities;
use crate::config::StreamsConfig;
use crate::device::DeviceFacts;
use crate::record::{Level, LogFields, LogRecord, SourceLocation};
use crate::registry::{build_streams, ConfigError, RoutedStream, StreamContext};

pub const DEFAULT_LOGGER_NAME: &str = "clientLogger";

/// Single entry point for producers.
///
/// Every call builds one enriched [`LogRecord`] and hands it to each stream
/// whose configured level it meets. Streams are isolated from each other:
/// a stream that panics is reported and skipped, the others still receive
/// the record. Nothing is ever returned to, or raised at, the producer.
pub struct Logger {
    name: String,
    streams: Vec<RoutedStream>,
    capabilities: Arc<Capabilities>,
    device: Arc<DeviceFacts>,
}

macro_rules! level_method {
    ($name:ident, $level:expr) => {
        #[track_caller]
        pub fn $name(&self, fields: LogFields, message: impl Into<String>) {
            self.log($level, fields, message);
        }
    };
}

impl Logger {
    pub fn new(streams: Vec<RoutedStream>, ctx: &StreamContext) -> Self {
        Logger {
            name: DEFAULT_LOGGER_NAME.to_string(),
            streams,
            capabilities: Arc::clone(&ctx.capabilities),
            device: Arc::clone(&ctx.device),
        }
    }

    /// Build the streams described by `config` and route to them.
    pub fn from_config(config: &StreamsConfig, ctx: &StreamContext) -> Result<Self, ConfigError> {
        let streams = build_streams(config, ctx)?;
        Ok(Logger::new(streams, ctx))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn streams(&self) -> &[RoutedStream] {
        &self.streams
    }

    /// Whether at least one stream would receive a record at `level`.
    pub fn enabled(&self, level: Level) -> bool {
        self.streams.iter().any(|s| s.accepts(level))
    }

    /// Log `message` at `level` with the caller's source location.
    #[track_caller]
    pub fn log(&self, level: Level, fields: LogFields, message: impl Into<String>) {
        self.dispatch(level, fields, message.into(), Some(SourceLocation::caller()));
    }

    level_method!(trace, Level::Trace);
    level_method!(debug, Level::Debug);
    level_method!(info, Level::Info);
    level_method!(warn, Level::Warn);
    level_method!(error, Level::Error);
    level_method!(fatal, Level::Fatal);

    /// Enrich once and fan out to every stream accepting `level`.
    pub fn dispatch(&self, level: Level, fields: LogFields, message: String, src: Option<SourceLocation>) {
        if !self.enabled(level) {
            return;
        }
        let record = self.enrich(level, fields, message, src);
        for routed in self.streams.iter().filter(|s| s.accepts(level)) {
            let result = catch_unwind(AssertUnwindSafe(|| routed.stream.write(&record)));
            if result.is_err() {
                warn!(target_name = %routed.target, "log stream panicked while writing");
            }
        }
    }

    fn enrich(&self, level: Level, fields: LogFields, message: String, src: Option<SourceLocation>) -> LogRecord {
        let caps = &self.capabilities;
        let connection_id = caps.session_id();
        let user_info = caps.auth_info().filter(|auth| auth.has_active_meeting());

        LogRecord {
            name: self.name.clone(),
            level,
            time: Utc::now(),
            message,
            log_code: fields.log_code,
            extra_info: fields.extra_info,
            src,
            app_version: self.device.app_version.clone(),
            client_build: self.device.build_number,
            device_information: self.device.information(),
            connection_id,
            user_info,
            log_tag: None,
        }
    }

    /// Close every stream, in routing order.
    pub async fn close(&self) {
        for routed in &self.streams {
            routed.stream.close().await;
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("streams", &self.streams)
            .finish()
    }
}
