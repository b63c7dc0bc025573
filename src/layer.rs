use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::logger::Logger;
use crate::record::{Level, LogFields, SourceLocation};

/// Field name mapped onto [`LogFields::log_code`].
pub const LOG_CODE_FIELD: &str = "log_code";

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that feeds `tracing` events into a [`Logger`].
///
/// `tracing::info!(log_code = "app_locale_change", lang = "en", "Change
/// locale successfully")` becomes an `info` record with that log code and
/// `{"lang": "en"}` as extra info. Events emitted by this crate itself are
/// skipped so pipeline diagnostics never loop back into the pipeline.
pub struct PipelineLayer {
    logger: Arc<Logger>,
}

impl PipelineLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        PipelineLayer { logger }
    }
}

pub fn level_from_tracing(level: &tracing::Level) -> Level {
    if *level == tracing::Level::TRACE {
        Level::Trace
    } else if *level == tracing::Level::DEBUG {
        Level::Debug
    } else if *level == tracing::Level::INFO {
        Level::Info
    } else if *level == tracing::Level::WARN {
        Level::Warn
    } else {
        Level::Error
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = level_from_tracing(meta.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;
        let mut log_code: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
            log_code: &mut log_code,
        };
        event.record(&mut visitor);

        let src = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(SourceLocation {
                file: file.to_string(),
                line,
            }),
            _ => None,
        };
        let log_fields = LogFields {
            log_code,
            extra_info: (!fields.is_empty()).then(|| Value::Object(fields)),
        };
        self.logger
            .dispatch(level, log_fields, message.unwrap_or_default(), src);
    }
}

struct FieldVisitor<'a> {
    fields: &'a mut Map<String, Value>,
    message: &'a mut Option<String>,
    log_code: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => *self.message = Some(value.to_string()),
            LOG_CODE_FIELD => *self.log_code = Some(value.to_string()),
            _ => self.insert(field, Value::from(value)),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => *self.message = Some(rendered),
            LOG_CODE_FIELD => *self.log_code = Some(rendered.trim_matches('"').to_string()),
            _ => self.insert(field, Value::String(rendered)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::connectivity::ConnectivitySource;
    use crate::device::DeviceFacts;
    use crate::record::LogRecord;
    use crate::registry::{RoutedStream, StreamContext};
    use crate::stream::LogStream;
    use serde_json::json;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Default)]
    struct Captured(Mutex<Vec<LogRecord>>);

    impl LogStream for Captured {
        fn name(&self) -> &'static str {
            "captured"
        }

        fn write(&self, record: &LogRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    fn logger(level: Level, captured: Arc<Captured>) -> Arc<Logger> {
        let ctx = StreamContext::new(DeviceFacts::default())
            .with_capabilities(Arc::new(Capabilities::new()))
            .with_connectivity(ConnectivitySource::new(true));
        let routed = RoutedStream {
            target: "captured".into(),
            level,
            stream: captured,
        };
        Arc::new(Logger::new(vec![routed], &ctx))
    }

    #[test]
    fn tracing_events_become_records() {
        let captured = Arc::new(Captured::default());
        let subscriber = Registry::default().with(PipelineLayer::new(logger(Level::Info, captured.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "app", "too quiet");
            tracing::warn!(
                target: "app",
                log_code = "app_locale_change",
                lang = "en",
                attempt = 2,
                "Change locale error"
            );
        });

        let records = captured.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.message, "Change locale error");
        assert_eq!(record.log_code.as_deref(), Some("app_locale_change"));
        assert_eq!(record.extra_info, Some(json!({"lang": "en", "attempt": 2})));
        assert!(record.src.is_some());
    }

    #[test]
    fn own_diagnostics_are_not_forwarded() {
        let captured = Arc::new(Captured::default());
        let subscriber = Registry::default().with(PipelineLayer::new(logger(Level::Trace, captured.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "client_log_streams::remote", "log batch delivery failed");
            tracing::info!(target: "app", "kept");
        });

        let records = captured.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
        assert_eq!(records[0].extra_info, None);
    }

    #[test]
    fn maps_every_tracing_level() {
        assert_eq!(level_from_tracing(&tracing::Level::TRACE), Level::Trace);
        assert_eq!(level_from_tracing(&tracing::Level::ERROR), Level::Error);
    }
}
