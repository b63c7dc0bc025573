use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::SecondsFormat;
use serde::Deserialize;

use crate::record::LogRecord;
use crate::stream::LogStream;

/// Destination the console stream renders into. Stdout by default.
pub type ConsoleWriter = Arc<Mutex<dyn Write + Send>>;

pub fn stdout_writer() -> ConsoleWriter {
    Arc::new(Mutex::new(std::io::stdout()))
}

/// How records are rendered on the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleFormat {
    /// `time LEVEL name: message [logCode] {extraInfo}`
    #[default]
    Formatted,
    /// One JSON object per line.
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleOptions {
    #[serde(default)]
    pub format: ConsoleFormat,
}

/// Writes every record to the local console immediately.
pub struct ConsoleStream {
    format: ConsoleFormat,
    writer: ConsoleWriter,
}

impl ConsoleStream {
    pub fn new(options: ConsoleOptions) -> Self {
        Self::with_writer(options, stdout_writer())
    }

    pub fn with_writer(options: ConsoleOptions, writer: ConsoleWriter) -> Self {
        ConsoleStream {
            format: options.format,
            writer,
        }
    }

    fn render(&self, record: &LogRecord) -> String {
        match self.format {
            ConsoleFormat::Formatted => render_formatted(record),
            ConsoleFormat::Raw => {
                serde_json::to_string(record).unwrap_or_else(|_| render_formatted(record))
            }
        }
    }
}

fn render_formatted(record: &LogRecord) -> String {
    let mut line = format!(
        "{} {:>5} {}: {}",
        record.time.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.level.as_str().to_ascii_uppercase(),
        record.name,
        record.message,
    );
    if let Some(code) = &record.log_code {
        line.push_str(&format!(" [{code}]"));
    }
    if let Some(extra) = &record.extra_info {
        line.push(' ');
        line.push_str(&extra.to_string());
    }
    line
}

impl LogStream for ConsoleStream {
    fn name(&self) -> &'static str {
        "console"
    }

    fn write(&self, record: &LogRecord) {
        let line = self.render(record);
        if let Ok(mut out) = self.writer.lock() {
            let _ = writeln!(out, "{line}");
        }
    }
}
