use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use client_log_streams::capabilities::{Capabilities, RpcError};
use client_log_streams::config::StreamsConfig;
use client_log_streams::connectivity::ConnectivitySource;
use client_log_streams::device::DeviceFacts;
use client_log_streams::logger::Logger;
use client_log_streams::record::{AuthInfo, Level, LogFields};
use client_log_streams::registry::StreamContext;
use client_log_streams::transport::{HttpMethod, HttpTransport, TransportError};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, _method: HttpMethod, url: &str, body: String) -> Result<(), TransportError> {
        let body = serde_json::from_str(&body).map_err(|e| TransportError::Other(e.to_string()))?;
        self.sent.lock().unwrap().push((url.to_string(), body));
        Ok(())
    }
}

struct Fixture {
    caps: Arc<Capabilities>,
    net: ConnectivitySource,
    transport: Arc<RecordingTransport>,
    console: Arc<Mutex<Vec<u8>>>,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            caps: Arc::new(Capabilities::new()),
            net: ConnectivitySource::new(true),
            transport: Arc::new(RecordingTransport::default()),
            console: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn logger(&self, config: Value) -> Logger {
        let device = DeviceFacts {
            app_version: "1.8.2".into(),
            build_number: 182,
            ..DeviceFacts::from_host()
        };
        let ctx = StreamContext::new(device)
            .with_capabilities(self.caps.clone())
            .with_connectivity(self.net.clone())
            .with_transport(self.transport.clone())
            .with_console_writer(self.console.clone());
        let config = StreamsConfig::from_value(&config).unwrap();
        Logger::from_config(&config, &ctx).unwrap()
    }

    fn console_lines(&self) -> Vec<String> {
        let bytes = self.console.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap().lines().map(str::to_string).collect()
    }

    fn serve_host(&self, host: &'static str) {
        self.caps.set_auth_info_provider(move || {
            Some(AuthInfo {
                host: Some(host.to_string()),
                ..AuthInfo::default()
            })
        });
    }

    fn flushed_messages(&self, idx: usize) -> Vec<String> {
        self.transport.sent()[idx]
            .1
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["msg"].as_str().unwrap().to_string())
            .collect()
    }
}

#[test]
fn console_receives_one_write_per_record() {
    let fx = Fixture::new();
    let logger = fx.logger(json!({"console": {"enabled": true, "level": "debug"}}));

    logger.log(Level::Info, LogFields::new(), "hello");

    let lines = fx.console_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" INFO clientLogger: hello"), "{}", lines[0]);
}

#[test]
fn raw_console_line_carries_enrichment() {
    let fx = Fixture::new();
    fx.caps.set_session_id_provider(|| Some("conn-5".into()));
    let logger = fx.logger(json!({"console": {"enabled": true, "level": "debug", "format": "raw"}}));

    logger.log(Level::Info, LogFields::code("boot"), "hello");

    let line: Value = serde_json::from_str(&fx.console_lines()[0]).unwrap();
    assert_eq!(line["msg"], "hello");
    assert_eq!(line["level"], "info");
    assert_eq!(line["logCode"], "boot");
    assert_eq!(line["appVersion"], "1.8.2");
    assert_eq!(line["clientBuild"], 182);
    assert_eq!(line["connectionId"], "conn-5");
    assert_eq!(line["deviceInformation"]["systemName"], std::env::consts::OS);
}

#[test]
fn level_filtering_is_per_stream() {
    let fx = Fixture::new();
    let logger = fx.logger(json!({
        "console": {"enabled": true, "level": "warn"},
        "mystery": {"enabled": true, "level": "trace"},
    }));

    logger.debug(LogFields::new(), "only mystery");
    logger.error(LogFields::new(), "both");

    let lines = fx.console_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("only mystery"));
    assert!(lines[1].ends_with("both"));
    assert!(lines[2].ends_with("both"));
}

#[tokio::test(start_paused = true)]
async fn offline_burst_is_flushed_once_on_reconnect() {
    let fx = Fixture::new();
    fx.serve_host("example.com");
    let logger = fx.logger(json!({
        "external": {"enabled": true, "level": "warn", "route": "logs"},
    }));
    fx.net.set_online(false);

    logger.log(Level::Info, LogFields::new(), "below threshold");
    for m in ["x1", "x2", "x3"] {
        logger.log(Level::Error, LogFields::new(), m);
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(fx.transport.sent().is_empty());

    fx.net.set_online(true);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "https://example.com/logs");
    assert_eq!(fx.flushed_messages(0), vec!["x1", "x2", "x3"]);
}

#[tokio::test(start_paused = true)]
async fn bounded_buffer_keeps_newest_records() {
    let fx = Fixture::new();
    fx.serve_host("example.com");
    let logger = fx.logger(json!({
        "external": {"enabled": true, "level": "warn", "route": "logs", "bufferSize": 2},
    }));
    fx.net.set_online(false);

    for m in ["A", "B", "C"] {
        logger.log(Level::Error, LogFields::new(), m);
    }
    fx.net.set_online(true);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(fx.transport.sent().len(), 1);
    assert_eq!(fx.flushed_messages(0), vec!["B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_remote_stream() {
    let fx = Fixture::new();
    fx.serve_host("logs.example.org");
    let logger = fx.logger(json!({
        "external": {
            "enabled": true,
            "level": "info",
            "route": "client/log",
            "flushOnClose": true,
            "throttleInterval": 600000,
            "logTag": "rn-client",
        },
    }));

    logger.info(LogFields::new(), "last words");
    logger.close().await;

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "https://logs.example.org/client/log");
    assert_eq!(sent[0].1[0]["logTag"], "rn-client");
}

#[test]
fn default_rpc_invoker_is_silent() {
    let fx = Fixture::new();
    let logger = fx.logger(json!({"server": {"enabled": true, "level": "info"}}));
    logger.log(Level::Info, LogFields::new(), "x");
    assert!(fx.console_lines().is_empty());
}

#[test]
fn failing_rpc_invoker_never_reaches_producer() {
    let fx = Fixture::new();
    fx.caps.set_rpc_invoker(|method, _| {
        Err(RpcError::Failed {
            method: method.to_string(),
            message: "not connected".into(),
        })
    });
    let logger = fx.logger(json!({
        "server": {"enabled": true, "level": "info"},
        "console": {"enabled": true, "level": "info"},
    }));

    for _ in 0..3 {
        logger.warn(LogFields::new(), "keep going");
    }
    fx.caps.set_rpc_invoker(|_, _| panic!("rpc transport crashed"));
    logger.warn(LogFields::new(), "still going");

    assert_eq!(fx.console_lines().len(), 4);
}

#[test]
fn rpc_call_reflects_latest_injected_invoker() {
    let fx = Fixture::new();
    let logger = fx.logger(json!({"server": {"enabled": true, "level": "debug"}}));

    logger.info(LogFields::new(), "before wiring");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    fx.caps.set_rpc_invoker(move |method, args| {
        sink.lock().unwrap().push((method.to_string(), args.to_vec()));
        Ok(())
    });
    logger.info(
        LogFields::code("audio_devices_changed").with_extra(json!({"available": ["speaker"]})),
        "after wiring",
    );

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "logClient");
    assert_eq!(
        calls[0].1,
        vec![
            json!("info"),
            json!("after wiring"),
            json!("audio_devices_changed"),
            json!({"available": ["speaker"]}),
        ]
    );
}
