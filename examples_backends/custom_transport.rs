use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use client_log_streams::capabilities;
use client_log_streams::config::StreamsConfig;
use client_log_streams::connectivity::ConnectivitySource;
use client_log_streams::device::{parse_build_number, DeviceFacts};
use client_log_streams::init::{init_logger, init_tracing, shutdown};
use client_log_streams::record::AuthInfo;
use client_log_streams::registry::StreamContext;
use client_log_streams::transport::{HttpMethod, HttpTransport, TransportError};

/// Example of delivering the `external` stream through a completely custom
/// transport by implementing the `HttpTransport` trait directly. Imagine
/// this wraps an HTTP client the host application already owns. For the
/// sake of example we just print the batch.
struct PrintingTransport;

#[async_trait]
impl HttpTransport for PrintingTransport {
    async fn send(&self, method: HttpMethod, url: &str, body: String) -> Result<(), TransportError> {
        println!("[{} {}] {}", method.as_str(), url, body);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = json!({
        "clientLog": {
            "console": {"enabled": true, "level": "debug"},
            "external": {"enabled": true, "level": "warn", "route": "html5client/log", "flushOnClose": true},
            "server": {"enabled": true, "level": "info"},
        },
    });

    let device = DeviceFacts {
        app_version: "1.0.0".into(),
        build_number: parse_build_number("100"),
        brand: "example".into(),
        ..DeviceFacts::from_host()
    };
    let ctx = StreamContext::new(device).with_transport(Arc::new(PrintingTransport));
    let logger = init_logger(&StreamsConfig::from_settings(&settings)?, &ctx)?;
    init_tracing(logger.clone())?;

    // Session bootstrap wires the real providers later on.
    tracing::info!(log_code = "app_start", "custom transport example started");

    capabilities::set_auth_info_provider(|| {
        Some(AuthInfo {
            host: Some("meet.example.com".into()),
            meeting_id: Some("demo-meeting".into()),
            ..AuthInfo::default()
        })
    });
    capabilities::set_session_id_provider(|| Some("session-1".into()));
    capabilities::set_rpc_invoker(|method, args| {
        println!("[rpc] {method}({args:?})");
        Ok(())
    });
    ConnectivitySource::global().set_online(true);

    tracing::error!(log_code = "audio_join_failed", reason = "permission denied", "could not join audio");

    shutdown().await;
    Ok(())
}
