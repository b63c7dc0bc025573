use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, Duration};

use client_log_streams::capabilities::Capabilities;
use client_log_streams::config::StreamsConfig;
use client_log_streams::device::DeviceFacts;
use client_log_streams::logger::Logger;
use client_log_streams::record::{AuthInfo, Level, LogFields};
use client_log_streams::registry::StreamContext;
use client_log_streams::transport::{HttpMethod, HttpTransport, TransportError};

/// Transport that only counts what it would have sent.
#[derive(Default)]
struct CountingTransport {
    requests: AtomicU64,
    bytes: AtomicU64,
}

#[async_trait]
impl HttpTransport for CountingTransport {
    async fn send(&self, _method: HttpMethod, _url: &str, body: String) -> Result<(), TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(body.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let caps = Arc::new(Capabilities::new());
    caps.set_auth_info_provider(|| {
        Some(AuthInfo {
            host: Some("ingest.example.com".into()),
            ..AuthInfo::default()
        })
    });

    let transport = Arc::new(CountingTransport::default());
    let ctx = StreamContext::new(DeviceFacts::from_host())
        .with_capabilities(caps)
        .with_transport(transport.clone());
    let config = StreamsConfig::from_value(&json!({
        "external": {
            "enabled": true,
            "level": "info",
            "route": "logs",
            "throttleInterval": 200,
            "bufferSize": 50000,
            "flushOnClose": true,
        },
    }))?;
    let logger = Logger::from_config(&config, &ctx)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.log(
            Level::Error,
            LogFields::code("load_test").with_extra(json!({ "iteration": i })),
            "burst load test error",
        );
    }

    let elapsed = start.elapsed();
    println!(
        "burst: logged {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sleep(Duration::from_secs(1)).await;
    logger.close().await;

    println!(
        "burst: {} requests, {} bytes",
        transport.requests.load(Ordering::Relaxed),
        transport.bytes.load(Ordering::Relaxed)
    );
    Ok(())
}
