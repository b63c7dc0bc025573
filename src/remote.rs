//! Remote HTTP delivery.
//!
//! Records are buffered in a bounded FIFO and shipped by a background task
//! in batches: one flush per throttle window, only while the connectivity
//! monitor reports online. The endpoint host comes from the live auth
//! context, so it is resolved again for every flush. Failed batches go back
//! to the front of the buffer and are retried on the next window.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::capabilities::Capabilities;
use crate::connectivity::ConnectivityMonitor;
use crate::device::{DeviceFacts, DeviceInformation};
use crate::record::{AuthInfo, LogRecord};
use crate::registry::ConfigError;
use crate::stream::LogStream;
use crate::transport::{HttpMethod, HttpTransport, DEFAULT_REQUEST_TIMEOUT};

const MIN_THROTTLE_INTERVAL: Duration = Duration::from_millis(10);
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// What to do with a new record when the buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered record to make room.
    #[default]
    DropOldest,
    /// Keep the buffer as is and discard the incoming record.
    DropNewest,
}

/// What to do with a record written while no endpoint host is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingHostPolicy {
    /// Keep it buffered until a host shows up.
    #[default]
    Buffer,
    /// Discard it.
    Drop,
}

/// Options of the `external` target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOptions {
    /// Path appended to `https://{host}/`.
    pub route: String,
    #[serde(default)]
    pub log_tag: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_throttle_interval", deserialize_with = "millis")]
    pub throttle_interval: Duration,
    #[serde(default)]
    pub flush_on_close: bool,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default)]
    pub on_missing_host: MissingHostPolicy,
    #[serde(default = "default_close_timeout", deserialize_with = "millis")]
    pub close_timeout: Duration,
    #[serde(default = "default_request_timeout", deserialize_with = "millis")]
    pub request_timeout: Duration,
}

fn default_throttle_interval() -> Duration {
    Duration::from_millis(3000)
}

fn default_buffer_size() -> usize {
    1000
}

fn default_close_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl RemoteOptions {
    pub fn new(route: impl Into<String>) -> Self {
        RemoteOptions {
            route: route.into(),
            log_tag: None,
            method: HttpMethod::default(),
            throttle_interval: default_throttle_interval(),
            flush_on_close: false,
            buffer_size: default_buffer_size(),
            overflow: OverflowPolicy::default(),
            on_missing_host: MissingHostPolicy::default(),
            close_timeout: default_close_timeout(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Clamp degenerate values.
    fn normalized(mut self) -> Self {
        self.buffer_size = self.buffer_size.max(1);
        self.throttle_interval = self.throttle_interval.max(MIN_THROTTLE_INTERVAL);
        self
    }
}

/// Endpoint for a given host and route.
pub fn remote_endpoint_url(host: &str, route: &str) -> String {
    format!("https://{host}/{route}")
}

/// Stream that ships records to an HTTP log-ingestion endpoint.
pub struct RemoteStream {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    options: RemoteOptions,
    capabilities: Arc<Capabilities>,
    device: Arc<DeviceFacts>,
    transport: Arc<dyn HttpTransport>,
    state: Mutex<BufferState>,
    wake: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

#[derive(Default)]
struct BufferState {
    records: VecDeque<LogRecord>,
    /// Endpoint seen by writes since the last flush.
    url: Option<String>,
}

impl RemoteStream {
    /// Create the stream and spawn its delivery task on the current Tokio
    /// runtime.
    ///
    /// `monitor` must be a subscription dedicated to this stream; it is
    /// dropped when the stream shuts down.
    pub fn new(
        options: RemoteOptions,
        capabilities: Arc<Capabilities>,
        device: Arc<DeviceFacts>,
        transport: Arc<dyn HttpTransport>,
        monitor: ConnectivityMonitor,
    ) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime {
            target: "external".to_string(),
        })?;

        let shared = Arc::new(Shared {
            options: options.normalized(),
            capabilities,
            device,
            transport,
            state: Mutex::new(BufferState::default()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run(Arc::clone(&shared), monitor, cancel.clone()));

        Ok(RemoteStream {
            shared,
            cancel,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.shared.options
    }

    /// Buffered records, oldest first.
    pub fn pending(&self) -> Vec<LogRecord> {
        self.shared
            .state
            .lock()
            .map(|state| state.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records discarded by the overflow or missing-host policy.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Records acknowledged by the endpoint.
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }
}

impl Shared {
    fn resolve_url(&self) -> Option<String> {
        let auth = self.capabilities.auth_info()?;
        let host = auth.resolved_host()?;
        Some(remote_endpoint_url(host, &self.options.route))
    }

    /// Append to the buffer, applying the overflow policy.
    fn push(&self, state: &mut BufferState, record: LogRecord) {
        if state.records.len() >= self.options.buffer_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.options.overflow {
                OverflowPolicy::DropOldest => {
                    state.records.pop_front();
                    debug!(buffer_size = self.options.buffer_size, "log buffer full, evicting oldest record");
                }
                OverflowPolicy::DropNewest => {
                    debug!(buffer_size = self.options.buffer_size, "log buffer full, discarding record");
                    return;
                }
            }
        }
        state.records.push_back(record);
    }

    /// Put a failed batch back in front of newer records and re-apply the bound.
    fn requeue(&self, batch: Vec<LogRecord>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for record in batch.into_iter().rev() {
            state.records.push_front(record);
        }
        while state.records.len() > self.options.buffer_size {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.options.overflow {
                OverflowPolicy::DropOldest => state.records.pop_front(),
                OverflowPolicy::DropNewest => state.records.pop_back(),
            };
        }
    }

    /// Copy of `record` carrying the delivery-time context. Creation-time
    /// fields (time, message, level, source) are left untouched.
    fn shape(&self, record: &LogRecord, context: &DeliveryContext) -> LogRecord {
        let mut shaped = record.clone();
        shaped.app_version = self.device.app_version.clone();
        shaped.client_build = self.device.build_number;
        shaped.device_information = context.device_information.clone();
        if context.connection_id.is_some() {
            shaped.connection_id = context.connection_id.clone();
        }
        shaped.user_info = context.auth.clone().filter(|a| a.has_active_meeting());
        if let Some(tag) = &self.options.log_tag {
            shaped.log_tag = Some(tag.clone());
        }
        shaped
    }

    /// Send everything buffered as one batch.
    ///
    /// Returns `true` when nothing is left to deliver.
    async fn flush(&self) -> bool {
        let resolved = self.resolve_url();
        let (batch, url) = {
            let Ok(mut state) = self.state.lock() else {
                return true;
            };
            let cached = state.url.take();
            if state.records.is_empty() {
                return true;
            }
            match resolved.or(cached) {
                Some(url) => (state.records.drain(..).collect::<Vec<_>>(), url),
                None => {
                    trace!(pending = state.records.len(), "no log endpoint host yet, keeping records");
                    return false;
                }
            }
        };

        let context = DeliveryContext {
            auth: self.capabilities.auth_info(),
            connection_id: self.capabilities.session_id(),
            device_information: self.device.information(),
        };
        let payload: Vec<LogRecord> = batch.iter().map(|r| self.shape(r, &context)).collect();
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, records = batch.len(), "failed to serialize log batch, dropping it");
                self.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
                return self.is_empty();
            }
        };

        match self.transport.send(self.options.method, &url, body).await {
            Ok(()) => {
                trace!(records = batch.len(), url = %url, "log batch delivered");
                self.delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.is_empty()
            }
            Err(e) => {
                warn!(error = %e, records = batch.len(), url = %url, "log batch delivery failed, will retry");
                self.requeue(batch);
                false
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.state.lock().map(|s| s.records.is_empty()).unwrap_or(true)
    }

    fn discard(&self) -> usize {
        self.state
            .lock()
            .map(|mut s| {
                let n = s.records.len();
                s.records.clear();
                n
            })
            .unwrap_or(0)
    }
}

struct DeliveryContext {
    auth: Option<AuthInfo>,
    connection_id: Option<String>,
    device_information: DeviceInformation,
}

/// Delivery loop: wait for a write, let the throttle window pass, wait for
/// connectivity, flush. Exits on cancellation after the close flush.
async fn run(shared: Arc<Shared>, mut monitor: ConnectivityMonitor, cancel: CancellationToken) {
    let throttle = shared.options.throttle_interval;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.wake.notified() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(throttle) => {}
        }
        if !monitor.is_online() {
            trace!("offline, holding log records");
            tokio::select! {
                _ = cancel.cancelled() => break,
                online = monitor.wait_online() => {
                    if !online {
                        cancel.cancelled().await;
                        break;
                    }
                }
            }
        }
        if !shared.flush().await {
            shared.wake.notify_one();
        }
    }

    if shared.options.flush_on_close && monitor.is_online() {
        match timeout(shared.options.close_timeout, shared.flush()).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                let lost = shared.discard();
                warn!(records = lost, "log records not delivered before close");
            }
        }
    } else {
        let lost = shared.discard();
        if lost > 0 {
            debug!(records = lost, "discarding buffered log records on close");
        }
    }
    drop(monitor);
}

#[async_trait::async_trait]
impl LogStream for RemoteStream {
    fn name(&self) -> &'static str {
        "external"
    }

    fn write(&self, record: &LogRecord) {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            trace!("remote log stream closed, ignoring record");
            return;
        }

        let url = shared.resolve_url();
        {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            match url {
                Some(url) => {
                    if state.url.as_deref() != Some(url.as_str()) {
                        state.url = Some(url);
                    }
                }
                None if state.url.is_none()
                    && shared.options.on_missing_host == MissingHostPolicy::Drop =>
                {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("no log endpoint host, dropping record");
                    return;
                }
                None => {}
            }
            shared.push(&mut state, record.clone());
        }
        shared.wake.notify_one();
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.cancel.cancel();
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(mut handle) = handle {
            let limit = self.shared.options.close_timeout + CLOSE_GRACE;
            if timeout(limit, &mut handle).await.is_err() {
                handle.abort();
                warn!("remote log stream did not close in time");
            }
        }
    }
}

impl Drop for RemoteStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
