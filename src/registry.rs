use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::capabilities::Capabilities;
use crate::config::{StreamsConfig, TargetConfig};
use crate::connectivity::ConnectivitySource;
use crate::console::{stdout_writer, ConsoleOptions, ConsoleStream, ConsoleWriter};
use crate::device::DeviceFacts;
use crate::record::Level;
use crate::remote::{RemoteOptions, RemoteStream};
use crate::rpc::RpcStream;
use crate::stream::LogStream;
use crate::transport::{HttpTransport, TransportError};

/// Stream targets recognized in the configuration mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `console`: local console renderer.
    Console,
    /// `external`: remote HTTP ingestion endpoint.
    External,
    /// `server`: RPC to the application server.
    Server,
}

impl Target {
    pub fn from_name(name: &str) -> Option<Target> {
        match name {
            "console" => Some(Target::Console),
            "external" => Some(Target::External),
            "server" => Some(Target::Server),
            _ => None,
        }
    }
}

/// Error type returned when building streams from configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("log configuration must be an object keyed by target")]
    NotAnObject,

    #[error("log target `{target}` must be an object")]
    InvalidEntry { target: String },

    #[error("log target `{target}` is enabled but has no level")]
    MissingLevel { target: String },

    #[error("log target `{target}` has an invalid level: {source}")]
    InvalidLevel {
        target: String,
        source: serde_json::Error,
    },

    #[error("log target `{target}` has invalid options: {source}")]
    InvalidOptions {
        target: String,
        source: serde_json::Error,
    },

    #[error("log target `{target}` needs a running tokio runtime")]
    NoRuntime { target: String },

    #[error("http feature is not enabled and no transport was provided")]
    HttpFeatureDisabled,

    #[error("failed to create http transport: {0}")]
    Transport(#[from] TransportError),

    #[error("log configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A built stream paired with its minimum level.
#[derive(Clone)]
pub struct RoutedStream {
    pub target: String,
    pub level: Level,
    pub stream: Arc<dyn LogStream>,
}

impl RoutedStream {
    pub fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }
}

impl std::fmt::Debug for RoutedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedStream")
            .field("target", &self.target)
            .field("level", &self.level)
            .field("stream", &self.stream.name())
            .finish()
    }
}

/// Collaborators the streams are built with.
#[derive(Clone)]
pub struct StreamContext {
    pub capabilities: Arc<Capabilities>,
    pub connectivity: ConnectivitySource,
    pub device: Arc<DeviceFacts>,
    /// Transport for `external`; a `reqwest` one is created when unset.
    pub transport: Option<Arc<dyn HttpTransport>>,
    pub console_writer: ConsoleWriter,
}

impl StreamContext {
    /// Context wired to the process-wide capabilities and connectivity.
    pub fn new(device: DeviceFacts) -> Self {
        StreamContext {
            capabilities: Capabilities::global(),
            connectivity: ConnectivitySource::global(),
            device: Arc::new(device),
            transport: None,
            console_writer: stdout_writer(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<Capabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_connectivity(mut self, connectivity: ConnectivitySource) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_console_writer(mut self, writer: ConsoleWriter) -> Self {
        self.console_writer = writer;
        self
    }

    fn transport_for(&self, options: &RemoteOptions) -> Result<Arc<dyn HttpTransport>, ConfigError> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        #[cfg(feature = "http")]
        {
            let transport = crate::transport::ReqwestTransport::new(options.request_timeout)?;
            Ok(Arc::new(transport) as Arc<dyn HttpTransport>)
        }

        #[cfg(not(feature = "http"))]
        {
            let _ = options;
            Err(ConfigError::HttpFeatureDisabled)
        }
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("device", &self.device)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_options<T: DeserializeOwned>(target: &str, options: &Map<String, Value>) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|source| ConfigError::InvalidOptions {
        target: target.to_string(),
        source,
    })
}

/// Build one stream for a target entry.
///
/// Unrecognized target names get a console stream.
pub fn make_stream(entry: &TargetConfig, ctx: &StreamContext) -> Result<Arc<dyn LogStream>, ConfigError> {
    let target = entry.target.as_str();
    match Target::from_name(target) {
        Some(Target::Console) => {
            let options: ConsoleOptions = parse_options(target, &entry.options)?;
            Ok(Arc::new(ConsoleStream::with_writer(options, ctx.console_writer.clone())))
        }
        Some(Target::External) => {
            let options: RemoteOptions = parse_options(target, &entry.options)?;
            let transport = ctx.transport_for(&options)?;
            let stream = RemoteStream::new(
                options,
                Arc::clone(&ctx.capabilities),
                Arc::clone(&ctx.device),
                transport,
                ctx.connectivity.subscribe(),
            )?;
            Ok(Arc::new(stream))
        }
        Some(Target::Server) => Ok(Arc::new(RpcStream::new(Arc::clone(&ctx.capabilities)))),
        None => {
            let options = parse_options::<ConsoleOptions>(target, &entry.options).unwrap_or_else(|e| {
                warn!(target_name = target, error = %e, "ignoring options of unknown log target");
                ConsoleOptions::default()
            });
            debug!(target_name = target, "unknown log target, using console");
            Ok(Arc::new(ConsoleStream::with_writer(options, ctx.console_writer.clone())))
        }
    }
}

/// Turn the configuration mapping into routed streams, in mapping order.
///
/// Disabled entries are skipped. An enabled entry without a level, or with
/// options its target cannot use, fails the whole build.
pub fn build_streams(config: &StreamsConfig, ctx: &StreamContext) -> Result<Vec<RoutedStream>, ConfigError> {
    let mut streams = Vec::new();
    for entry in config.entries().iter().filter(|e| e.enabled) {
        let level = entry.level.ok_or_else(|| ConfigError::MissingLevel {
            target: entry.target.clone(),
        })?;
        let stream = make_stream(entry, ctx)?;
        debug!(target_name = %entry.target, %level, "log stream ready");
        streams.push(RoutedStream {
            target: entry.target.clone(),
            level,
            stream,
        });
    }
    Ok(streams)
}
