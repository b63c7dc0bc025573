use std::sync::{Arc, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::config::StreamsConfig;
use crate::device::DeviceFacts;
use crate::layer::PipelineLayer;
use crate::logger::Logger;
use crate::record::{Level, LogFields, SourceLocation};
use crate::registry::{ConfigError, StreamContext};

static GLOBAL_LOGGER: OnceLock<Arc<Logger>> = OnceLock::new();
static FALLBACK_LOGGER: OnceLock<Arc<Logger>> = OnceLock::new();

/// Error returned by the global initialization helpers.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("global logger is already initialized")]
    AlreadyInitialized,

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Options for [`init_tracing_with_config`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed next to [`PipelineLayer`] and `tracing` events are also
///   printed directly. Leave it off when the pipeline already has a
///   console stream, or events show up twice. The pipeline never forwards
///   this crate's own diagnostics (failed deliveries, RPC errors) to its
///   streams, so without this layer or a subscriber of your own they are
///   not printed anywhere.
#[derive(Clone, Debug, Default)]
pub struct TracingConfig {
    pub enable_stdout: bool,
}

/// Build the streams described by `config` and install the resulting
/// logger as the process-wide one.
///
/// Must be called at most once, from within a Tokio runtime when the
/// configuration enables the `external` target.
pub fn init_logger(config: &StreamsConfig, ctx: &StreamContext) -> Result<Arc<Logger>, InitError> {
    let logger = Arc::new(Logger::from_config(config, ctx)?);
    GLOBAL_LOGGER
        .set(Arc::clone(&logger))
        .map_err(|_| InitError::AlreadyInitialized)?;
    Ok(logger)
}

/// The process-wide logger.
///
/// Before [`init_logger`] runs this is a console-only logger built from
/// [`StreamsConfig::default`], so producers can log from process start.
pub fn global_logger() -> Arc<Logger> {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        return Arc::clone(logger);
    }
    FALLBACK_LOGGER
        .get_or_init(|| {
            let ctx = StreamContext::new(DeviceFacts::from_host());
            let logger = Logger::from_config(&StreamsConfig::default(), &ctx)
                .unwrap_or_else(|_| Logger::new(Vec::new(), &ctx));
            Arc::new(logger)
        })
        .clone()
}

/// Log through the process-wide logger. Never fails.
#[track_caller]
pub fn log(level: Level, fields: LogFields, message: impl Into<String>) {
    let src = SourceLocation::caller();
    global_logger().dispatch(level, fields, message.into(), Some(src));
}

/// Close the process-wide logger's streams, flushing where configured.
pub async fn shutdown() {
    if let Some(logger) = GLOBAL_LOGGER.get() {
        logger.close().await;
    }
}

/// Install a global `tracing` subscriber that forwards events into
/// `logger` through [`PipelineLayer`].
pub fn init_tracing_with_config(logger: Arc<Logger>, config: TracingConfig) -> Result<(), InitError> {
    let fmt_layer = config.enable_stdout.then(tracing_subscriber::fmt::layer);
    let subscriber = Registry::default()
        .with(PipelineLayer::new(logger))
        .with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Equivalent to [`init_tracing_with_config`] with [`TracingConfig::default`].
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), InitError> {
    init_tracing_with_config(logger, TracingConfig::default())
}
