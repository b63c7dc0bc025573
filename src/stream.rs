use crate::record::LogRecord;
use async_trait::async_trait;

/// Destination for enriched [`LogRecord`]s.
///
/// The logger calls `write` synchronously on the producer's thread, so
/// implementations must return quickly and must not fail: any I/O is
/// handed off to a background task and any error is contained inside the
/// stream. A stream that needs to attach its own per-delivery fields
/// works on a clone; the shared record is never modified.
#[async_trait]
pub trait LogStream: Send + Sync {
    /// Short name used in diagnostics (`"console"`, `"external"`...).
    fn name(&self) -> &'static str;

    /// Accept one record for delivery.
    fn write(&self, record: &LogRecord);

    /// Release resources at teardown, delivering what is still buffered
    /// if the stream is configured to do so.
    ///
    /// Must complete in bounded time. Default implementation is a no-op.
    async fn close(&self) {}
}
