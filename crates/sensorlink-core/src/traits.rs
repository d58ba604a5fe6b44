//! Collaborator traits: the narrow interfaces the engine depends on instead of
//! depending on InfluxDB, the filesystem, or `serialport` directly.
//!
//! Concrete adapters (`sensorlink-sinks`, `sensorlink-transport`) implement
//! these; tests implement them with in-memory fakes. All methods use native
//! `async fn` (RPITIT), so no `async_trait` macro is needed anywhere in this
//! workspace.

#![allow(async_fn_in_trait)]

use crate::{Result, Sid};

/// Write-only sink for decoded telemetry readings.
///
/// Call semantics are fire-and-forget: the engine invokes `write` and moves
/// on regardless of the result, logging failures itself. A sink must not
/// block the caller beyond its own bounded timeout.
pub trait TelemetrySink: Send + Sync {
    /// Record one reading for `source_id` at `timestamp` (Unix epoch, nanoseconds).
    ///
    /// `voltage` and `temperature` are independently optional: a HASH payload
    /// that decoded neither is a no-op, not an error.
    async fn write(
        &self,
        source_id: Sid,
        voltage: Option<f64>,
        temperature: Option<f64>,
        timestamp_nanos: i64,
    ) -> Result<()>;
}

/// Opaque handle to one in-progress image transfer, scoped to the sink that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub Sid);

/// Streaming write interface for image transfers.
///
/// `open` is called at most once per image transfer (the image assembler is
/// responsible for not re-opening a handle that already exists); `append` may
/// be called any number of times; exactly one of `close` or `discard` ends
/// the transfer.
pub trait ImageSink: Send + Sync {
    /// Begin a new image transfer for `source_id`, returning a handle scoped to it.
    async fn open(&self, source_id: Sid) -> Result<ImageHandle>;

    /// Append `bytes` to the open transfer identified by `handle`.
    async fn append(&self, handle: ImageHandle, bytes: &[u8]) -> Result<()>;

    /// Validate and persist the transfer, returning its final location.
    ///
    /// # Errors
    /// Returns an error if validation fails (size, magic head) — the caller
    /// decides whether that error is fatal to the rest of the EOF handling.
    async fn close(&self, handle: ImageHandle) -> Result<String>;

    /// Abandon the transfer, discarding any bytes written so far.
    ///
    /// Must be safe to call on a handle that was already closed or discarded
    /// (idempotent).
    async fn discard(&self, handle: ImageHandle);
}

impl<S: ImageSink> ImageSink for std::sync::Arc<S> {
    async fn open(&self, source_id: Sid) -> Result<ImageHandle> {
        (**self).open(source_id).await
    }

    async fn append(&self, handle: ImageHandle, bytes: &[u8]) -> Result<()> {
        (**self).append(handle, bytes).await
    }

    async fn close(&self, handle: ImageHandle) -> Result<String> {
        (**self).close(handle).await
    }

    async fn discard(&self, handle: ImageHandle) {
        (**self).discard(handle).await
    }
}

/// A duplex byte pipe to the serial gateway.
///
/// The engine never manages reconnection itself — `read` returning `Ok(0)` or
/// an error signals transport loss to the caller (the connection supervisor),
/// which owns the reconnect loop.
pub trait Transport: Send {
    /// Read the next chunk of bytes, blocking (async) until at least one byte
    /// is available. Returns `Ok(0)` on a clean transport close.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `bytes` to the transport in full.
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;
}
