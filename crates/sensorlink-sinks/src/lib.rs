//! Concrete collaborator adapters behind the core's narrow sink traits.
//!
//! - [`InfluxTelemetrySink`] writes decoded readings to an InfluxDB 2.x bucket
//!   over its HTTP line-protocol write endpoint.
//! - [`FilesystemImageSink`] persists finalized image transfers under a
//!   configured root directory, staging each transfer in a scratch file first.
//!
//! Both fall back to safe no-ops when unconfigured or when `IS_TEST_ENV` is
//! set, so the engine never fails to start without a time-series store or a
//! writable filesystem mounted at the expected path for local development.

pub mod filesystem;
pub mod influx;

pub use filesystem::{FilesystemImageSink, FilesystemSinkConfig};
pub use influx::{InfluxConfig, InfluxTelemetrySink};
