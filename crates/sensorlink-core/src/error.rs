use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame / protocol errors
    #[error("invalid frame header: {0}")]
    InvalidFrameHeader(String),

    #[error("frame payload too large: {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("implausible sequence number: {0}")]
    ImplausibleSequence(u32),

    #[error("end marker mismatch at offset {offset}")]
    EndMarkerMismatch { offset: usize },

    #[error("HASH payload is not valid ASCII/UTF-8")]
    InvalidHashEncoding,

    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    // Image assembly errors
    #[error("scratch blob missing for source {0}")]
    ScratchMissing(String),

    #[error("image too small: {size} bytes, minimum {min}")]
    ImageTooSmall { size: u64, min: u64 },

    #[error("image is missing its magic head marker")]
    MissingMagicHead,

    #[error("source {0} already finalized")]
    AlreadyFinalized(String),

    // Sink errors
    #[error("telemetry sink write failed: {0}")]
    TelemetrySink(String),

    #[error("image sink operation failed: {0}")]
    ImageSink(String),

    // Transport errors
    #[error("transport disconnected: {0}")]
    TransportDisconnected(String),

    #[error("transport write failed: {0}")]
    TransportWrite(String),

    // Configuration / startup errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO passthrough
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
