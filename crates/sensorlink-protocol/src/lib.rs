pub mod decoder;
pub mod frame;
pub mod sleep;
pub mod telemetry;

pub use decoder::FrameDecoder;
pub use frame::Frame;
pub use sleep::{encode_sleep_command, sleep_duration_for, sleep_duration_now};
pub use telemetry::{TelemetryReading, decode_hash_payload};
