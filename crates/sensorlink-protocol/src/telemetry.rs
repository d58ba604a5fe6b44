//! Telemetry decoder: turns a HASH frame's ASCII payload into typed readings.
//!
//! Payload shape: `HASH:<hex>,VOLT:<number>,TEMP:<number>[,<...>]`. Unknown
//! trailing fields are ignored; this is a narrow field-scanner over a fixed
//! set of recognized keys rather than a generic delimited-string splitter, so
//! adding a field upstream never silently breaks an existing accessor.

use sensorlink_core::constants::{DUMMY_HASH_LENGTH, TEMP_SENTINEL_INVALID};
use sensorlink_core::{Error, Result};

/// Decoded contents of one HASH payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    /// `true` when the hash field is the all-zero sentinel meaning "no image follows".
    pub is_dummy_hash: bool,
}

/// Decode a HASH frame payload.
///
/// # Errors
/// Returns `Error::InvalidHashEncoding` if the payload is not valid ASCII, or
/// if it does not begin with the literal `HASH:` prefix.
pub fn decode_hash_payload(payload: &[u8]) -> Result<TelemetryReading> {
    let text = std::str::from_utf8(payload).map_err(|_| Error::InvalidHashEncoding)?;
    if !text.is_ascii() {
        return Err(Error::InvalidHashEncoding);
    }

    let mut fields = text.split(',');
    let hash_field = fields.next().ok_or(Error::InvalidHashEncoding)?;
    let hash_value = hash_field.strip_prefix("HASH:").ok_or(Error::InvalidHashEncoding)?;
    let is_dummy_hash = is_dummy_hash(hash_value);

    let mut voltage = None;
    let mut temperature = None;

    for field in fields {
        match recognize_field(field) {
            Some(RecognizedField::Voltage(raw)) => {
                voltage = raw.parse::<f64>().ok();
            }
            Some(RecognizedField::Temperature(raw)) => {
                temperature = if raw.trim() == TEMP_SENTINEL_INVALID {
                    None
                } else {
                    raw.parse::<f64>().ok()
                };
            }
            None => {} // unrecognized field, tolerated
        }
    }

    Ok(TelemetryReading { voltage, temperature, is_dummy_hash })
}

enum RecognizedField<'a> {
    Voltage(&'a str),
    Temperature(&'a str),
}

fn recognize_field(field: &str) -> Option<RecognizedField<'_>> {
    if let Some(raw) = field.strip_prefix("VOLT:") {
        Some(RecognizedField::Voltage(raw))
    } else if let Some(raw) = field.strip_prefix("TEMP:") {
        Some(RecognizedField::Temperature(raw))
    } else {
        None
    }
}

fn is_dummy_hash(hex: &str) -> bool {
    hex.len() == DUMMY_HASH_LENGTH && hex.bytes().all(|b| b == b'0')
}
