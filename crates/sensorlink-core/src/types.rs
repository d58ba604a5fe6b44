use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source identifier: six opaque bytes naming a remote sensor node (its gateway MAC).
///
/// Equality and hashing are by byte sequence. Display renders as colon-separated
/// lowercase hex, matching the form used in the `CMD_SEND_ESP_NOW` wire command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid([u8; 6]);

impl Sid {
    pub fn new(bytes: [u8; 6]) -> Self {
        Sid(bytes)
    }

    /// Build a `Sid` from a byte slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrameHeader` if `bytes` is not exactly 6 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 6] = bytes.try_into().map_err(|_| {
            Error::InvalidFrameHeader(format!("source id must be 6 bytes, got {}", bytes.len()))
        })?;
        Ok(Sid(arr))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Render as colon-separated lowercase hex, e.g. `01:02:03:04:05:06`.
    #[must_use]
    pub fn to_hex_colon(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
    }

    /// Render as a filesystem-safe token (no colons), e.g. `010203040506`.
    #[must_use]
    pub fn to_hex_compact(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_colon())
    }
}

/// Frame type as carried in the wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    Hash = 1,
    Data = 2,
    Eof = 3,
}

impl FrameType {
    /// Decode a wire type byte, returning `None` for reserved/unknown values
    /// (the caller logs and drops these rather than treating them as an error).
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameType::Hash),
            2 => Some(FrameType::Data),
            3 => Some(FrameType::Eof),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Hash => write!(f, "HASH"),
            FrameType::Data => write!(f, "DATA"),
            FrameType::Eof => write!(f, "EOF"),
        }
    }
}

/// Operating mode for image assembly, selected on the CLI.
///
/// Both modes share the same assembler/sink contract; only the scheduling of
/// `append` calls relative to arrival differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssemblyMode {
    /// Buffer chunks into the scratch blob, validate and move on finalize.
    #[default]
    Legacy,
    /// Append chunks as received; finalize only validates and moves.
    Streaming,
}

impl std::str::FromStr for AssemblyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" => Ok(AssemblyMode::Legacy),
            "streaming" => Ok(AssemblyMode::Streaming),
            other => Err(Error::Config(format!(
                "invalid mode '{other}', expected 'legacy' or 'streaming'"
            ))),
        }
    }
}

impl fmt::Display for AssemblyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyMode::Legacy => write!(f, "legacy"),
            AssemblyMode::Streaming => write!(f, "streaming"),
        }
    }
}
