//! Serial transport adapter: bridges a blocking `serialport` handle to the
//! core's async [`Transport`](sensorlink_core::Transport) trait.

pub mod serial;

pub use serial::SerialTransport;
