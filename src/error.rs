// rloraprs - Error Module
// Error taxonomy shared by the transports, the codec and the gateway loop

use std::io;

/// Errors raised anywhere below the gateway loop.
///
/// None of these abort the process: the gateway logs them and carries on
/// at reduced function.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("not connected")]
    NotConnected,
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    #[error("frame of {len} bytes exceeds capacity of {capacity} bytes")]
    CapacityExceeded { len: usize, capacity: usize },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("radio error: {0}")]
    Radio(String),
}
