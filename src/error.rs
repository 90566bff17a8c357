//! Error types for the boundary-facing code around the core. The core
//! components themselves (`ByteStream`, `StreamReassembler`,
//! `TCPReceiver`, `TCPSender`, `TCPConnection`, `NetworkInterface`,
//! `Router`) never return these: malformed or out-of-window input is
//! logged and silently dropped, per the stack's no-exceptions-across-
//! component-boundaries design.

use thiserror::Error;

/// Failure to decode a `Segment` from wire bytes.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("tcp header too short: {0} bytes")]
    HeaderTooShort(usize),
    #[error("failed to parse tcp header: {0}")]
    HeaderParse(String),
}

/// Failures from the host-facing TUN glue. This is demo/driver code,
/// outside the protocol core, and is allowed a conventional `Result`
/// API since nothing downstream depends on silent recovery.
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("failed to open tun device: {0}")]
    Open(#[source] std::io::Error),
    #[error("i/o error on tun device: {0}")]
    Io(#[source] std::io::Error),
    #[error("port {0} already bound")]
    PortInUse(u16),
}

impl From<std::io::Error> for InterfaceError {
    fn from(e: std::io::Error) -> Self {
        InterfaceError::Io(e)
    }
}
