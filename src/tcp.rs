//! The TCP endpoint: reassembly, sliding-window sending, flow-control
//! receiving, and the connection state machine that integrates them.

pub mod connection;
pub mod receiver;
pub mod segment;
pub mod sender;

pub use connection::{Tcp4Tuple, TCPConnection};
pub use receiver::TCPReceiver;
pub use segment::{Segment, SegmentHeader};
pub use sender::TCPSender;
