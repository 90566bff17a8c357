//! Per-connection tunables. There is no on-disk configuration format in
//! scope for the core; this is a plain constructor-argument struct, the
//! same role the original lab's `tcp_config.hh` plays.

use crate::wrapping::WrappingInt32;

pub const MAX_PAYLOAD_SIZE: usize = 1452;
pub const MAX_RETX_ATTEMPTS: u32 = 8;
pub const ARP_ENTRY_TTL_MS: u32 = 30_000;
pub const ARP_REQUEST_SUPPRESSION_MS: u32 = 5_000;
pub const DEFAULT_CAPACITY: usize = 64_000;
pub const DEFAULT_RT_TIMEOUT_MS: u32 = 1_000;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub recv_capacity: usize,
    pub send_capacity: usize,
    pub rt_timeout_ms: u32,
    pub max_retx_attempts: u32,
    pub fixed_isn: Option<WrappingInt32>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            recv_capacity: DEFAULT_CAPACITY,
            send_capacity: DEFAULT_CAPACITY,
            rt_timeout_ms: DEFAULT_RT_TIMEOUT_MS,
            max_retx_attempts: MAX_RETX_ATTEMPTS,
            fixed_isn: None,
        }
    }
}

impl TcpConfig {
    pub fn with_fixed_isn(mut self, isn: WrappingInt32) -> Self {
        self.fixed_isn = Some(isn);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.recv_capacity = capacity;
        self.send_capacity = capacity;
        self
    }

    pub fn with_rt_timeout_ms(mut self, ms: u32) -> Self {
        self.rt_timeout_ms = ms;
        self
    }
}
