//! The connection state machine: wires `TCPSender` and `TCPReceiver`
//! together, stamps ACK/window fields on outbound segments, and handles
//! RST, passive/active close and the TIME_WAIT-equivalent linger.
//!
//! The state machine is never enumerated as an explicit eleven-value
//! enum; it is derived from sender/receiver progress, as in the
//! original design this crate is grounded on.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use log::{debug, warn};

use crate::byte_stream::ByteStream;
use crate::config::TcpConfig;
use crate::tcp::receiver::TCPReceiver;
use crate::tcp::segment::{Segment, SegmentHeader};
use crate::tcp::sender::TCPSender;

/// The local/remote IP and port four-tuple identifying a connection.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Tcp4Tuple {
    pub src: (Ipv4Addr, u16),
    pub dst: (Ipv4Addr, u16),
}

#[derive(Debug)]
pub struct TCPConnection {
    cfg: TcpConfig,
    sender: TCPSender,
    receiver: TCPReceiver,
    segments_out: VecDeque<Segment>,
    is_active: bool,
    linger_after_streams_finish: bool,
    ms_since_last_segment_received: u64,
}

impl TCPConnection {
    pub fn new(cfg: TcpConfig) -> Self {
        let sender = TCPSender::new(cfg.send_capacity, cfg.rt_timeout_ms, cfg.fixed_isn);
        let receiver = TCPReceiver::new(cfg.recv_capacity);
        TCPConnection {
            cfg,
            sender,
            receiver,
            segments_out: VecDeque::new(),
            is_active: true,
            linger_after_streams_finish: true,
            ms_since_last_segment_received: 0,
        }
    }

    pub fn inbound_stream(&self) -> &ByteStream {
        self.receiver.stream_out()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut ByteStream {
        self.receiver.stream_out_mut()
    }

    pub fn outbound_remaining_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.receiver.unassembled_bytes()
    }

    pub fn time_since_last_segment_received_ms(&self) -> u64 {
        self.ms_since_last_segment_received
    }

    pub fn segments_out(&mut self) -> &mut VecDeque<Segment> {
        &mut self.segments_out
    }

    pub fn active(&self) -> bool {
        self.is_active
    }

    pub fn connect(&mut self) {
        self.sender.fill_window();
        self.flush();
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = self.sender.stream_in_mut().write(data);
        self.sender.fill_window();
        self.flush();
        n
    }

    pub fn end_input_stream(&mut self) {
        self.sender.stream_in_mut().end_input();
        self.sender.fill_window();
        self.flush();
    }

    pub fn segment_received(&mut self, seg: &Segment) {
        if !self.is_active {
            return;
        }
        self.ms_since_last_segment_received = 0;

        if seg.header.rst {
            warn!("connection received RST, tearing down");
            self.set_error_and_deactivate();
            return;
        }

        self.receiver.segment_received(seg);
        if seg.header.ack {
            self.sender.ack_received(seg.header.ackno, seg.header.win);
        }

        // Passive-close detection: the peer's FIN has been fully
        // assembled but our own application hasn't closed its outbound
        // stream yet, so we are the passive closer and need not linger.
        if self.receiver.stream_out().input_ended() && !self.sender.stream_in().eof() {
            if self.linger_after_streams_finish {
                debug!("passive close detected, clearing linger");
            }
            self.linger_after_streams_finish = false;
        }

        // Keep-alive: a zero-length segment one byte behind our ackno
        // forces a bare ACK in reply.
        if seg.length_in_sequence_space() == 0 {
            if let Some(ackno) = self.receiver.ackno() {
                if seg.header.seqno == ackno.wrapping_pred() {
                    self.sender.send_empty_segment();
                }
            }
        }

        if seg.length_in_sequence_space() > 0 {
            self.sender.fill_window();
            if self.sender.segments_out().is_empty() {
                self.sender.send_empty_segment();
            }
        }

        self.flush();
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        if !self.is_active {
            return;
        }
        self.ms_since_last_segment_received += ms_since_last_tick;
        self.sender.tick(ms_since_last_tick as u32);

        if self.sender.consecutive_retransmissions() > self.cfg.max_retx_attempts {
            warn!("exceeded max retransmission attempts, sending RST");
            self.send_rst();
            self.set_error_and_deactivate();
            return;
        }

        self.flush();
        self.evaluate_shutdown();
    }

    fn clean_shutdown(&self) -> bool {
        let receiver_done = self.receiver.stream_out().input_ended();
        let sender_done = self.sender.stream_in().eof()
            && self.sender.next_seqno_absolute() == self.sender.stream_in().bytes_written() + 2
            && self.sender.bytes_in_flight() == 0;
        receiver_done && sender_done
    }

    fn evaluate_shutdown(&mut self) {
        if !self.clean_shutdown() {
            return;
        }
        if !self.linger_after_streams_finish {
            debug!("clean shutdown, no linger required, deactivating");
            self.is_active = false;
        } else if self.ms_since_last_segment_received >= 10 * self.cfg.rt_timeout_ms as u64 {
            debug!("linger expired, deactivating");
            self.is_active = false;
        }
    }

    /// Pops every segment the sender produced, stamps the receiver's
    /// ACK/window on it, and moves it onto this connection's outbound
    /// queue.
    fn flush(&mut self) {
        while let Some(mut seg) = self.sender.segments_out().pop_front() {
            if let Some(ackno) = self.receiver.ackno() {
                seg.header.ack = true;
                seg.header.ackno = ackno;
                seg.header.win = self.receiver.window_size().min(0xFFFF) as u16;
            }
            self.segments_out.push_back(seg);
        }
    }

    fn send_rst(&mut self) {
        self.segments_out.clear();
        let mut header = SegmentHeader {
            seqno: self.sender.next_seqno(),
            rst: true,
            ..Default::default()
        };
        if let Some(ackno) = self.receiver.ackno() {
            header.ack = true;
            header.ackno = ackno;
            header.win = self.receiver.window_size().min(0xFFFF) as u16;
        }
        self.segments_out.push_back(Segment::new(header, Vec::new()));
    }

    fn set_error_and_deactivate(&mut self) {
        self.receiver.stream_out_mut().set_error();
        self.sender.stream_in_mut().set_error();
        self.is_active = false;
    }
}

impl Drop for TCPConnection {
    fn drop(&mut self) {
        if self.is_active {
            warn!("dropping active connection, emitting RST");
            self.send_rst();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapping::WrappingInt32;

    fn cfg() -> TcpConfig {
        TcpConfig::default()
            .with_capacity(4000)
            .with_rt_timeout_ms(1000)
            .with_fixed_isn(WrappingInt32::new(0))
    }

    #[test]
    fn connect_emits_syn() {
        let mut c = TCPConnection::new(cfg());
        c.connect();
        let segs: Vec<_> = c.segments_out().drain(..).collect();
        assert_eq!(segs.len(), 1);
        assert!(segs[0].header.syn);
    }

    #[test]
    fn passive_close_clears_linger() {
        let mut c = TCPConnection::new(cfg());
        c.connect();
        c.segments_out().clear();

        let peer_syn = Segment::new(
            SegmentHeader {
                seqno: WrappingInt32::new(500),
                syn: true,
                ack: true,
                ackno: WrappingInt32::new(1),
                win: 100,
                ..Default::default()
            },
            Vec::new(),
        );
        c.segment_received(&peer_syn);

        let peer_fin = Segment::new(
            SegmentHeader {
                seqno: WrappingInt32::new(501),
                ack: true,
                ackno: WrappingInt32::new(1),
                win: 100,
                fin: true,
                ..Default::default()
            },
            Vec::new(),
        );
        c.segment_received(&peer_fin);

        assert!(c.inbound_stream().input_ended());
        assert!(!c.linger_after_streams_finish);
    }

    #[test]
    fn rst_errors_both_streams_and_deactivates() {
        let mut c = TCPConnection::new(cfg());
        c.connect();
        let rst = Segment::new(
            SegmentHeader {
                rst: true,
                ..Default::default()
            },
            Vec::new(),
        );
        c.segment_received(&rst);
        assert!(!c.active());
        assert!(c.inbound_stream().error());
    }

    #[test]
    fn retransmission_exhaustion_sends_rst_and_deactivates() {
        let mut c = TCPConnection::new(cfg());
        c.connect();
        c.segments_out().clear();
        let mut rto = 1000u64;
        for _ in 0..10 {
            c.tick(rto);
            rto *= 2;
            if !c.active() {
                break;
            }
        }
        assert!(!c.active());
        let segs: Vec<_> = c.segments_out().drain(..).collect();
        assert!(segs.iter().any(|s| s.header.rst));
    }
}
