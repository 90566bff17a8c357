//! Generates SYN/data/FIN segments under the peer's advertised window
//! and drives one retransmission timer over the outstanding-segment
//! queue.

use std::collections::VecDeque;

use log::{debug, trace, warn};
use rand::RngCore;

use crate::byte_stream::ByteStream;
use crate::config::MAX_PAYLOAD_SIZE;
use crate::tcp::segment::{Segment, SegmentHeader};
use crate::wrapping::WrappingInt32;

#[derive(Debug)]
struct RetransmissionTimer {
    running: bool,
    elapsed_ms: u32,
    current_rto: u32,
}

#[derive(Debug)]
pub struct TCPSender {
    isn: WrappingInt32,
    stream: ByteStream,
    window_size: u16,
    next_seqno: u64,
    last_ack_seqno: u64,
    outstanding: VecDeque<Segment>,
    segments_out: VecDeque<Segment>,
    timer: RetransmissionTimer,
    initial_rto: u32,
    consecutive_retransmissions: u32,
    fin_sent: bool,
}

impl TCPSender {
    pub fn new(capacity: usize, initial_rto_ms: u32, fixed_isn: Option<WrappingInt32>) -> Self {
        let isn = fixed_isn.unwrap_or_else(|| WrappingInt32::new(rand::thread_rng().next_u32()));
        TCPSender {
            isn,
            stream: ByteStream::new(capacity),
            window_size: 1,
            next_seqno: 0,
            last_ack_seqno: 0,
            outstanding: VecDeque::new(),
            segments_out: VecDeque::new(),
            timer: RetransmissionTimer {
                running: false,
                elapsed_ms: 0,
                current_rto: initial_rto_ms,
            },
            initial_rto: initial_rto_ms,
            consecutive_retransmissions: 0,
            fin_sent: false,
        }
    }

    pub fn stream_in(&self) -> &ByteStream {
        &self.stream
    }

    pub fn stream_in_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub fn isn(&self) -> WrappingInt32 {
        self.isn
    }

    pub fn next_seqno(&self) -> WrappingInt32 {
        WrappingInt32::wrap(self.next_seqno, self.isn)
    }

    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.next_seqno - self.last_ack_seqno
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retransmissions
    }

    pub fn segments_out(&mut self) -> &mut VecDeque<Segment> {
        &mut self.segments_out
    }

    /// Produces as many segments as the peer's window admits.
    pub fn fill_window(&mut self) {
        if self.fin_sent {
            return;
        }

        // a zero window still gets one probe worth of real data or FIN.
        let effective_window = self.window_size.max(1) as u64;

        while effective_window > self.bytes_in_flight() {
            let syn = self.next_seqno == 0;
            let window_remain = effective_window - self.bytes_in_flight();
            let spare = window_remain - u64::from(syn);
            let take = (spare as usize).min(MAX_PAYLOAD_SIZE);
            let payload = self.stream.read(take);

            let mut seg = Segment::new(
                SegmentHeader {
                    seqno: WrappingInt32::wrap(self.next_seqno, self.isn),
                    syn,
                    ..Default::default()
                },
                payload,
            );

            if self.stream.eof()
                && (seg.length_in_sequence_space() as u64) < window_remain
            {
                seg.header.fin = true;
                self.fin_sent = true;
            }

            if seg.length_in_sequence_space() == 0 {
                break;
            }

            trace!(
                "sender emitting seqno={} len={} syn={} fin={}",
                seg.header.seqno,
                seg.length_in_sequence_space(),
                seg.header.syn,
                seg.header.fin
            );

            self.next_seqno += seg.length_in_sequence_space() as u64;
            self.segments_out.push_back(seg.clone());
            self.outstanding.push_back(seg.clone());

            if !self.timer.running {
                self.timer.running = true;
                self.timer.elapsed_ms = 0;
            }

            if seg.header.fin {
                break;
            }
        }
    }

    pub fn ack_received(&mut self, ackno: WrappingInt32, window: u16) {
        let abs_ack = ackno.unwrap(self.isn, self.next_seqno);
        if abs_ack > self.next_seqno {
            trace!("dropping ack for seqno beyond anything sent");
            return;
        }

        self.window_size = window;

        let mut progress_made = false;
        if abs_ack > self.last_ack_seqno {
            self.last_ack_seqno = abs_ack;
            progress_made = true;
            self.timer.current_rto = self.initial_rto;
            self.consecutive_retransmissions = 0;
            self.timer.elapsed_ms = 0;
        }

        while let Some(front) = self.outstanding.front() {
            let seg_abs_seqno = front.header.seqno.unwrap(self.isn, self.next_seqno);
            let seg_len = front.length_in_sequence_space() as u64;
            if seg_abs_seqno + seg_len <= abs_ack {
                self.outstanding.pop_front();
            } else {
                break;
            }
        }

        if self.outstanding.is_empty() {
            self.timer.running = false;
            self.timer.elapsed_ms = 0;
        } else if progress_made {
            self.timer.running = true;
            self.timer.elapsed_ms = 0;
        }

        self.fill_window();
    }

    pub fn tick(&mut self, ms_since_last_tick: u32) {
        if !self.timer.running {
            return;
        }
        self.timer.elapsed_ms += ms_since_last_tick;

        if self.timer.elapsed_ms >= self.timer.current_rto {
            if let Some(front) = self.outstanding.front() {
                warn!(
                    "retransmitting seqno={} (attempt {})",
                    front.header.seqno,
                    self.consecutive_retransmissions + 1
                );
                self.segments_out.push_back(front.clone());

                if self.window_size > 0 {
                    self.timer.current_rto = self.timer.current_rto.saturating_mul(2);
                    self.consecutive_retransmissions += 1;
                }
                self.timer.elapsed_ms = 0;
            }
        }
    }

    /// Emits a bare segment at the current send position, used to force
    /// an ACK. Not tracked for retransmission and does not advance
    /// `next_seqno`.
    pub fn send_empty_segment(&mut self) {
        let seg = Segment::new(
            SegmentHeader {
                seqno: WrappingInt32::wrap(self.next_seqno, self.isn),
                ..Default::default()
            },
            Vec::new(),
        );
        debug!("sender emitting empty segment seqno={}", seg.header.seqno);
        self.segments_out.push_back(seg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender_with_isn(capacity: usize, rto: u32, isn: u32) -> TCPSender {
        TCPSender::new(capacity, rto, Some(WrappingInt32::new(isn)))
    }

    #[test]
    fn syn_data_fin_sequence() {
        // connect(): bare SYN under the default window of 1.
        let mut s = sender_with_isn(100, 1000, 0);
        s.fill_window();
        let connect_segs: Vec<_> = s.segments_out().drain(..).collect();
        assert_eq!(connect_segs.len(), 1);
        assert!(connect_segs[0].header.syn);
        assert_eq!(connect_segs[0].length_in_sequence_space(), 1);

        // peer ACKs the SYN and advertises window 10; write+close follow.
        s.stream_in_mut().write(b"abc");
        s.stream_in_mut().end_input();
        s.ack_received(WrappingInt32::new(1), 10);

        let segs: Vec<_> = s.segments_out().drain(..).collect();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].header.seqno, WrappingInt32::new(1));
        assert_eq!(segs[0].payload, b"abc");
        assert!(segs[0].header.fin);
        assert_eq!(segs[0].length_in_sequence_space(), 4);
        assert_eq!(s.next_seqno_absolute(), 5);
    }

    #[test]
    fn ack_drains_outstanding_and_stops_timer() {
        let mut s = sender_with_isn(100, 1000, 0);
        s.fill_window();
        s.segments_out().clear();
        s.stream_in_mut().write(b"abc");
        s.stream_in_mut().end_input();
        s.ack_received(WrappingInt32::new(1), 10);
        s.ack_received(WrappingInt32::new(5), 10);
        assert_eq!(s.bytes_in_flight(), 0);
    }

    #[test]
    fn zero_window_still_probes() {
        let mut s = sender_with_isn(100, 1000, 0);
        s.stream_in_mut().write(b"a");
        s.fill_window(); // bare SYN under the default window of 1
        s.ack_received(WrappingInt32::new(1), 0); // peer acks syn, window 0
        let segs: Vec<_> = s.segments_out().drain(..).collect();
        assert!(segs.iter().any(|s| !s.payload.is_empty() || s.header.fin));
    }

    #[test]
    fn retransmission_backoff_and_cap() {
        let mut s = sender_with_isn(100, 1000, 0);
        s.stream_in_mut().write(b"a");
        s.fill_window();
        s.segments_out().clear();
        let mut rto = 1000;
        for i in 1..=3 {
            s.tick(rto);
            assert_eq!(s.consecutive_retransmissions(), i);
            rto *= 2;
        }
        assert_eq!(s.segments_out().len(), 3);
    }

    #[test]
    fn zero_window_retransmit_does_not_double_rto() {
        let mut s = sender_with_isn(100, 1000, 0);
        s.stream_in_mut().write(b"a");
        s.fill_window();
        s.ack_received(WrappingInt32::new(1), 0);
        s.segments_out().clear();
        s.tick(1000);
        assert_eq!(s.consecutive_retransmissions(), 0);
    }
}
