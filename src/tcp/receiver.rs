//! Maps inbound segments onto the reassembler's absolute stream index
//! space and computes the outgoing ackno/window.

use log::trace;

use crate::byte_stream::ByteStream;
use crate::reassembler::StreamReassembler;
use crate::tcp::segment::Segment;
use crate::wrapping::WrappingInt32;

#[derive(Debug)]
pub struct TCPReceiver {
    isn: Option<WrappingInt32>,
    reassembler: StreamReassembler,
}

impl TCPReceiver {
    pub fn new(capacity: usize) -> Self {
        TCPReceiver {
            isn: None,
            reassembler: StreamReassembler::new(capacity),
        }
    }

    pub fn stream_out(&self) -> &ByteStream {
        self.reassembler.stream_out()
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        self.reassembler.stream_out_mut()
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.reassembler.unassembled_bytes()
    }

    pub fn segment_received(&mut self, seg: &Segment) {
        if seg.header.syn {
            if self.isn.is_none() {
                self.isn = Some(seg.header.seqno);
                trace!("receiver latched isn {}", seg.header.seqno);
            }
            // SYN already latched: ignore a duplicate SYN flag, do not
            // re-latch, but still process any payload/FIN below.
        }

        let Some(isn) = self.isn else {
            trace!("dropping segment received before SYN");
            return;
        };

        let checkpoint = self.reassembler.stream_out().bytes_written() + 1;
        let abs_seqno = seg.header.seqno.unwrap(isn, checkpoint);
        // stream_index = abs_seqno - 1 + (syn ? 1 : 0), reassociated to
        // avoid an unsigned underflow when a malformed non-SYN segment
        // claims the position the SYN itself occupies.
        let Some(stream_index) = (abs_seqno + u64::from(seg.header.syn)).checked_sub(1) else {
            trace!("dropping segment claiming a seqno before the isn");
            return;
        };

        self.reassembler
            .push_substring(&seg.payload, stream_index, seg.header.fin);
    }

    pub fn ackno(&self) -> Option<WrappingInt32> {
        let isn = self.isn?;
        let mut abs_ack = self.reassembler.stream_out().bytes_written() + 1;
        if self.reassembler.stream_out().input_ended() {
            abs_ack += 1;
        }
        Some(WrappingInt32::wrap(abs_ack, isn))
    }

    /// Space left in the downstream stream. Not saturated to u16 here;
    /// callers that stamp a wire `win` field must saturate themselves.
    pub fn window_size(&self) -> usize {
        self.reassembler.stream_out().remaining_capacity()
    }
}
