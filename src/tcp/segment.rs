//! The `Segment` value type: a TCP header plus payload, decoupled from
//! its wire encoding. Conversion to/from wire bytes goes through
//! `etherparse`, the same crate the rest of this workspace uses for
//! Ethernet/IPv4 framing.

use etherparse::{TcpHeader, TcpHeaderSlice};

use crate::error::SegmentError;
use crate::wrapping::WrappingInt32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentHeader {
    pub seqno: WrappingInt32,
    pub ackno: WrappingInt32,
    pub win: u16,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(header: SegmentHeader, payload: Vec<u8>) -> Self {
        Segment { header, payload }
    }

    /// Bytes of the 32-bit sequence space this segment occupies: the
    /// payload plus one unit each for SYN and FIN.
    pub fn length_in_sequence_space(&self) -> usize {
        self.payload.len() + usize::from(self.header.syn) + usize::from(self.header.fin)
    }

    /// Decodes a `Segment` from a parsed TCP header and its trailing
    /// payload bytes (as produced by stripping the IPv4/TCP headers off
    /// an inbound frame).
    pub fn from_wire(tcp: &TcpHeaderSlice<'_>, payload: &[u8]) -> Result<Segment, SegmentError> {
        Ok(Segment {
            header: SegmentHeader {
                seqno: WrappingInt32::new(tcp.sequence_number()),
                ackno: WrappingInt32::new(tcp.acknowledgment_number()),
                win: tcp.window_size(),
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            },
            payload: payload.to_vec(),
        })
    }

    /// Builds an `etherparse::TcpHeader` carrying this segment's flags
    /// and sequence numbers. `src_port`/`dst_port` come from the
    /// connection's four-tuple, which this value type does not itself
    /// track (mirroring the teacher's `Tcp4Tuple`, kept at the
    /// connection-map layer rather than on every segment).
    pub fn to_wire_header(&self, src_port: u16, dst_port: u16) -> TcpHeader {
        let mut header = TcpHeader::new(
            src_port,
            dst_port,
            self.header.seqno.raw_value(),
            self.header.win,
        );
        header.acknowledgment_number = self.header.ackno.raw_value();
        header.syn = self.header.syn;
        header.ack = self.header.ack;
        header.fin = self.header.fin;
        header.rst = self.header.rst;
        header
    }
}
