//! A thin value type over `etherparse::Ipv4Header` plus payload bytes,
//! giving the router a place to read `dst`/mutate `ttl` without caring
//! about the rest of the header. Checksum recomputation on serialize is
//! delegated to `etherparse`, as the spec requires.

use std::net::Ipv4Addr;

use etherparse::{Ipv4Header, Ipv4HeaderSlice};

#[derive(Debug, Clone)]
pub struct Ipv4Datagram {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
}

impl Ipv4Datagram {
    pub fn new(header: Ipv4Header, payload: Vec<u8>) -> Self {
        Ipv4Datagram { header, payload }
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.header.destination)
    }

    pub fn ttl(&self) -> u8 {
        self.header.time_to_live
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.header.time_to_live = ttl;
    }

    pub fn parse(bytes: &[u8]) -> Option<Ipv4Datagram> {
        let slice = Ipv4HeaderSlice::from_slice(bytes).ok()?;
        let header = slice.to_header();
        let header_len = slice.slice().len();
        Some(Ipv4Datagram {
            header,
            payload: bytes[header_len..].to_vec(),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.header_len() as usize + self.payload.len());
        // `Ipv4Header::write` recomputes and writes the header checksum.
        self.header
            .write(&mut out)
            .expect("ipv4 header always serializable once constructed");
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::IpNumber;

    #[test]
    fn round_trips_through_serialize_parse() {
        let header = Ipv4Header::new(
            3,
            64,
            IpNumber::TCP,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
        )
        .unwrap();
        let dgram = Ipv4Datagram::new(header, vec![1, 2, 3]);
        let bytes = dgram.serialize();
        let parsed = Ipv4Datagram::parse(&bytes).unwrap();
        assert_eq!(parsed.dst(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(parsed.payload, vec![1, 2, 3]);
    }

    #[test]
    fn set_ttl_mutates_header() {
        let header = Ipv4Header::new(0, 10, IpNumber::TCP, [1, 1, 1, 1], [2, 2, 2, 2]).unwrap();
        let mut dgram = Ipv4Datagram::new(header, Vec::new());
        assert_eq!(dgram.ttl(), 10);
        dgram.set_ttl(9);
        assert_eq!(dgram.ttl(), 9);
    }
}
