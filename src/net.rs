//! The link/network layer glue below TCP: Ethernet framing, ARP
//! resolution, IPv4 datagrams, and longest-prefix-match routing.

pub mod arp;
pub mod ethernet;
pub mod interface;
pub mod ipv4;
pub mod router;

pub use arp::ArpMessage;
pub use ethernet::{EthernetFrame, MacAddress};
pub use interface::NetworkInterface;
pub use ipv4::Ipv4Datagram;
pub use router::Router;
