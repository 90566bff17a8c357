//! Longest-prefix-match IPv4 forwarding across a set of network
//! interfaces the router does not own.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::{Rc, Weak};

use log::{trace, warn};

use crate::net::interface::NetworkInterface;
use crate::net::ipv4::Ipv4Datagram;

struct RouteEntry {
    route_prefix: Ipv4Addr,
    prefix_length: u8,
    next_hop: Option<Ipv4Addr>,
    interface_num: usize,
}

/// `interfaces` are owned by whoever wires the simulated network
/// together; the router only keeps [`Weak`] handles so it can forward
/// through them without extending their lifetime.
#[derive(Default)]
pub struct Router {
    interfaces: Vec<Weak<RefCell<NetworkInterface>>>,
    routes: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            interfaces: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Registers an interface, returning the index later used in
    /// [`Router::add_route`].
    pub fn add_interface(&mut self, interface: &Rc<RefCell<NetworkInterface>>) -> usize {
        self.interfaces.push(Rc::downgrade(interface));
        self.interfaces.len() - 1
    }

    pub fn add_route(
        &mut self,
        route_prefix: Ipv4Addr,
        prefix_length: u8,
        next_hop: Option<Ipv4Addr>,
        interface_num: usize,
    ) {
        trace!(
            "adding route {}/{} via {:?} on interface {}",
            route_prefix, prefix_length, next_hop, interface_num
        );
        self.routes.push(RouteEntry {
            route_prefix,
            prefix_length,
            next_hop,
            interface_num,
        });
    }

    /// Forwards every datagram currently queued for delivery on any
    /// owned interface.
    pub fn route(&mut self) {
        let pending: Vec<Ipv4Datagram> = self
            .interfaces
            .iter()
            .filter_map(|iface| iface.upgrade())
            .flat_map(|iface| {
                let mut iface = iface.borrow_mut();
                std::mem::take(iface.frames_out())
                    .into_iter()
                    .filter_map(|frame| Ipv4Datagram::parse(&frame.payload))
                    .collect::<Vec<_>>()
            })
            .collect();

        for dgram in pending {
            self.route_one_datagram(dgram);
        }
    }

    fn route_one_datagram(&mut self, mut dgram: Ipv4Datagram) {
        let Some(entry_idx) = self.longest_prefix_match(dgram.dst()) else {
            warn!("no route to {}, dropping datagram", dgram.dst());
            return;
        };

        if dgram.ttl() <= 1 {
            trace!("ttl expired en route to {}", dgram.dst());
            return;
        }
        dgram.set_ttl(dgram.ttl() - 1);

        let entry = &self.routes[entry_idx];
        let next_hop = entry.next_hop.unwrap_or_else(|| dgram.dst());
        let Some(iface) = self.interfaces[entry.interface_num].upgrade() else {
            warn!("interface {} no longer exists", entry.interface_num);
            return;
        };
        iface.borrow_mut().send_datagram(dgram, next_hop);
    }

    fn longest_prefix_match(&self, dst: Ipv4Addr) -> Option<usize> {
        let dst_bits = u32::from(dst);
        let mut best: Option<usize> = None;
        for (idx, entry) in self.routes.iter().enumerate() {
            let mask: u32 = if entry.prefix_length == 0 {
                0
            } else {
                0xFFFF_FFFFu32 << (32 - entry.prefix_length)
            };
            if (dst_bits & mask) != (u32::from(entry.route_prefix) & mask) {
                continue;
            }
            // strictly-greater so the first-inserted route wins a tie.
            if best.map_or(true, |b: usize| entry.prefix_length > self.routes[b].prefix_length) {
                best = Some(idx);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::{IpNumber, Ipv4Header};

    fn iface(ip: Ipv4Addr) -> Rc<RefCell<NetworkInterface>> {
        Rc::new(RefCell::new(NetworkInterface::new([0; 6], ip)))
    }

    fn datagram(dst: Ipv4Addr, ttl: u8) -> Ipv4Datagram {
        let header = Ipv4Header::new(0, ttl, IpNumber::TCP, [192, 168, 0, 1], dst.octets()).unwrap();
        Ipv4Datagram::new(header, Vec::new())
    }

    #[test]
    fn picks_longest_matching_prefix() {
        let mut router = Router::new();
        let default_if = iface(Ipv4Addr::new(10, 0, 0, 1));
        let specific_if = iface(Ipv4Addr::new(10, 0, 0, 2));
        let default_idx = router.add_interface(&default_if);
        let specific_idx = router.add_interface(&specific_if);

        router.add_route(Ipv4Addr::new(0, 0, 0, 0), 0, Some(Ipv4Addr::new(10, 0, 0, 1)), default_idx);
        router.add_route(
            Ipv4Addr::new(192, 168, 0, 0),
            24,
            None,
            specific_idx,
        );

        let idx = router
            .longest_prefix_match(Ipv4Addr::new(192, 168, 0, 50))
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn drops_datagram_with_no_route() {
        let mut router = Router::new();
        router.route_one_datagram(datagram(Ipv4Addr::new(1, 1, 1, 1), 64));
    }

    #[test]
    fn drops_datagram_when_ttl_would_hit_zero() {
        let mut router = Router::new();
        let target = iface(Ipv4Addr::new(192, 168, 0, 1));
        let idx = router.add_interface(&target);
        router.add_route(Ipv4Addr::new(192, 168, 0, 0), 24, None, idx);

        router.route_one_datagram(datagram(Ipv4Addr::new(192, 168, 0, 5), 1));
        assert!(target.borrow_mut().frames_out().is_empty());
    }

    #[test]
    fn forwards_and_decrements_ttl() {
        let mut router = Router::new();
        let target = iface(Ipv4Addr::new(192, 168, 0, 1));
        let idx = router.add_interface(&target);
        router.add_route(Ipv4Addr::new(192, 168, 0, 0), 24, None, idx);

        router.route_one_datagram(datagram(Ipv4Addr::new(192, 168, 0, 5), 64));
        let frames: Vec<_> = target.borrow_mut().frames_out().drain(..).collect();
        assert_eq!(frames.len(), 1);
        let forwarded = Ipv4Datagram::parse(&frames[0].payload).unwrap();
        assert_eq!(forwarded.ttl(), 63);
    }
}
