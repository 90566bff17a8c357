//! Resolves a next-hop IPv4 address to a MAC address via ARP, queuing
//! datagrams while resolution is pending and coalescing repeated
//! requests for the same target.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use log::{debug, trace};

use crate::config::{ARP_ENTRY_TTL_MS, ARP_REQUEST_SUPPRESSION_MS};
use crate::net::arp::{ArpMessage, OPCODE_REQUEST};
use crate::net::ethernet::{EthernetFrame, MacAddress, BROADCAST, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::net::ipv4::Ipv4Datagram;

struct ArpEntry {
    mac: MacAddress,
    ttl_ms: u32,
}

pub struct NetworkInterface {
    ethernet_address: MacAddress,
    ip_address: Ipv4Addr,
    arp_table: HashMap<Ipv4Addr, ArpEntry>,
    arp_request_timers: HashMap<Ipv4Addr, u32>,
    pending_datagrams: HashMap<Ipv4Addr, Vec<Ipv4Datagram>>,
    frames_out: VecDeque<EthernetFrame>,
}

impl NetworkInterface {
    pub fn new(ethernet_address: MacAddress, ip_address: Ipv4Addr) -> Self {
        debug!(
            "network interface up: mac={:02x?} ip={}",
            ethernet_address, ip_address
        );
        NetworkInterface {
            ethernet_address,
            ip_address,
            arp_table: HashMap::new(),
            arp_request_timers: HashMap::new(),
            pending_datagrams: HashMap::new(),
            frames_out: VecDeque::new(),
        }
    }

    pub fn frames_out(&mut self) -> &mut VecDeque<EthernetFrame> {
        &mut self.frames_out
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    pub fn ethernet_address(&self) -> MacAddress {
        self.ethernet_address
    }

    /// Sends `dgram` to `next_hop`, resolving its MAC via ARP first if
    /// necessary.
    pub fn send_datagram(&mut self, dgram: Ipv4Datagram, next_hop: Ipv4Addr) {
        if let Some(entry) = self.arp_table.get(&next_hop) {
            if entry.ttl_ms > 0 {
                self.frames_out.push_back(EthernetFrame::new(
                    entry.mac,
                    self.ethernet_address,
                    ETHERTYPE_IPV4,
                    dgram.serialize(),
                ));
                return;
            }
        }

        trace!("queuing datagram to {} pending arp resolution", next_hop);
        self.pending_datagrams.entry(next_hop).or_default().push(dgram);

        let suppressed = self
            .arp_request_timers
            .get(&next_hop)
            .map(|&ms| ms > 0)
            .unwrap_or(false);
        if !suppressed {
            self.broadcast_arp_request(next_hop);
            self.arp_request_timers.insert(next_hop, ARP_REQUEST_SUPPRESSION_MS);
        }
    }

    fn broadcast_arp_request(&mut self, target_ip: Ipv4Addr) {
        debug!("broadcasting arp request for {}", target_ip);
        let request = ArpMessage::request(self.ethernet_address, self.ip_address, target_ip);
        self.frames_out.push_back(EthernetFrame::new(
            BROADCAST,
            self.ethernet_address,
            ETHERTYPE_ARP,
            request.serialize(),
        ));
    }

    /// Processes an inbound frame, returning the carried IPv4 datagram
    /// if there is one. ARP traffic is handled entirely internally:
    /// learning the mapping, replying to requests for us, and flushing
    /// any datagrams that were queued for the now-resolved address.
    pub fn recv_frame(&mut self, frame: &EthernetFrame) -> Option<Ipv4Datagram> {
        if frame.dst != self.ethernet_address && frame.dst != BROADCAST {
            return None;
        }

        match frame.ethertype {
            ETHERTYPE_IPV4 => Ipv4Datagram::parse(&frame.payload),
            ETHERTYPE_ARP => {
                if let Some(msg) = ArpMessage::parse(&frame.payload) {
                    self.learn(msg.sender_ip, msg.sender_mac);

                    if msg.opcode == OPCODE_REQUEST && msg.target_ip == self.ip_address {
                        let reply = ArpMessage::reply(
                            self.ethernet_address,
                            self.ip_address,
                            msg.sender_mac,
                            msg.sender_ip,
                        );
                        self.frames_out.push_back(EthernetFrame::new(
                            msg.sender_mac,
                            self.ethernet_address,
                            ETHERTYPE_ARP,
                            reply.serialize(),
                        ));
                    }

                    if let Some(queued) = self.pending_datagrams.remove(&msg.sender_ip) {
                        for dgram in queued {
                            self.frames_out.push_back(EthernetFrame::new(
                                msg.sender_mac,
                                self.ethernet_address,
                                ETHERTYPE_IPV4,
                                dgram.serialize(),
                            ));
                        }
                        self.arp_request_timers.remove(&msg.sender_ip);
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn learn(&mut self, ip: Ipv4Addr, mac: MacAddress) {
        trace!("learned arp mapping {} -> {:02x?}", ip, mac);
        self.arp_table.insert(ip, ArpEntry { mac, ttl_ms: ARP_ENTRY_TTL_MS });
    }

    pub fn tick(&mut self, ms_since_last_tick: u32) {
        self.arp_table.retain(|ip, entry| {
            if entry.ttl_ms <= ms_since_last_tick {
                trace!("arp entry for {} expired", ip);
                false
            } else {
                entry.ttl_ms -= ms_since_last_tick;
                true
            }
        });

        for timer in self.arp_request_timers.values_mut() {
            *timer = timer.saturating_sub(ms_since_last_tick);
        }

        let due: Vec<Ipv4Addr> = self
            .pending_datagrams
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .filter(|(ip, _)| self.arp_request_timers.get(ip).copied().unwrap_or(0) == 0)
            .map(|(&ip, _)| ip)
            .collect();

        for ip in due {
            self.broadcast_arp_request(ip);
            self.arp_request_timers.insert(ip, ARP_REQUEST_SUPPRESSION_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::{Ipv4Header, IpNumber};

    fn sample_datagram(dst: Ipv4Addr) -> Ipv4Datagram {
        let header = Ipv4Header::new(0, 64, IpNumber::TCP, [10, 0, 0, 1], dst.octets()).unwrap();
        Ipv4Datagram::new(header, Vec::new())
    }

    #[test]
    fn queues_and_broadcasts_arp_when_unresolved() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        iface.send_datagram(sample_datagram(Ipv4Addr::new(10, 0, 0, 2)), Ipv4Addr::new(10, 0, 0, 2));
        let frames: Vec<_> = iface.frames_out().drain(..).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ethertype, ETHERTYPE_ARP);
        assert_eq!(frames[0].dst, BROADCAST);
    }

    #[test]
    fn second_send_within_suppression_does_not_rebroadcast() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        let target = Ipv4Addr::new(10, 0, 0, 2);
        iface.send_datagram(sample_datagram(target), target);
        iface.frames_out().clear();
        iface.send_datagram(sample_datagram(target), target);
        assert!(iface.frames_out().is_empty());
    }

    #[test]
    fn arp_reply_flushes_pending_datagrams() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        let target = Ipv4Addr::new(10, 0, 0, 2);
        iface.send_datagram(sample_datagram(target), target);
        iface.frames_out().clear();

        let reply = ArpMessage::reply([9, 9, 9, 9, 9, 9], target, [1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        let frame = EthernetFrame::new([1, 2, 3, 4, 5, 6], [9, 9, 9, 9, 9, 9], ETHERTYPE_ARP, reply.serialize());
        assert!(iface.recv_frame(&frame).is_none());

        let frames: Vec<_> = iface.frames_out().drain(..).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ethertype, ETHERTYPE_IPV4);
        assert_eq!(frames[0].dst, [9, 9, 9, 9, 9, 9]);
    }

    #[test]
    fn ignores_frames_not_addressed_to_us() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        let frame = EthernetFrame::new([9, 9, 9, 9, 9, 9], [8, 8, 8, 8, 8, 8], ETHERTYPE_IPV4, vec![0; 20]);
        assert!(iface.recv_frame(&frame).is_none());
    }

    #[test]
    fn arp_entry_expires_after_ttl() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        iface.learn(Ipv4Addr::new(10, 0, 0, 2), [2; 6]);
        iface.tick(ARP_ENTRY_TTL_MS);
        assert!(iface.arp_table.is_empty());
    }

    #[test]
    fn suppressed_request_re_broadcasts_after_timeout() {
        let mut iface = NetworkInterface::new([1, 2, 3, 4, 5, 6], Ipv4Addr::new(10, 0, 0, 1));
        let target = Ipv4Addr::new(10, 0, 0, 2);
        iface.send_datagram(sample_datagram(target), target);
        iface.frames_out().clear();
        iface.tick(ARP_REQUEST_SUPPRESSION_MS);
        let frames: Vec<_> = iface.frames_out().drain(..).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ethertype, ETHERTYPE_ARP);
    }
}
