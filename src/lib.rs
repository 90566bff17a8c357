//! This crate's tested core is the protocol stack under [`byte_stream`],
//! [`wrapping`], [`reassembler`], [`tcp`] and [`net`]. Everything in this
//! file is host-facing demo glue wiring that core to a Linux TUN device
//! behind a blocking, thread-per-interface API in the shape of
//! `std::net::{TcpListener, TcpStream}` — it is not itself part of the
//! protocol core and carries no invariants beyond "decode wire bytes,
//! drive a [`TCPConnection`], encode wire bytes back out."

pub mod byte_stream;
pub mod config;
pub mod error;
pub mod net;
pub mod reassembler;
pub mod tcp;
pub mod wrapping;

use std::{
    collections::{hash_map, HashMap, VecDeque},
    io,
    net::Ipv4Addr,
    sync::{Arc, Condvar, Mutex},
    thread,
};

use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice, TcpHeaderSlice};
use log::{debug, error};

use crate::config::TcpConfig;
use crate::tcp::{Segment, Tcp4Tuple, TCPConnection};

const BUFFER_SIZE: usize = 1504;

/// Type for handling interface requests.
type InterfaceHandle = Arc<InterfaceManager>;

#[derive(Default)]
struct InterfaceManager {
    manager: Mutex<ConnectionManager>,
    pending_var: Condvar,
    receive_var: Condvar,
}

/// Struct for managing connections.
#[derive(Default)]
pub struct ConnectionManager {
    // Ports for which connections are accepted, and the backlog of
    // accepted-but-not-yet-handed-off four-tuples for each.
    pending: HashMap<u16, VecDeque<Tcp4Tuple>>,
    // Accepted connections.
    connections: HashMap<Tcp4Tuple, TCPConnection>,
    terminate: bool,
}

/// Interfaces to the TUN device that backs every connection: owns the
/// background thread that reads raw IPv4 datagrams off the device,
/// drives the matching [`TCPConnection`], and writes the resulting
/// segments back out.
pub struct Interface {
    ih: Option<InterfaceHandle>,
    jh: Option<thread::JoinHandle<io::Result<()>>>,
}

fn write_segment(
    nic: &tun_tap::Iface,
    local: (Ipv4Addr, u16),
    remote: (Ipv4Addr, u16),
    seg: &Segment,
) -> io::Result<()> {
    let tcp_header = seg.to_wire_header(local.1, remote.1);
    let ip_header = Ipv4Header::new(
        (tcp_header.header_len() as usize + seg.payload.len()) as u16,
        64,
        IpNumber::TCP,
        local.0.octets(),
        remote.0.octets(),
    )
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut buf = Vec::with_capacity(ip_header.header_len() as usize + tcp_header.header_len() as usize + seg.payload.len());
    ip_header
        .write(&mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    tcp_header
        .write(&mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    buf.extend_from_slice(&seg.payload);
    nic.send(&buf)?;
    Ok(())
}

fn flush_connection(
    nic: &tun_tap::Iface,
    quad: &Tcp4Tuple,
    conn: &mut TCPConnection,
) -> io::Result<()> {
    while let Some(seg) = conn.segments_out().pop_front() {
        write_segment(nic, quad.src, quad.dst, &seg)?;
    }
    Ok(())
}

fn packet_loop(nic: tun_tap::Iface, ih: InterfaceHandle) -> io::Result<()> {
    let mut buf = [0u8; BUFFER_SIZE];

    loop {
        let nbytes = nic.recv(&mut buf[..])?;
        let version = buf[0] >> 4;
        if version != 4 {
            continue; // ignore non-ip
        }
        let ip = match Ipv4HeaderSlice::from_slice(&buf[..nbytes]) {
            Ok(ip) => ip,
            Err(e) => {
                debug!("ignoring packet, len:{} err: {}", nbytes, e);
                continue;
            }
        };
        if ip.protocol() != IpNumber::TCP {
            continue; // ignore non-tcp
        }
        let src = ip.source_addr();
        let dst = ip.destination_addr();
        let ip_len = ip.slice().len();
        let tcp = match TcpHeaderSlice::from_slice(&buf[ip_len..nbytes]) {
            Ok(tcp) => tcp,
            Err(e) => {
                debug!("ignoring packet, len:{} err: {}", nbytes, e);
                continue;
            }
        };
        let srcp = tcp.source_port();
        let dstp = tcp.destination_port();
        let data_off = ip_len + tcp.slice().len();
        let seg = match Segment::from_wire(&tcp, &buf[data_off..nbytes]) {
            Ok(seg) => seg,
            Err(e) => {
                debug!("failed to decode segment: {}", e);
                continue;
            }
        };

        let quad = Tcp4Tuple {
            src: (dst, dstp),
            dst: (src, srcp),
        };

        let mut cm_guard = ih.manager.lock().unwrap();
        let cm = &mut *cm_guard;

        match cm.connections.entry(quad) {
            hash_map::Entry::Occupied(mut entry) => {
                let conn = entry.get_mut();
                conn.segment_received(&seg);
                flush_connection(&nic, &quad, conn)?;
                if !conn.active() {
                    entry.remove();
                }
                drop(cm_guard);
                ih.receive_var.notify_all();
            }
            hash_map::Entry::Vacant(e) => {
                if seg.header.syn {
                    if let Some(pending) = cm.pending.get_mut(&dstp) {
                        let mut conn = TCPConnection::new(TcpConfig::default());
                        conn.segment_received(&seg);
                        flush_connection(&nic, &quad, &mut conn)?;
                        e.insert(conn);
                        pending.push_back(quad);
                        drop(cm_guard);
                        ih.pending_var.notify_all();
                    }
                }
            }
        }
    }
}

impl Interface {
    pub fn new() -> io::Result<Self> {
        let nic = tun_tap::Iface::without_packet_info("tun0", tun_tap::Mode::Tun)?;
        let ih: InterfaceHandle = Arc::default();

        let jh = {
            let ih = ih.clone();
            Some(thread::spawn(move || packet_loop(nic, ih)))
        };

        Ok(Interface { ih: Some(ih), jh })
    }

    pub fn bind(&mut self, port: u16) -> io::Result<TcpListener> {
        let mut cm = self.ih.as_mut().unwrap().manager.lock().unwrap();
        match cm.pending.entry(port) {
            hash_map::Entry::Vacant(v) => {
                v.insert(VecDeque::new());
            }
            hash_map::Entry::Occupied(_) => {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "port in use"));
            }
        }
        drop(cm);
        Ok(TcpListener {
            ih: self.ih.as_mut().unwrap().clone(),
            port,
        })
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        self.ih.as_mut().unwrap().manager.lock().unwrap().terminate = true;
        drop(self.ih.take());
        self.jh
            .take()
            .expect("interface killed already")
            .join()
            .unwrap()
            .unwrap_or_else(|e| error!("packet loop exited with error: {}", e));
    }
}

pub struct TcpListener {
    ih: InterfaceHandle,
    port: u16,
}

impl TcpListener {
    pub fn accept(&mut self) -> io::Result<TcpStream> {
        let mut cm = self.ih.manager.lock().unwrap();
        loop {
            if let Some(quad) = cm
                .pending
                .get_mut(&self.port)
                .expect("port closed while listener is active")
                .pop_front()
            {
                return Ok(TcpStream {
                    ih: self.ih.clone(),
                    quad,
                });
            }
            cm = self.ih.pending_var.wait(cm).unwrap();
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        let mut cm = self.ih.manager.lock().unwrap();
        let pending = cm
            .pending
            .remove(&self.port)
            .expect("failed to remove port listener");
        for quad in pending {
            debug!("terminating pending connection {:?}", quad);
        }
    }
}

pub struct TcpStream {
    ih: InterfaceHandle,
    quad: Tcp4Tuple,
}

impl io::Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cm = self.ih.manager.lock().unwrap();
        loop {
            let conn = cm
                .connections
                .get_mut(&self.quad)
                .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;

            let available = conn.inbound_stream().buffer_size();
            if available > 0 {
                let data = conn.inbound_stream_mut().read(buf.len().min(available));
                buf[..data.len()].copy_from_slice(&data);
                return Ok(data.len());
            }
            if conn.inbound_stream().eof() {
                return Ok(0);
            }
            cm = self.ih.receive_var.wait(cm).unwrap();
        }
    }
}

impl io::Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut cm = self.ih.manager.lock().unwrap();
        let conn = cm
            .connections
            .get_mut(&self.quad)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;
        let n = conn.write(buf);
        if n < buf.len() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "send window full"));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut cm = self.ih.manager.lock().unwrap();
        let conn = cm
            .connections
            .get_mut(&self.quad)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))?;
        if conn.bytes_in_flight() == 0 {
            return Ok(());
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "bytes still in flight"))
    }
}

impl TcpStream {
    pub fn shutdown(&self, _how: std::net::Shutdown) -> io::Result<()> {
        let mut cm = self.ih.manager.lock().unwrap();
        if let Some(conn) = cm.connections.get_mut(&self.quad) {
            conn.end_input_stream();
        }
        Ok(())
    }
}
