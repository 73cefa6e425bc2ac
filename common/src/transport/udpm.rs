//! LCM over UDP multicast

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use super::packet::{self, Packet, Reassembler};
use super::{Dispatcher, MessageHandler, SubscriptionId, Transport, TransportError};

const RECV_BUFFER_SIZE: usize = 65536;
/// Shortest read timeout handed to the socket; zero means "block forever"
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

pub struct UdpmTransport {
    socket: UdpSocket,
    destination: SocketAddr,
    description: String,
    dispatcher: Dispatcher,
    reassembler: Reassembler,
    buffer: Vec<u8>,
    next_seqno: u32,
}

impl UdpmTransport {
    /// Join `group` on all interfaces and listen on `port`
    pub fn connect(group: Ipv4Addr, port: u16, ttl: u32) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        // Several LCM processes on one host share the port
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_ttl_v4(ttl)?;
        socket.set_multicast_loop_v4(true)?;

        let description = format!("udpm://{group}:{port}?ttl={ttl}");
        info!("Joined {description}");

        Ok(Self {
            socket: socket.into(),
            destination: SocketAddrV4::new(group, port).into(),
            description,
            dispatcher: Dispatcher::new(),
            reassembler: Reassembler::new(),
            buffer: vec![0; RECV_BUFFER_SIZE],
            next_seqno: 0,
        })
    }

    /// Turn one datagram into a complete message, if it finishes one
    fn accept(&mut self, len: usize, from: SocketAddr) -> Option<(String, Vec<u8>)> {
        match packet::parse(&self.buffer[..len]) {
            Ok(Packet::Short {
                channel, payload, ..
            }) => Some((channel.to_string(), payload.to_vec())),
            Ok(Packet::Fragment(fragment)) => self.reassembler.insert(from, fragment),
            Err(e) => {
                debug!("Ignoring datagram from {from}: {e}");
                None
            }
        }
    }
}

impl Transport for UdpmTransport {
    fn subscribe(
        &mut self,
        pattern: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError> {
        self.dispatcher.subscribe(pattern, handler)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        self.dispatcher.unsubscribe(id)
    }

    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<(), TransportError> {
        let datagrams =
            packet::encode(channel, payload, self.next_seqno).map_err(|e| {
                TransportError::Unsendable {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                }
            })?;
        self.next_seqno = self.next_seqno.wrapping_add(1);
        for datagram in datagrams {
            self.socket.send_to(&datagram, self.destination)?;
        }
        Ok(())
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.socket.set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))?;

            let (len, from) = match self.socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if let Some((channel, payload)) = self.accept(len, from) {
                self.dispatcher.dispatch(&channel, &payload);
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}
