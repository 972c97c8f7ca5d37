use super::{loopback, Datagram, TransportError, MAX_DATAGRAM_LEN};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, info, warn};

/// Non-blocking datagram endpoint
pub trait DatagramPort: Send {
    /// Returns the next pending datagram, or `None` when nothing is queued
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError>;

    fn send_to(&mut self, bytes: &[u8], target: SocketAddr) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub struct UdpPort {
    socket: UdpSocket,
}

impl UdpPort {
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .map_err(|e| TransportError::Socket(format!("Failed to bind {}: {}", addr, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Socket(format!("Failed to set non-blocking: {}", e)))?;
        debug!("Bound datagram port on {}", addr);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::Socket(e.to_string()))
    }
}

impl DatagramPort for UdpPort {
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TransportError> {
        loop {
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(Some(received)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                // Windows reports an ICMP port-unreachable from an earlier send here.
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(TransportError::Socket(e.to_string())),
            }
        }
    }

    fn send_to(&mut self, bytes: &[u8], target: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(bytes, target)
            .map(|_| ())
            .map_err(|e| TransportError::SendFailure(e.to_string()))
    }
}

/// Reader side of the channel: sends to the receiver, polls its replies
pub struct ReaderLink {
    port: Box<dyn DatagramPort>,
    target: SocketAddr,
    buffer: [u8; MAX_DATAGRAM_LEN],
    send_failures: u64,
}

impl ReaderLink {
    /// Binds an ephemeral loopback port aimed at the receiver's port
    pub fn connect(receiver_port: u16) -> Result<Self, TransportError> {
        let port = UdpPort::bind(loopback(0))?;
        let target = loopback(receiver_port);
        info!("Sending to receiver at {}", target);
        Ok(Self::with_port(Box::new(port), target))
    }

    pub fn with_port(port: Box<dyn DatagramPort>, target: SocketAddr) -> Self {
        Self {
            port,
            target,
            buffer: [0; MAX_DATAGRAM_LEN],
            send_failures: 0,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    /// Fire-and-forget send; failures are counted and returned but never retried
    pub fn send(&mut self, datagram: &Datagram) -> Result<(), TransportError> {
        let result = self.port.send_to(&datagram.encode(), self.target);
        if let Err(e) = &result {
            self.send_failures += 1;
            debug!("Dropped outgoing datagram: {}", e);
        }
        result
    }

    /// Drains every reply currently queued, skipping malformed ones
    pub fn poll(&mut self) -> Vec<Datagram> {
        let mut replies = Vec::new();
        loop {
            match self.port.try_recv(&mut self.buffer) {
                Ok(Some((len, _from))) => match Datagram::decode(&self.buffer[..len]) {
                    Ok(datagram) => replies.push(datagram),
                    Err(e) => warn!("Ignoring malformed reply: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!("Reply poll failed: {}", e);
                    break;
                }
            }
        }
        replies
    }
}
