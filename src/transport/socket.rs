//! Async UDP socket wrapper for Saltline transport.
//!
//! Moves encoded packets between the network and the connection layer.
//! Datagrams from the wrong address family are skipped.

use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::address::AddressFamily;
use crate::core::{ConnectionError, NET_PAYLOAD_SAFE_IPV6};
use crate::packet::{PacketBuffer, PacketTag};

/// Default receive buffer size.
///
/// Larger than any valid packet so that oversized datagrams are read whole
/// and rejected by the decoder rather than silently truncated.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 2048;

/// Socket options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// Receive buffer size in bytes.
    pub recv_buffer_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketConfig {
    /// Create a configuration with default options.
    pub fn new() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }

    /// Set the receive buffer size. Never below the largest packet.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(NET_PAYLOAD_SAFE_IPV6);
        self
    }
}

/// Non-blocking UDP socket bound to one address family.
#[derive(Debug)]
pub struct Socket<A: AddressFamily> {
    socket: UdpSocket,
    recv_buffer: Vec<u8>,
    family: PhantomData<A>,
}

impl<A: AddressFamily> Socket<A> {
    /// Bind to `address` with default options.
    pub async fn bind(address: A::Address) -> io::Result<Self> {
        Self::bind_with(address, SocketConfig::default()).await
    }

    /// Bind to `address`.
    pub async fn bind_with(address: A::Address, config: SocketConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(address.into()).await?;
        Ok(Self::from_socket(socket, config))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket, config: SocketConfig) -> Self {
        Self {
            socket,
            recv_buffer: vec![0u8; config.recv_buffer_size],
            family: PhantomData,
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<A::Address> {
        let addr = self.socket.local_addr()?;
        A::from_socket_addr(addr).ok_or_else(|| family_mismatch(addr))
    }

    /// Get a reference to the underlying socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }

    /// Send raw bytes.
    pub async fn send_to(&self, data: &[u8], to: A::Address) -> io::Result<usize> {
        self.socket.send_to(data, to.into()).await
    }

    /// Receive raw bytes and the sender's address.
    pub async fn recv_from(&mut self) -> io::Result<(&[u8], A::Address)> {
        loop {
            let (len, addr) = self.socket.recv_from(&mut self.recv_buffer).await?;
            if let Some(from) = A::from_socket_addr(addr) {
                return Ok((&self.recv_buffer[..len], from));
            }
        }
    }

    /// Send an encoded packet.
    pub async fn send_packet<T: PacketTag>(
        &self,
        packet: &PacketBuffer<T, A>,
        to: A::Address,
    ) -> io::Result<usize> {
        self.send_to(&packet.to_bytes(), to).await
    }

    /// Receive and decode one packet.
    pub async fn recv_packet<T: PacketTag>(
        &mut self,
    ) -> Result<(PacketBuffer<T, A>, A::Address), ConnectionError> {
        let (data, from) = self.recv_from().await?;
        let packet = PacketBuffer::decode(data)?;
        Ok((packet, from))
    }

    /// Try to send a packet without waiting.
    ///
    /// Returns `Ok(None)` if the socket is not ready.
    pub fn try_send_packet<T: PacketTag>(
        &self,
        packet: &PacketBuffer<T, A>,
        to: A::Address,
    ) -> io::Result<Option<usize>> {
        match self.socket.try_send_to(&packet.to_bytes(), to.into()) {
            Ok(sent) => Ok(Some(sent)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Try to receive raw bytes without waiting.
    ///
    /// Returns `Ok(None)` if no datagram of this family is available.
    pub fn try_recv_from(&mut self) -> io::Result<Option<(&[u8], A::Address)>> {
        loop {
            match self.socket.try_recv_from(&mut self.recv_buffer) {
                Ok((len, addr)) => {
                    if let Some(from) = A::from_socket_addr(addr) {
                        return Ok(Some((&self.recv_buffer[..len], from)));
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }
}

fn family_mismatch(addr: SocketAddr) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{addr} does not belong to this address family"),
    )
}
