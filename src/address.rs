//! Peer addresses and address families.
//!
//! Addresses are kept in host order; conversion to and from the platform's
//! socket address representation (including byte-order normalization) goes
//! through `std::net`.

use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::core::{NET_PAYLOAD_SAFE_IPV4, NET_PAYLOAD_SAFE_IPV6};

/// An IP version: its address type and the UDP payload budget that every
/// path of that version is guaranteed to carry.
pub trait AddressFamily: Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// Structured address of this family.
    type Address: Copy + Eq + Hash + Debug + Display + Send + Sync + Into<SocketAddr>;

    /// Largest datagram a packet of this family may occupy.
    const PAYLOAD_BYTES_MAX: usize;

    /// Narrow a socket address to this family, if it belongs to it.
    fn from_socket_addr(addr: SocketAddr) -> Option<Self::Address>;
}

/// IPv4: 548-byte packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ipv4;

/// IPv6: 1232-byte packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ipv6;

impl AddressFamily for Ipv4 {
    type Address = AddressIpv4;
    const PAYLOAD_BYTES_MAX: usize = NET_PAYLOAD_SAFE_IPV4;

    fn from_socket_addr(addr: SocketAddr) -> Option<AddressIpv4> {
        match addr {
            SocketAddr::V4(v4) => Some(v4.into()),
            SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().map(|ip| AddressIpv4 {
                octets: ip.octets(),
                port: v6.port(),
            }),
        }
    }
}

impl AddressFamily for Ipv6 {
    type Address = AddressIpv6;
    const PAYLOAD_BYTES_MAX: usize = NET_PAYLOAD_SAFE_IPV6;

    fn from_socket_addr(addr: SocketAddr) -> Option<AddressIpv6> {
        match addr {
            SocketAddr::V6(v6) => Some(v6.into()),
            SocketAddr::V4(_) => None,
        }
    }
}

/// IPv4 address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressIpv4 {
    /// Address octets, most significant first.
    pub octets: [u8; 4],
    /// UDP port.
    pub port: u16,
}

impl AddressIpv4 {
    /// Create an address from octets and a port.
    pub const fn new(octets: [u8; 4], port: u16) -> Self {
        Self { octets, port }
    }

    /// `127.0.0.1:port`.
    pub const fn localhost(port: u16) -> Self {
        Self::new([127, 0, 0, 1], port)
    }
}

impl From<SocketAddrV4> for AddressIpv4 {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            octets: addr.ip().octets(),
            port: addr.port(),
        }
    }
}

impl From<AddressIpv4> for SocketAddrV4 {
    fn from(addr: AddressIpv4) -> Self {
        SocketAddrV4::new(Ipv4Addr::from(addr.octets), addr.port)
    }
}

impl From<AddressIpv4> for SocketAddr {
    fn from(addr: AddressIpv4) -> Self {
        SocketAddr::V4(addr.into())
    }
}

impl Display for AddressIpv4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&SocketAddrV4::from(*self), f)
    }
}

/// IPv6 address and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressIpv6 {
    /// Address groups, most significant first.
    pub groups: [u16; 8],
    /// UDP port.
    pub port: u16,
}

impl AddressIpv6 {
    /// Create an address from groups and a port.
    pub const fn new(groups: [u16; 8], port: u16) -> Self {
        Self { groups, port }
    }

    /// `[::1]:port`.
    pub const fn localhost(port: u16) -> Self {
        Self::new([0, 0, 0, 0, 0, 0, 0, 1], port)
    }
}

impl From<SocketAddrV6> for AddressIpv6 {
    fn from(addr: SocketAddrV6) -> Self {
        Self {
            groups: addr.ip().segments(),
            port: addr.port(),
        }
    }
}

impl From<AddressIpv6> for SocketAddrV6 {
    fn from(addr: AddressIpv6) -> Self {
        SocketAddrV6::new(Ipv6Addr::from(addr.groups), addr.port, 0, 0)
    }
}

impl From<AddressIpv6> for SocketAddr {
    fn from(addr: AddressIpv6) -> Self {
        SocketAddr::V6(addr.into())
    }
}

impl Display for AddressIpv6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&SocketAddrV6::from(*self), f)
    }
}
