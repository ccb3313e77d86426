//! Server-side demultiplexing of peers into connections.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::address::AddressFamily;
use crate::core::{ConnectionConfig, ConnectionError, DEFAULT_MAX_CONNECTIONS, Error, ReadError};
use crate::handshake::HandshakeStage;
use crate::packet::PacketBuffer;

use super::connection::{Connection, ReadStatus};
use super::security::{Security, idle_for};

/// Server connections keyed by peer address.
///
/// Each connection gets a `u32` id, stamped into the metadata of every
/// packet routed to it. New connections are only opened by handshake
/// carriers that start a handshake, and never beyond the table's capacity.
#[derive(Debug)]
pub struct ConnectionTable<S: Security, A: AddressFamily> {
    connections: HashMap<u32, Connection<S, A>>,
    by_address: HashMap<A::Address, u32>,
    next_id: u32,
    capacity: usize,
    credentials: S::Credentials,
    config: ConnectionConfig,
}

impl<S: Security, A: AddressFamily> ConnectionTable<S, A> {
    /// Table with the default capacity.
    pub fn new(credentials: S::Credentials, config: ConnectionConfig) -> Self {
        Self::with_capacity(credentials, config, DEFAULT_MAX_CONNECTIONS)
    }

    /// Table admitting at most `capacity` peers.
    pub fn with_capacity(
        credentials: S::Credentials,
        config: ConnectionConfig,
        capacity: usize,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            by_address: HashMap::new(),
            next_id: 0,
            capacity,
            credentials,
            config,
        }
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Maximum number of connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Id of the connection with a peer.
    pub fn lookup(&self, address: &A::Address) -> Option<u32> {
        self.by_address.get(address).copied()
    }

    /// Connection by id.
    pub fn get(&self, id: u32) -> Option<&Connection<S, A>> {
        self.connections.get(&id)
    }

    /// Mutable connection by id.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Connection<S, A>> {
        self.connections.get_mut(&id)
    }

    /// Iterate over connections with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Connection<S, A>)> {
        self.connections.iter().map(|(&id, connection)| (id, connection))
    }

    /// Iterate mutably over connections with their ids.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Connection<S, A>)> {
        self.connections
            .iter_mut()
            .map(|(&id, connection)| (id, connection))
    }

    /// Id of the connection with `address`, opening one if needed.
    pub fn accept(&mut self, address: A::Address) -> Result<u32, ConnectionError> {
        if let Some(id) = self.lookup(&address) {
            return Ok(id);
        }

        self.ensure_capacity(&address)?;
        let connection = Connection::server(address, self.credentials.clone(), self.config);
        Ok(self.insert(connection))
    }

    fn ensure_capacity(&self, address: &A::Address) -> Result<(), ConnectionError> {
        if self.connections.len() >= self.capacity {
            warn!(peer = %address, capacity = self.capacity, "connection table exhausted");
            return Err(ConnectionError::Exhausted {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn insert(&mut self, connection: Connection<S, A>) -> u32 {
        let id = self.allocate_id();
        let address = connection.address();
        self.connections.insert(id, connection);
        self.by_address.insert(address, id);
        debug!(peer = %address, id, security = S::NAME, "connection opened");
        id
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.connections.contains_key(&id) {
                return id;
            }
        }
    }

    /// Close a connection, dropping its key material.
    pub fn remove(&mut self, id: u32) -> Option<Connection<S, A>> {
        let connection = self.connections.remove(&id)?;
        self.by_address.remove(&connection.address());
        debug!(peer = %connection.address(), id, "connection closed");
        Some(connection)
    }

    /// Route an inbound packet from `address` to its connection.
    ///
    /// Returns the connection id and read status. An unknown peer only gets
    /// a connection once its first packet is a handshake carrier that moves
    /// the handshake forward; anything else is rejected with
    /// [`ReadError::Context`] and leaves the table untouched.
    pub fn read_packet(
        &mut self,
        address: A::Address,
        packet: &mut PacketBuffer<S::Tag, A>,
    ) -> Result<(u32, ReadStatus), Error> {
        if let Some(id) = self.lookup(&address) {
            packet.set_connection_id(id);
            let connection = self
                .connections
                .get_mut(&id)
                .ok_or(Error::Read(ReadError::Context))?;
            let status = connection.read_packet(packet)?;
            return Ok((id, status));
        }

        if !packet.is_handshake() {
            return Err(ReadError::Context.into());
        }
        self.ensure_capacity(&address)?;

        let mut connection = Connection::server(address, self.credentials.clone(), self.config);
        let status = connection.read_packet(packet)?;
        if connection.stage() == HandshakeStage::Disconnected {
            debug!(peer = %address, "handshake carrier did not open a connection");
            return Err(ReadError::Context.into());
        }

        let id = self.insert(connection);
        packet.set_connection_id(id);
        Ok((id, status))
    }

    /// Ids of connections that have been silent for at least `seconds`
    /// (at most 255).
    pub fn idle_connections(&self, seconds: u8) -> Vec<u32> {
        self.connections
            .iter()
            .filter(|(_, connection)| idle_for(connection.idle_since()) >= seconds)
            .map(|(&id, _)| id)
            .collect()
    }
}
