//! Saltline Echo
//!
//! Runs an authenticated echo server and a client against it over
//! localhost UDP. The client sends a counter, the server sends it back.
//!
//! Environment variables:
//! - SALTLINE_ECHO_COUNT: number of echoes to exchange (default 10)
//! - RUST_LOG: tracing filter (default "info")

use std::time::Duration;

use anyhow::{Context, Result, bail};
use saltline::prelude::*;
use saltline::packet::SecureTag;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const ECHO: u16 = 1;
const RESEND_INTERVAL: Duration = Duration::from_millis(100);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(mut socket: Socket<Ipv4>, keys: KeyPair, count: u32) -> Result<()> {
    let mut table = ConnectionTable::<Authenticated, Ipv4>::new(keys, ConnectionConfig::default());
    let mut echoed = 0;

    while echoed < count {
        let (mut packet, from) = match socket.recv_packet::<SecureTag>().await {
            Ok(received) => received,
            Err(err) => {
                debug!(error = %err, "undecodable datagram");
                continue;
            }
        };

        let (id, status) = match table.read_packet(from, &mut packet) {
            Ok(routed) => routed,
            Err(err) => {
                debug!(peer = %from, error = %err, "dropped");
                continue;
            }
        };
        let Some(connection) = table.get_mut(id) else {
            continue;
        };

        if let Some(reply) = connection.poll_handshake()? {
            socket.send_packet(&reply, from).await?;
        }

        if status == ReadStatus::Available && packet.header.kind == ECHO {
            let value = packet.deserialize_u32()?;
            let mut reply = SecurePacket::<Ipv4>::new(ECHO);
            reply.serialize_u32(value)?;
            connection.write_packet(&mut reply)?;
            socket.send_packet(&reply, from).await?;
            echoed += 1;
        }
    }

    info!(connections = table.len(), echoed, "server done");
    Ok(())
}

async fn handshake(
    socket: &mut Socket<Ipv4>,
    client: &mut Connection<Authenticated, Ipv4>,
) -> Result<()> {
    let server = client.address();
    while !client.is_connected() {
        if let Some(packet) = client.poll_handshake()? {
            socket.send_packet(&packet, server).await?;
        }
        if let Ok(received) = timeout(RESEND_INTERVAL, socket.recv_packet()).await {
            let (mut packet, _) = received?;
            if let Err(err) = client.read_packet(&mut packet) {
                warn!(error = %err, "handshake packet rejected");
            }
        }
    }
    Ok(())
}

async fn run_client(server_address: AddressIpv4, server_public: KeyBuffer, count: u32) -> Result<()> {
    let mut socket = Socket::<Ipv4>::bind(AddressIpv4::localhost(0)).await?;
    let mut client = Connection::<Authenticated, Ipv4>::secure_client(
        server_address,
        KeyPair::ephemeral(),
        &server_public,
        ConnectionConfig::default(),
    )?;

    timeout(HANDSHAKE_TIMEOUT, handshake(&mut socket, &mut client))
        .await
        .context("handshake timed out")??;
    info!(server = %server_address, "connected");

    for value in 0..count {
        let mut packet = SecurePacket::<Ipv4>::new(ECHO);
        packet.serialize_u32(value)?;
        client.write_packet(&mut packet)?;
        socket.send_packet(&packet, server_address).await?;

        let echoed = loop {
            let (mut reply, _) = timeout(HANDSHAKE_TIMEOUT, socket.recv_packet())
                .await
                .context("echo timed out")??;
            match client.read_packet(&mut reply) {
                Ok(ReadStatus::Available) => break reply.deserialize_u32()?,
                Ok(ReadStatus::Ignored) => {}
                Err(err) => debug!(error = %err, "dropped"),
            }
        };

        if echoed != value {
            bail!("expected echo {value}, got {echoed}");
        }
        info!(
            value,
            sequence = ?client.send_sequence(),
            acknowledged = client.receive_sequence().number,
            "echo"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let count = match std::env::var("SALTLINE_ECHO_COUNT") {
        Ok(value) => value.parse().context("SALTLINE_ECHO_COUNT must be a number")?,
        Err(_) => 10,
    };

    info!("Starting saltline-echo v{}", env!("CARGO_PKG_VERSION"));

    let keys = KeyPair::ephemeral();
    let server_public = keys.public_key().clone();
    let socket = Socket::<Ipv4>::bind(AddressIpv4::localhost(0)).await?;
    let server_address = socket.local_addr()?;
    info!(address = %server_address, "server listening");

    let server = tokio::spawn(serve(socket, keys, count));
    run_client(server_address, server_public, count).await?;
    server.await??;

    Ok(())
}
