//! Connection ingestion - one worker per device connection
//!
//! Resolves the peer address to a device, registers an outbound queue for
//! it, then turns every inbound line into a game event until the stream
//! ends. Every session that gets past resolution emits exactly one
//! `DeviceConnected` and exactly one `DeviceDisconnected`, in that order.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::directory::{DeviceDirectory, DeviceIdentity};
use crate::dispatch::{Connection, ConnectionDirectory, OUTBOUND_QUEUE_DEPTH};
use crate::game::{BaseStation, Car, Device, DeviceKind, Event, SessionId};

use super::protocol::{parse_line, ProtocolError, MAX_LINE_LEN};

/// Everything a connection worker needs, shared by all of them
#[derive(Clone)]
pub struct IngestContext {
    pub directory: Arc<DeviceDirectory>,
    pub connections: Arc<ConnectionDirectory>,
    pub events: mpsc::Sender<Event>,
}

/// The identity a running session speaks for
#[derive(Debug, Clone, Copy)]
struct SessionInfo {
    kind: DeviceKind,
    id: u8,
    address: IpAddr,
    session: SessionId,
}

/// Drive one device connection from accept to disconnect
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: IngestContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let address = canonical_ip(peer.ip());

    let Some(identity) = ctx.directory.resolve(address) else {
        info!(addr = %peer, "Rejected connection from unknown address");
        return;
    };

    let session = ctx.connections.next_session();
    let device = build_device(identity, address, session);
    let who = SessionInfo {
        kind: device.kind(),
        id: device.id(),
        address,
        session,
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    ctx.connections.register(
        address,
        Connection::new(who.kind, who.id, session, outbound_tx),
    );

    match identity {
        DeviceIdentity::Car { sighting_code, .. } => info!(
            kind = %who.kind,
            id = who.id,
            addr = %peer,
            session,
            sighting_code,
            "Device connected"
        ),
        DeviceIdentity::BaseStation { .. } => info!(
            kind = %who.kind,
            id = who.id,
            addr = %peer,
            session,
            "Device connected"
        ),
    }

    if ctx.events.send(Event::DeviceConnected(device)).await.is_err() {
        debug!(addr = %peer, "Game loop gone, dropping connection");
        ctx.connections.unregister(address, session);
        return;
    }

    let (read_half, write_half) = tokio::io::split(stream);

    // Writer task: outbound queue -> device
    let writer_handle = tokio::spawn(write_frames(write_half, outbound_rx, who));

    // Reader loop: device -> game loop
    let mut reader = BufReader::new(read_half);
    if let Err(e) = read_sightings(&mut reader, &ctx, who).await {
        debug!(addr = %peer, session, error = %e, "Device stream faulted");
    }

    // Cleanup on disconnect
    ctx.connections.unregister(address, session);
    let _ = ctx
        .events
        .send(Event::DeviceDisconnected {
            kind: who.kind,
            id: who.id,
            address,
            session,
        })
        .await;

    writer_handle.abort();

    info!(kind = %who.kind, id = who.id, addr = %peer, session, "Device disconnected");
}

fn build_device(identity: DeviceIdentity, address: IpAddr, session: SessionId) -> Device {
    let now = Instant::now();
    match identity {
        DeviceIdentity::Car { id, team, .. } => {
            Device::Car(Car::new(id, team, address, session, now))
        }
        DeviceIdentity::BaseStation { id, team } => {
            Device::BaseStation(BaseStation::new(id, team, address, session, now))
        }
    }
}

/// Devices listening on a dual-stack socket show up as IPv4-mapped IPv6
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

async fn write_frames<W>(mut writer: W, mut outbound: mpsc::Receiver<Bytes>, who: SessionInfo)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(
                addr = %who.address,
                session = who.session,
                error = %e,
                "Write to device failed, command dropped"
            );
            break;
        }
    }
}

/// Read lines until EOF; malformed lines are logged and skipped
async fn read_sightings<R>(
    reader: &mut R,
    ctx: &IngestContext,
    who: SessionInfo,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(());
        }

        if n == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            warn!(addr = %who.address, error = %ProtocolError::TooLong, "Malformed line discarded");
            if !discard_rest_of_line(reader).await? {
                return Ok(());
            }
            continue;
        }

        let parsed = std::str::from_utf8(&buf)
            .map_err(|_| ProtocolError::NotUtf8)
            .and_then(|line| parse_line(who.kind, line));

        let code = match parsed {
            Ok(Some(code)) => code,
            Ok(None) => continue,
            Err(e) => {
                warn!(
                    addr = %who.address,
                    line = %String::from_utf8_lossy(&buf).trim_end(),
                    error = %e,
                    "Malformed line discarded"
                );
                continue;
            }
        };

        let Some(seen) = ctx.directory.car_for_code(code) else {
            debug!(addr = %who.address, code, "Sighting code belongs to no car");
            continue;
        };

        let event = match who.kind {
            DeviceKind::Car => Event::CarSighted {
                shooter: who.id,
                target: seen,
            },
            DeviceKind::BaseStation => Event::BaseStationSighted {
                base_station: who.id,
                car: seen,
            },
        };

        if ctx.events.send(event).await.is_err() {
            debug!(addr = %who.address, "Event channel closed");
            return Ok(());
        }
    }
}

/// Skip input up to and including the next newline; false on EOF
async fn discard_rest_of_line<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(false);
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(true);
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
