//! Wire codec and stream framing.
//!
//! Goals:
//! - One message enum shared by client and server.
//! - Decoding is pure: bytes in, message or [`ProtocolError`] out. Applying a
//!   message to the world is a separate dispatch step.
//! - Frames are a 4-byte big-endian length followed by a JSON payload with an
//!   internal `"type"` tag.
//!
//! Precision: positions, directions and angles are `f32` on both ends.
//! serde_json emits the shortest text that parses back to the same `f32`, so
//! encoding is lossless and symmetric.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    entity::{Bomb, BombId, BulletId, Player, PlayerId},
    error::ProtocolError,
    input::SequencedInput,
    math::Vec3,
    weapon::WeaponKind,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Every `"type"` tag this build understands.
pub const MESSAGE_KINDS: &[&str] = &[
    "join",
    "join_ack",
    "input_update",
    "state_snapshot",
    "fire_event",
    "hit_confirm",
    "blast_damage",
    "player_death",
    "bomb_plant",
    "bomb_detonate",
    "bomb_defuse",
    "leave",
];

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetMsg {
    // ─── Session ───
    /// Client -> server: request to join the match.
    Join { protocol: u32, name: String },
    /// Server -> client: join accepted.
    JoinAck {
        player_id: PlayerId,
        server_time_ms: u64,
        tick_hz: u32,
    },
    /// Either direction: a player leaves.
    Leave { player_id: PlayerId },

    // ─── Movement ───
    /// Client -> server: every input sampled since the previous send.
    InputUpdate {
        player_id: PlayerId,
        inputs: Vec<SequencedInput>,
    },
    /// Server -> client: authoritative world state.
    StateSnapshot(StateSnapshot),

    // ─── Combat ───
    /// Client -> server: a shot; server -> clients: spawn broadcast.
    FireEvent(FireEvent),
    /// Server -> clients: a bullet hit a player.
    HitConfirm {
        bullet_id: BulletId,
        target_id: PlayerId,
        damage: i32,
    },
    /// Server -> clients: area damage from a detonation.
    BlastDamage {
        bomb_id: BombId,
        target_id: PlayerId,
        damage: i32,
    },
    /// Server -> clients: a player died.
    PlayerDeath {
        player_id: PlayerId,
        killer_id: PlayerId,
    },

    // ─── Bombs ───
    /// Client -> server: plant request (`armed_at_ms` ignored);
    /// server -> clients: confirmed placement with arm time.
    BombPlant {
        bomb_id: BombId,
        planted_by: PlayerId,
        position: Vec3,
        armed_at_ms: u64,
        fuse_ms: u64,
    },
    /// Server -> clients: a bomb went off.
    BombDetonate {
        bomb_id: BombId,
        position: Vec3,
        detonated_at_ms: u64,
    },
    /// Client -> server: defuse request; server -> clients: bomb removed.
    BombDefuse {
        bomb_id: BombId,
        defused_by: PlayerId,
    },
}

impl NetMsg {
    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            NetMsg::Join { .. } => "join",
            NetMsg::JoinAck { .. } => "join_ack",
            NetMsg::Leave { .. } => "leave",
            NetMsg::InputUpdate { .. } => "input_update",
            NetMsg::StateSnapshot(_) => "state_snapshot",
            NetMsg::FireEvent(_) => "fire_event",
            NetMsg::HitConfirm { .. } => "hit_confirm",
            NetMsg::BlastDamage { .. } => "blast_damage",
            NetMsg::PlayerDeath { .. } => "player_death",
            NetMsg::BombPlant { .. } => "bomb_plant",
            NetMsg::BombDetonate { .. } => "bomb_detonate",
            NetMsg::BombDefuse { .. } => "bomb_defuse",
        }
    }
}

/// A shot, as sent by the shooter and re-broadcast by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FireEvent {
    pub player_id: PlayerId,
    pub bullet_id: BulletId,
    pub origin: Vec3,
    pub direction: Vec3,
    pub weapon: WeaponKind,
    /// Shooter's estimate of server time at the shot; the server overwrites
    /// it with its own clock when broadcasting.
    pub fired_at_ms: u64,
}

/// Authoritative state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityState {
    Player(Player),
    Bomb(Bomb),
}

/// World snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub tick: u32,
    pub server_time_ms: u64,
    /// Last input sequence of the receiving client the server has simulated.
    pub ack_sequence: Option<u32>,
    /// When set, entities absent from the list no longer exist.
    pub full: bool,
    pub entities: Vec<EntityState>,
}

/// Encodes a message payload (no length prefix).
pub fn encode(msg: &NetMsg) -> Result<Bytes, ProtocolError> {
    serde_json::to_vec(msg)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decodes a message payload.
///
/// Unknown `"type"` tags are reported as [`ProtocolError::Unrecognized`]
/// so callers can tell a newer peer from a corrupt one.
pub fn decode(bytes: &[u8]) -> Result<NetMsg, ProtocolError> {
    match serde_json::from_slice::<NetMsg>(bytes) {
        Ok(msg) => Ok(msg),
        Err(err) => {
            let kind = serde_json::from_slice::<serde_json::Value>(bytes)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned));
            match kind {
                Some(kind) if !MESSAGE_KINDS.contains(&kind.as_str()) => {
                    Err(ProtocolError::Unrecognized { kind })
                }
                _ => Err(ProtocolError::Malformed(err.to_string())),
            }
        }
    }
}

/// Encodes a message with its length prefix.
pub fn encode_frame(msg: &NetMsg) -> Result<Bytes, ProtocolError> {
    let payload = encode(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, msg: &NetMsg) -> anyhow::Result<()> {
    let frame = encode_frame(msg)?;
    w.write_all(&frame).await.context("tcp write")?;
    Ok(())
}

/// Reads one frame. `Ok(None)` is a clean close at a frame boundary; an
/// undecodable payload is returned as an inner error and the stream stays
/// usable.
async fn read_frame<R: AsyncRead + Unpin>(
    r: &mut R,
) -> anyhow::Result<Option<Result<NetMsg, ProtocolError>>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        // Framing is lost past this point.
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        }
        .into());
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Some(decode(&payload)))
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        match read_frame(&mut self.stream).await? {
            Some(msg) => Ok(msg?),
            None => anyhow::bail!("connection closed by peer"),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { inner: r }, FrameWriter { inner: w })
    }
}

/// What a reader task forwards to the owning loop.
#[derive(Debug)]
pub enum Inbound {
    Message(NetMsg),
    /// A frame arrived but did not decode; the stream is still healthy.
    Rejected(ProtocolError),
    /// The stream ended; no further items follow.
    Closed(String),
}

/// Read half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    inner: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<Option<Result<NetMsg, ProtocolError>>> {
        read_frame(&mut self.inner).await
    }

    /// Spawns a task that forwards every frame, tagged, until the stream
    /// ends or the receiver goes away.
    pub fn spawn_forwarder<T>(mut self, tag: T, tx: mpsc::Sender<(T, Inbound)>) -> JoinHandle<()>
    where
        T: Clone + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                let item = match self.recv().await {
                    Ok(Some(Ok(msg))) => Inbound::Message(msg),
                    Ok(Some(Err(e))) => Inbound::Rejected(e),
                    Ok(None) => Inbound::Closed("closed by peer".to_string()),
                    Err(e) => Inbound::Closed(format!("{e:#}")),
                };
                let closed = matches!(item, Inbound::Closed(_));
                if tx.send((tag.clone(), item)).await.is_err() || closed {
                    debug!(closed, "frame forwarder exiting");
                    break;
                }
            }
        })
    }
}

/// Write half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    inner: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.inner, msg).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
