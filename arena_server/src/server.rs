//! Server implementation.
//!
//! Socket layer around [`ServerWorld`]. Each accepted connection is split:
//! a forwarder task feeds decoded frames into one shared channel tagged with
//! the player id, and the write half stays here so the tick loop can fan out
//! whatever the world produced. Handshakes run on their own tasks and hand
//! finished joins back over a channel, so a silent peer never holds up a
//! tick.
//!
//! Determinism notes:
//! - Simulation runs in a fixed timestep inside [`ServerWorld`].
//! - Inbound messages are applied in arrival order before each step.

use anyhow::Context;
use arena_shared::{
    config::SyncConfig,
    entity::{Bomb, Bullet, Player, PlayerId},
    net::{FrameWriter, Inbound, NetMsg, ReliableConn, ReliableListener, PROTOCOL_VERSION},
};
use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::world::{Outgoing, ServerWorld};

/// How long a fresh connection has to send its `Join`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the shared inbound channel.
const INBOUND_CAPACITY: usize = 1024;

/// Handshakes finished but not yet admitted.
const JOIN_QUEUE: usize = 64;

/// A connection that sent a valid `Join`.
struct Handshaken {
    conn: ReliableConn,
    peer: SocketAddr,
    name: String,
}

type HandshakeResult = anyhow::Result<Handshaken>;

/// Connected client state.
struct ClientState {
    writer: FrameWriter,
    peer: SocketAddr,
    reader: JoinHandle<()>,
}

impl Drop for ClientState {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Game server.
pub struct GameServer {
    pub cfg: SyncConfig,
    world: ServerWorld,
    clients: BTreeMap<PlayerId, ClientState>,

    tcp: ReliableListener,
    inbound_tx: mpsc::Sender<(PlayerId, Inbound)>,
    inbound_rx: mpsc::Receiver<(PlayerId, Inbound)>,
    joins_tx: mpsc::Sender<HandshakeResult>,
    joins_rx: mpsc::Receiver<HandshakeResult>,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
    running: bool,
}

impl GameServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn new(cfg: SyncConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (joins_tx, joins_rx) = mpsc::channel(JOIN_QUEUE);

        Ok(Self {
            world: ServerWorld::new(cfg.clone()),
            cfg,
            clients: BTreeMap::new(),
            tcp,
            inbound_tx,
            inbound_rx,
            joins_tx,
            joins_rx,
            console_rx: None,
            running: true,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn world(&self) -> &ServerWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ServerWorld {
        &mut self.world
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// False once `quit` was issued.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Accepts one connection and waits for a handshake to finish. Other
    /// handshakes already in flight may finish first; whichever does is
    /// admitted.
    pub async fn accept_one(&mut self) -> anyhow::Result<PlayerId> {
        let (conn, peer) = self.tcp.accept().await?;
        self.spawn_handshake(conn, peer);
        let done = self
            .joins_rx
            .recv()
            .await
            .context("handshake channel closed")?;
        let id = self.admit(done?);
        self.flush().await;
        Ok(id)
    }

    /// Waits up to `timeout` for a connection and starts its handshake in
    /// the background. The player is admitted by a later [`step`](Self::step).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<SocketAddr>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => {
                self.spawn_handshake(conn, peer);
                Ok(Some(peer))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    fn spawn_handshake(&self, conn: ReliableConn, peer: SocketAddr) {
        debug!(%peer, "handshake started");
        let joins = self.joins_tx.clone();
        tokio::spawn(async move {
            let done = handshake(conn, peer).await;
            // The server is gone if this fails; nothing to admit into.
            let _ = joins.send(done).await;
        });
    }

    /// Admits every finished handshake. Failed ones were already closed.
    async fn admit_joins(&mut self) {
        let mut admitted = false;
        while let Ok(done) = self.joins_rx.try_recv() {
            match done {
                Ok(hs) => {
                    self.admit(hs);
                    admitted = true;
                }
                Err(e) => warn!(error = %format!("{e:#}"), "handshake failed"),
            }
        }
        if admitted {
            // The join ack must not wait for the next tick.
            self.flush().await;
        }
    }

    fn admit(&mut self, hs: Handshaken) -> PlayerId {
        let Handshaken { conn, peer, name } = hs;
        let id = self.world.join(&name);
        let (reader, writer) = conn.into_split();
        let reader = reader.spawn_forwarder(id, self.inbound_tx.clone());
        self.clients.insert(
            id,
            ClientState {
                writer,
                peer,
                reader,
            },
        );
        info!(player_id = %id, %peer, name = %name, "client connected");
        id
    }

    /// Runs the server for a number of ticks, accepting newcomers between
    /// steps.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            if let Err(e) = self.try_accept(Duration::from_millis(1)).await {
                warn!(error = %format!("{e:#}"), "accept failed");
            }
            self.step().await?;
            if !self.running {
                break;
            }
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands();
        self.admit_joins().await;
        self.recv_messages();
        self.world.step();
        self.flush().await;
        Ok(())
    }

    fn process_console_commands(&mut self) {
        let lines: Vec<String> = match self.console_rx.as_mut() {
            Some(rx) => std::iter::from_fn(|| rx.try_recv().ok()).collect(),
            None => Vec::new(),
        };
        for line in lines {
            for out in self.exec_console(&line) {
                println!("{out}");
            }
        }
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Vec::new();
        };

        match command {
            "status" => {
                let store = self.world.store();
                let mut out = vec![
                    format!("Tick: {}", self.world.tick()),
                    format!("Server time: {}ms", self.world.server_time_ms()),
                    format!(
                        "Entities: {} players, {} bullets, {} bombs",
                        store.len::<Player>(),
                        store.len::<Bullet>(),
                        store.len::<Bomb>()
                    ),
                    format!("Clients: {}", self.clients.len()),
                ];
                for (id, client) in &self.clients {
                    let line = match store.get::<Player>(*id) {
                        Some(p) => format!(
                            "  {id} {} peer={} hp={} k/d={}/{} ack={:?}",
                            p.name,
                            client.peer,
                            p.health,
                            p.kills,
                            p.deaths,
                            self.world.last_processed(*id)
                        ),
                        None => format!("  {id} peer={}", client.peer),
                    };
                    out.push(line);
                }
                out
            }
            "kick" => {
                let Some(id) = tokens.get(1).and_then(|t| t.trim_start_matches('p').parse::<u32>().ok())
                else {
                    return vec!["Usage: kick <player id>".to_string()];
                };
                let id = PlayerId(id);
                if self.clients.remove(&id).is_none() {
                    return vec![format!("No such player: {id}")];
                }
                self.world.leave(id);
                info!(player_id = %id, "kicked");
                vec![format!("Kicked {id}")]
            }
            "quit" | "exit" => {
                info!("server shutting down");
                self.running = false;
                vec!["Shutting down".to_string()]
            }
            other => vec![format!("Unknown command: {other}")],
        }
    }

    fn recv_messages(&mut self) {
        while let Ok((from, item)) = self.inbound_rx.try_recv() {
            match item {
                Inbound::Message(msg) => self.world.handle(from, msg),
                Inbound::Rejected(e) => {
                    debug!(player_id = %from, error = %e, "undecodable frame dropped");
                }
                Inbound::Closed(reason) => {
                    if self.clients.remove(&from).is_some() {
                        info!(player_id = %from, %reason, "client disconnected");
                        self.world.leave(from);
                    }
                }
            }
        }
    }

    /// Writes everything the world queued. A client whose write fails is
    /// dropped and removed from the match.
    async fn flush(&mut self) {
        loop {
            let outgoing = self.world.drain_outgoing();
            if outgoing.is_empty() {
                break;
            }
            let mut failed = Vec::new();
            for out in outgoing {
                match out {
                    Outgoing::To(id, msg) => {
                        if let Some(client) = self.clients.get_mut(&id) {
                            if let Err(e) = client.writer.send(&msg).await {
                                debug!(player_id = %id, error = %format!("{e:#}"), "send failed");
                                failed.push(id);
                            }
                        }
                    }
                    Outgoing::Broadcast(msg) => {
                        for (id, client) in self.clients.iter_mut() {
                            if let Err(e) = client.writer.send(&msg).await {
                                debug!(player_id = %id, error = %format!("{e:#}"), "send failed");
                                failed.push(*id);
                            }
                        }
                    }
                }
            }
            failed.sort();
            failed.dedup();
            for id in failed {
                if self.clients.remove(&id).is_some() {
                    warn!(player_id = %id, "dropping unreachable client");
                    self.world.leave(id);
                }
            }
        }
    }
}

/// Reads the opening `Join`. Dropping `conn` on failure closes it.
async fn handshake(mut conn: ReliableConn, peer: SocketAddr) -> HandshakeResult {
    let msg = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
        .await
        .with_context(|| format!("{peer} sent no join"))??;
    let name = match msg {
        NetMsg::Join { protocol, name } if protocol == PROTOCOL_VERSION => name,
        NetMsg::Join { protocol, .. } => {
            anyhow::bail!("{peer} speaks protocol {protocol}, expected {PROTOCOL_VERSION}")
        }
        other => anyhow::bail!("unexpected handshake msg from {peer}: {}", other.kind()),
    };
    Ok(Handshaken { conn, peer, name })
}

/// Helper for tests: bind to an ephemeral loopback port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, SyncConfig)> {
    let cfg = SyncConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        tick_hz,
        ..Default::default()
    };
    let mut server = GameServer::new(cfg).await?;
    let addr = server.local_addr()?;
    server.cfg.server_addr = addr.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_assigns_player_and_acks() {
        let (mut server, cfg) = bind_ephemeral(64).await.unwrap();
        let addr: SocketAddr = cfg.server_addr.parse().unwrap();

        let client = tokio::spawn(async move {
            let mut conn = ReliableConn::connect(addr).await.unwrap();
            conn.send(&NetMsg::Join {
                protocol: PROTOCOL_VERSION,
                name: "ana".into(),
            })
            .await
            .unwrap();
            conn.recv().await.unwrap()
        });

        let id = server.accept_one().await.unwrap();
        let ack = client.await.unwrap();
        assert!(matches!(ack, NetMsg::JoinAck { player_id, tick_hz: 64, .. } if player_id == id));
        assert_eq!(server.client_count(), 1);
    }

    #[tokio::test]
    async fn wrong_protocol_is_refused() {
        let (mut server, cfg) = bind_ephemeral(64).await.unwrap();
        let addr: SocketAddr = cfg.server_addr.parse().unwrap();

        let client = tokio::spawn(async move {
            let mut conn = ReliableConn::connect(addr).await.unwrap();
            conn.send(&NetMsg::Join {
                protocol: PROTOCOL_VERSION + 1,
                name: "ana".into(),
            })
            .await
            .unwrap();
            conn.recv().await.is_err()
        });

        assert!(server.accept_one().await.is_err());
        assert_eq!(server.client_count(), 0);
        drop(server);
        assert!(client.await.unwrap());
    }

    #[tokio::test]
    async fn silent_connection_does_not_hold_up_ticks() {
        let (mut server, cfg) = bind_ephemeral(64).await.unwrap();
        let addr: SocketAddr = cfg.server_addr.parse().unwrap();
        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();

        let started = Instant::now();
        assert!(server
            .try_accept(Duration::from_millis(500))
            .await
            .unwrap()
            .is_some());
        server.step().await.unwrap();
        server.step().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(server.world().tick(), 2);
        assert_eq!(server.client_count(), 0);

        // A real client behind the silent one still gets in.
        let joiner = tokio::spawn(async move {
            let mut conn = ReliableConn::connect(addr).await.unwrap();
            conn.send(&NetMsg::Join {
                protocol: PROTOCOL_VERSION,
                name: "bo".into(),
            })
            .await
            .unwrap();
            conn.recv().await.unwrap()
        });
        assert!(server
            .try_accept(Duration::from_millis(500))
            .await
            .unwrap()
            .is_some());
        for _ in 0..50 {
            server.step().await.unwrap();
            if server.client_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(server.client_count(), 1);
        assert!(matches!(joiner.await.unwrap(), NetMsg::JoinAck { .. }));
        assert!(started.elapsed() < HANDSHAKE_TIMEOUT);
    }

    #[tokio::test]
    async fn console_quit_stops_loop() {
        let (mut server, _) = bind_ephemeral(64).await.unwrap();
        assert!(server.exec_console("status")[0].starts_with("Tick: 0"));
        assert_eq!(server.exec_console("kick p9"), vec!["No such player: p9"]);
        server.exec_console("quit");
        assert!(!server.is_running());
        server.run_for_ticks(10).await.unwrap();
        assert_eq!(server.world().tick(), 1);
    }
}
