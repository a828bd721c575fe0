//! Client implementation.
//!
//! The client maintains:
//! - One TCP connection carrying length-prefixed JSON frames
//! - A reader task that decodes frames and forwards them over a channel
//! - The sans-IO [`ClientSession`] that owns all game state
//! - Reconnect with bounded exponential backoff

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use arena_shared::{
    config::{ReconnectPolicy, SyncConfig},
    effects::EffectSink,
    entity::{Bomb, Bullet, Player, PlayerId},
    error::SyncError,
    net::{FrameReader, FrameWriter, Inbound, NetMsg, ReliableConn, PROTOCOL_VERSION},
};
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{input::InputState, session::ClientSession};

/// Inbound frames buffered between the reader task and the tick loop.
const INBOUND_QUEUE: usize = 1024;

/// Connection state, for the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    /// Handshake in progress.
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, or `None` once attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let ms = self
            .policy
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.policy.max_backoff_ms);
        self.attempt += 1;
        Some(Duration::from_millis(ms))
    }

    /// Attempts made since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Logs a core error with the recovery it implies.
pub fn report(err: &SyncError) {
    match err {
        SyncError::Protocol(e) => warn!(error = %e, "dropping undecodable message"),
        SyncError::Desync(reason) => warn!(%reason, "prediction desync; resynced from snapshot"),
        SyncError::ConnectionLost(reason) => warn!(%reason, "connection lost"),
        SyncError::AuthorityConflict(what) => info!(%what, "server state overrode local prediction"),
    }
}

struct Link {
    writer: FrameWriter,
    inbound: mpsc::Receiver<((), Inbound)>,
    reader: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Result of a completed join handshake.
struct Joined {
    player_id: PlayerId,
    server_time_ms: u64,
    tick_hz: u32,
    reader: FrameReader,
    writer: FrameWriter,
}

/// Reconnect progress while no link is up.
enum Redial {
    /// Waiting out the backoff delay.
    Waiting { until: Instant },
    /// Handshake running on its own task.
    Dialing(JoinHandle<anyhow::Result<Joined>>),
}

/// High-level game client.
pub struct GameClient {
    cfg: SyncConfig,
    addr: SocketAddr,
    pub session: ClientSession,
    status: ConnectionStatus,
    link: Option<Link>,
    redial: Option<Redial>,
    backoff: Backoff,
    started: Instant,
}

impl Drop for GameClient {
    fn drop(&mut self) {
        if let Some(Redial::Dialing(task)) = &self.redial {
            task.abort();
        }
    }
}

impl GameClient {
    /// Connects to the server and performs the join handshake.
    pub async fn connect(cfg: SyncConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %addr, name = %cfg.player_name, "connecting to server");

        let mut client = Self {
            session: ClientSession::new(cfg.clone()),
            backoff: Backoff::new(cfg.reconnect),
            cfg,
            addr,
            status: ConnectionStatus::Connecting,
            link: None,
            redial: None,
            started: Instant::now(),
        };
        let joined = match dial(client.addr, client.cfg.player_name.clone(), client.join_timeout()).await {
            Ok(joined) => joined,
            Err(e) => {
                client.status = ConnectionStatus::Disconnected;
                return Err(e);
            }
        };
        client.install(joined);
        Ok(client)
    }

    fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.join_timeout_ms)
    }

    /// Takes over a finished handshake. A session that was joined before is
    /// cleared first so the next full snapshot rebuilds it.
    fn install(&mut self, joined: Joined) {
        if joined.tick_hz != self.cfg.tick_hz {
            warn!(
                server = joined.tick_hz,
                local = self.cfg.tick_hz,
                "tick rate differs from server; predictions will be corrected often"
            );
        }
        if self.session.local_player_id().is_some() {
            self.session.reset_for_reconnect();
        }
        self.session
            .on_join_ack(joined.player_id, joined.server_time_ms, self.now());

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let handle = joined.reader.spawn_forwarder((), tx);
        self.link = Some(Link {
            writer: joined.writer,
            inbound: rx,
            reader: handle,
        });
        self.redial = None;
        self.status = ConnectionStatus::Connected;
        self.backoff.reset();
        info!(player_id = %joined.player_id, "connected to server");
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.session.local_player_id()
    }

    /// Local monotonic time since the client was created.
    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }

    /// Runs one tick: apply everything received, simulate, send.
    ///
    /// The session ticks whether or not a link is up, so remote entities
    /// keep ageing out while disconnected. Never waits on the network beyond
    /// writing this tick's outbound frames.
    ///
    /// [`SyncError::ConnectionLost`] is returned on the tick the link drops
    /// and when reconnect attempts run out; every other error is logged and
    /// the session carries on.
    pub async fn tick(
        &mut self,
        input: &InputState,
        effects: &mut dyn EffectSink,
    ) -> Result<(), SyncError> {
        let now = self.now();
        let mut result = self.poll_redial().await;

        if self.link.is_some() {
            if let Err(e) = self.pump(now, effects) {
                result = Err(e);
            }
        }
        if let Err(SyncError::ConnectionLost(reason)) = &result {
            self.on_lost(reason);
        }

        self.session.tick(input, now, effects);

        if result.is_ok() && self.link.is_some() {
            if let Err(e) = self.flush(now).await {
                if let SyncError::ConnectionLost(reason) = &e {
                    self.on_lost(reason);
                }
                result = Err(e);
            }
        }
        result
    }

    /// Applies every inbound message already queued. Never waits.
    fn pump(&mut self, now: Duration, effects: &mut dyn EffectSink) -> Result<(), SyncError> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        loop {
            match link.inbound.try_recv() {
                Ok(((), Inbound::Message(msg))) => {
                    match self.session.handle_message(msg, now, effects) {
                        Ok(()) => {}
                        Err(e @ SyncError::ConnectionLost(_)) => return Err(e),
                        Err(e) => report(&e),
                    }
                }
                Ok(((), Inbound::Rejected(e))) => report(&SyncError::Protocol(e)),
                Ok(((), Inbound::Closed(reason))) => {
                    return Err(SyncError::ConnectionLost(reason));
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(SyncError::ConnectionLost("reader stopped".to_string()));
                }
            }
        }
    }

    async fn flush(&mut self, now: Duration) -> Result<(), SyncError> {
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        for msg in self.session.take_outbound(now) {
            link.writer
                .send(&msg)
                .await
                .map_err(|e| SyncError::ConnectionLost(format!("{e:#}")))?;
        }
        Ok(())
    }

    fn on_lost(&mut self, reason: &str) {
        if self.link.take().is_some() {
            warn!(%reason, "connection lost; world marked stale");
        }
        self.session.mark_world_stale();
        if self.redial.is_none() {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    /// Starts reconnecting with bounded exponential backoff. Attempts are
    /// driven by [`tick`](Self::tick); this returns at once. Returns `false`
    /// when the attempts are already used up.
    ///
    /// The store keeps ageing out until a new link is up; it is then cleared
    /// and refilled from the server's next full snapshot.
    pub fn begin_reconnect(&mut self) -> bool {
        if self.redial.is_some() {
            return true;
        }
        self.link = None;
        self.session.mark_world_stale();
        self.schedule_redial()
    }

    /// Queues the next attempt, or gives up.
    fn schedule_redial(&mut self) -> bool {
        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempt();
                self.status = ConnectionStatus::Reconnecting { attempt };
                self.redial = Some(Redial::Waiting {
                    until: Instant::now() + delay,
                });
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                true
            }
            None => {
                self.redial = None;
                self.status = ConnectionStatus::Disconnected;
                false
            }
        }
    }

    /// Advances a pending reconnect without blocking.
    async fn poll_redial(&mut self) -> Result<(), SyncError> {
        match self.redial.take() {
            None => Ok(()),
            Some(Redial::Waiting { until }) if Instant::now() < until => {
                self.redial = Some(Redial::Waiting { until });
                Ok(())
            }
            Some(Redial::Waiting { .. }) => {
                let task = tokio::spawn(dial(
                    self.addr,
                    self.cfg.player_name.clone(),
                    self.join_timeout(),
                ));
                self.redial = Some(Redial::Dialing(task));
                Ok(())
            }
            Some(Redial::Dialing(task)) if !task.is_finished() => {
                self.redial = Some(Redial::Dialing(task));
                Ok(())
            }
            Some(Redial::Dialing(task)) => {
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(anyhow::anyhow!("handshake task failed: {e}")),
                };
                match outcome {
                    Ok(joined) => {
                        self.install(joined);
                        Ok(())
                    }
                    Err(e) => {
                        let attempt = self.backoff.attempt();
                        warn!(attempt, error = %format!("{e:#}"), "reconnect attempt failed");
                        if self.schedule_redial() {
                            Ok(())
                        } else {
                            Err(SyncError::ConnectionLost(format!(
                                "giving up after {attempt} reconnect attempts"
                            )))
                        }
                    }
                }
            }
        }
    }

    /// Leaves gracefully. Nothing else queued is sent; remote entities age
    /// out on later ticks.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        if let Some(Redial::Dialing(task)) = self.redial.take() {
            task.abort();
        }
        if let Some(mut link) = self.link.take() {
            if let Some(player_id) = self.session.local_player_id() {
                link.writer
                    .send(&NetMsg::Leave { player_id })
                    .await
                    .context("send leave")?;
            }
            if let Err(e) = link.writer.shutdown().await {
                debug!(error = %format!("{e:#}"), "shutdown after leave");
            }
        }
        self.session.mark_world_stale();
        self.status = ConnectionStatus::Disconnected;
        info!("disconnected");
        Ok(())
    }

    /// Human-readable status, for the console.
    pub fn status_lines(&self) -> Vec<String> {
        let store = self.session.store();
        let mut out = vec![
            format!("Status: {:?}", self.status),
            format!("Server: {}", self.addr),
        ];
        if let Some(me) = store.local_player() {
            out.push(format!(
                "Player: {} ({}) hp={} k/d={}/{}",
                me.id, me.name, me.health, me.kills, me.deaths
            ));
            out.push(format!(
                "Position: {:.2} {:.2} {:.2}",
                me.position.x, me.position.y, me.position.z
            ));
        }
        out.push(format!(
            "Entities: players={} bullets={} bombs={}",
            store.len::<Player>(),
            store.len::<Bullet>(),
            store.len::<Bomb>()
        ));
        out.push(format!(
            "Unacked inputs: {}  last tick: {:?}",
            self.session.prediction().pending_len(),
            self.session.last_tick()
        ));
        out
    }
}

/// Connects, sends `Join`, and waits for the acknowledgement.
async fn dial(addr: SocketAddr, name: String, join_timeout: Duration) -> anyhow::Result<Joined> {
    let conn = ReliableConn::connect(addr).await?;
    let (mut reader, mut writer) = conn.into_split();
    writer
        .send(&NetMsg::Join {
            protocol: PROTOCOL_VERSION,
            name,
        })
        .await?;
    let (player_id, server_time_ms, tick_hz) =
        tokio::time::timeout(join_timeout, await_join_ack(&mut reader))
            .await
            .map_err(|_| anyhow::anyhow!("no join ack within {join_timeout:?}"))??;
    Ok(Joined {
        player_id,
        server_time_ms,
        tick_hz,
        reader,
        writer,
    })
}

async fn await_join_ack(reader: &mut FrameReader) -> anyhow::Result<(PlayerId, u64, u32)> {
    loop {
        match reader.recv().await? {
            Some(Ok(NetMsg::JoinAck {
                player_id,
                server_time_ms,
                tick_hz,
            })) => return Ok((player_id, server_time_ms, tick_hz)),
            Some(Ok(other)) => debug!(kind = other.kind(), "ignored before join ack"),
            Some(Err(e)) => warn!(error = %e, "undecodable frame during handshake"),
            None => anyhow::bail!("server closed the connection during handshake"),
        }
    }
}
