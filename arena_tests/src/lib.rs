//! Shared harness for the socket-level tests: a server running on its own
//! task and a fixed-rate driver for clients.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use arena_client::{input::InputState, GameClient};
use arena_server::GameServer;
use arena_shared::{config::SyncConfig, effects::EffectSink, error::SyncError};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::warn;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A server stepping in the background until stopped.
pub struct RunningServer {
    pub cfg: SyncConfig,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<GameServer>>,
}

impl RunningServer {
    /// Binds an ephemeral loopback port and starts ticking.
    pub async fn start(tweak: impl FnOnce(&mut SyncConfig)) -> anyhow::Result<Self> {
        let mut cfg = SyncConfig {
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
            ..Default::default()
        };
        tweak(&mut cfg);
        let mut server = GameServer::new(cfg.clone()).await?;
        cfg.server_addr = server.local_addr()?.to_string();

        let (stop, mut stop_rx) = oneshot::channel();
        let tick = cfg.tick_interval();
        let task = tokio::spawn(async move {
            let mut next = tokio::time::Instant::now();
            while stop_rx.try_recv().is_err() {
                next += tick;
                if let Err(e) = server.try_accept(Duration::from_millis(1)).await {
                    warn!(error = %format!("{e:#}"), "accept failed");
                }
                server.step().await?;
                tokio::time::sleep_until(next).await;
            }
            Ok(server)
        });
        Ok(Self { cfg, stop, task })
    }

    /// Client config pointing at this server.
    pub fn client_config(&self, name: &str) -> SyncConfig {
        SyncConfig {
            player_name: name.to_string(),
            ..self.cfg.clone()
        }
    }

    /// Stops the loop and hands the server back for inspection.
    pub async fn stop(self) -> anyhow::Result<GameServer> {
        let _ = self.stop.send(());
        self.task.await?
    }
}

/// Ticks every client at the configured rate, `ticks` times, feeding each
/// the input returned for it.
pub async fn drive(
    clients: &mut [(&mut GameClient, &mut dyn EffectSink)],
    ticks: u32,
    mut input: impl FnMut(usize, u32) -> InputState,
) -> Result<(), SyncError> {
    let Some((first, _)) = clients.first() else {
        return Ok(());
    };
    let mut ticker = tokio::time::interval(first.session.config().tick_interval());
    for t in 0..ticks {
        ticker.tick().await;
        for (i, (client, effects)) in clients.iter_mut().enumerate() {
            client.tick(&input(i, t), &mut **effects).await?;
        }
    }
    Ok(())
}
