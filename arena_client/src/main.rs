//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--name Ana]
//!                                [--config client.json] [--tick-hz 64]
//!
//! The client joins the match, walks a slow circle firing now and then, and
//! logs what it sees. Console commands:
//!   status - Show connection and player status
//!   quit   - Leave and exit

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_client::{
    client::GameClient,
    input::{InputSource, InputState},
};
use arena_shared::{
    config::SyncConfig,
    effects::{Effect, EffectSink},
    entity::{Bullet, Player},
    error::SyncError,
    render::NullRenderer,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

fn parse_args() -> anyhow::Result<SyncConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            SyncConfig::from_json_str(&text).context("parse config")?
        }
        _ => SyncConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("parse --tick-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Logs effects instead of playing them.
struct LogEffects;

impl EffectSink for LogEffects {
    fn play(&mut self, effect: Effect) {
        debug!(effect = effect.name(), ?effect, "effect");
    }
}

/// Circles slowly and fires every couple of seconds.
struct DemoInput {
    tick: u64,
    fire_every: u64,
}

impl InputSource for DemoInput {
    fn sample(&mut self) -> InputState {
        self.tick += 1;
        InputState {
            forward: 1.0,
            yaw_delta: 0.01,
            fire: self.tick % self.fire_every == 0,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, tick_hz = cfg.tick_hz, "starting client");

    let mut client = GameClient::connect(cfg.clone()).await.context("connect")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut input = DemoInput {
        tick: 0,
        fire_every: u64::from(cfg.tick_hz.max(1)) * 2,
    };
    let mut effects = LogEffects;
    let mut renderer = NullRenderer;
    let mut ticker = tokio::time::interval(cfg.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_report = None;

    loop {
        while let Ok(line) = console_rx.try_recv() {
            match line.as_str() {
                "status" => {
                    for line in client.status_lines() {
                        println!("{line}");
                    }
                }
                "quit" | "exit" => {
                    client.close().await?;
                    return Ok(());
                }
                other => println!("Unknown command: {other}"),
            }
        }

        ticker.tick().await;
        let sample = input.sample();
        match client.tick(&sample, &mut effects).await {
            Ok(()) => {}
            Err(SyncError::ConnectionLost(reason)) => {
                if !client.begin_reconnect() {
                    error!(%reason, "could not reconnect");
                    anyhow::bail!("connection lost: {reason}");
                }
                info!(%reason, "connection lost; reconnecting");
            }
            Err(other) => arena_client::client::report(&other),
        }
        client.session.render(client.now(), &mut renderer);

        if let Some(tick) = client.session.last_tick() {
            if last_report != Some(tick / 256) {
                last_report = Some(tick / 256);
                let store = client.session.store();
                info!(
                    tick,
                    players = store.len::<Player>(),
                    bullets = store.len::<Bullet>(),
                    "snapshot"
                );
            }
        }
    }
}
