use std::time::Duration;

use arena_server::server::bind_ephemeral;
use arena_shared::{
    entity::PlayerId,
    net::{NetMsg, ReliableConn},
};

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(64).await?;
    server.run_for_ticks(3).await?;
    assert_eq!(server.world().tick(), 3);
    Ok(())
}

/// A connection that opens with anything but `Join` is refused and the
/// server keeps ticking.
#[tokio::test]
async fn bad_handshake_is_refused() -> anyhow::Result<()> {
    arena_tests::init_tracing();
    let (mut server, cfg) = bind_ephemeral(64).await?;
    let addr = cfg.server_addr.parse()?;

    let mut conn = ReliableConn::connect(addr).await?;
    conn.send(&NetMsg::Leave {
        player_id: PlayerId(1),
    })
    .await?;

    assert!(server.try_accept(Duration::from_secs(1)).await?.is_some());
    assert!(conn.recv().await.is_err());

    server.run_for_ticks(2).await?;
    assert_eq!(server.client_count(), 0);
    assert_eq!(server.world().tick(), 2);
    Ok(())
}
