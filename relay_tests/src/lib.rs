//! Harness for socket-level relay tests.
//!
//! Starts a real server on an ephemeral port with a channel-backed economy
//! sink, and offers a raw framed peer for poking at the wire directly.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use relay_server::{server::bind_ephemeral, HubHandle, RelayServer};
use relay_shared::{
    config::RelayConfig,
    event::{ChannelSink, DomainEvent},
    net::{FramedConn, PlayerId, ServerMsg},
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Default wait for a frame that must arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A running relay.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub server: Arc<RelayServer>,
    pub events: mpsc::UnboundedReceiver<DomainEvent>,
    accept_task: JoinHandle<anyhow::Result<()>>,
}

impl TestRelay {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(RelayConfig::default()).await
    }

    pub async fn start_with(cfg: RelayConfig) -> anyhow::Result<Self> {
        init_tracing();
        let (sink, events) = ChannelSink::new();
        let (server, addr) = bind_ephemeral(cfg, Arc::new(sink)).await?;
        let server = Arc::new(server);
        let accept_server = server.clone();
        let accept_task = tokio::spawn(async move { accept_server.run().await });
        Ok(Self {
            addr,
            server,
            events,
            accept_task,
        })
    }

    pub fn hub(&self) -> HubHandle {
        self.server.hub()
    }

    /// Ids currently in the registry.
    pub async fn registered_ids(&self) -> anyhow::Result<Vec<PlayerId>> {
        Ok(self.hub().inspect().await?.into_iter().map(|c| c.id).collect())
    }

    /// Polls the registry until it holds exactly `n` entries.
    pub async fn wait_for_players(&self, n: usize) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let ids = self.registered_ids().await?;
            if ids.len() == n {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("expected {n} players, registry has {ids:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// A peer speaking raw frames, for wire-level assertions.
pub struct RawPeer {
    pub conn: FramedConn,
    pub id: PlayerId,
}

impl RawPeer {
    /// Connects and consumes the handshake, returning the snapshot too.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<(Self, ServerMsg)> {
        let mut conn = FramedConn::connect(addr).await?;
        let id = match expect_msg(&mut conn).await? {
            ServerMsg::Welcome(id) => id,
            other => anyhow::bail!("expected welcome, got {other:?}"),
        };
        let snapshot = expect_msg(&mut conn).await?;
        Ok((Self { conn, id }, snapshot))
    }

    pub async fn expect(&mut self) -> anyhow::Result<ServerMsg> {
        expect_msg(&mut self.conn).await
    }

    /// Asserts nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> anyhow::Result<()> {
        match self.conn.recv_timeout::<ServerMsg>(window).await? {
            None => Ok(()),
            Some(msg) => anyhow::bail!("expected silence, got {msg:?}"),
        }
    }
}

async fn expect_msg(conn: &mut FramedConn) -> anyhow::Result<ServerMsg> {
    match conn.recv_timeout::<ServerMsg>(RECV_TIMEOUT).await? {
        Some(msg) => Ok(msg),
        None => anyhow::bail!("no message within {RECV_TIMEOUT:?}"),
    }
}
