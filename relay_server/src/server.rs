//! Server implementation.
//!
//! Binds the listener, spawns the hub task and one gateway task per accepted
//! connection. Also hosts the operator console:
//! - `status`      - list connected players
//! - `kick <id>`   - drop a player through the normal disconnect path
//! - `quit`        - handled by the binary

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use relay_shared::{
    config::RelayConfig,
    event::{EconomySink, LogSink},
    net::{FramedListener, PlayerId},
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    gateway::serve_connection,
    hub::{Hub, HubHandle, HubState},
};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Relay server.
pub struct RelayServer {
    pub cfg: RelayConfig,
    listener: FramedListener,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
}

impl RelayServer {
    /// Binds with the logging economy sink.
    pub async fn bind(cfg: RelayConfig) -> anyhow::Result<Self> {
        Self::bind_with_sink(cfg, Arc::new(LogSink)).await
    }

    pub async fn bind_with_sink(
        cfg: RelayConfig,
        sink: Arc<dyn EconomySink>,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = FramedListener::bind(addr).await?;
        let (hub, hub_task) = Hub::new(HubState::new(&cfg), sink).spawn();
        Ok(Self {
            cfg,
            listener,
            hub,
            hub_task,
        })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Accepts one connection and hands it to its own gateway task.
    pub async fn accept_one(&self) -> anyhow::Result<JoinHandle<()>> {
        let conn = self.listener.accept().await?;
        let peer = conn.peer_addr();
        debug!(%peer, "Accepted transport connection");
        let hub = self.hub.clone();
        Ok(tokio::spawn(async move {
            if let Err(e) = serve_connection(conn, hub).await {
                warn!(%peer, error = %e, "Connection ended with error");
            }
        }))
    }

    /// Accept loop. Per-connection failures never stop it.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "Relay accepting connections");
        loop {
            if let Err(e) = self.accept_one().await {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    /// Executes a console command.
    pub async fn exec_console(&self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let players = self.hub.inspect().await?;
                let mut out = vec![
                    format!("Listening: {}", self.local_addr()?),
                    format!("Players: {}", players.len()),
                ];
                for p in players {
                    out.push(format!(
                        "  {}: pos=({:.1}, {:.1}) since={} damage={}",
                        p.id,
                        p.position.x,
                        p.position.y,
                        p.connected_at.format("%H:%M:%S"),
                        p.pending_damage
                    ));
                }
                Ok(out)
            }
            "kick" => {
                let Some(raw) = tokens.get(1) else {
                    return Ok(vec!["Usage: kick <id>".to_string()]);
                };
                let Ok(id) = raw.parse::<PlayerId>() else {
                    return Ok(vec![format!("Invalid player id '{raw}'")]);
                };
                if self.hub.kick(id).await? {
                    Ok(vec![format!("Kicked {id}")])
                } else {
                    Ok(vec![format!("No player {id}")])
                }
            }
            other => Ok(vec![format!("Unknown command '{other}'")]),
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.hub_task.abort();
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(
    cfg: RelayConfig,
    sink: Arc<dyn EconomySink>,
) -> anyhow::Result<(RelayServer, SocketAddr)> {
    let cfg = RelayConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    let server = RelayServer::bind_with_sink(cfg, sink).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}
