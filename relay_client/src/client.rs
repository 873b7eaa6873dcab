//! Client implementation.
//!
//! The client keeps:
//! - One framed connection to the relay
//! - Its own id and last reported position
//! - A local view of every other player, folded from server notifications

use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

use anyhow::Context;
use relay_shared::{
    math::Vec2,
    net::{ClientMsg, FramedConn, PlayerId, ServerMsg},
};
use tokio::time;
use tracing::{debug, info};

/// How long `connect` waits for the handshake frames.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Disconnected,
}

/// Headless relay client.
pub struct RelayClient {
    pub player_id: PlayerId,
    pub state: ClientState,
    pub position: Vec2,
    /// Every other connected player, by id.
    pub others: BTreeMap<PlayerId, Vec2>,
    conn: FramedConn,
}

impl RelayClient {
    /// Connects and waits for `welcome` followed by `currentPlayers`.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to relay");
        let mut conn = FramedConn::connect(addr).await?;

        let player_id = match Self::handshake_frame(&mut conn).await? {
            ServerMsg::Welcome(id) => id,
            other => anyhow::bail!("expected welcome, got {other:?}"),
        };
        let players = match Self::handshake_frame(&mut conn).await? {
            ServerMsg::CurrentPlayers(players) => players,
            other => anyhow::bail!("expected currentPlayers, got {other:?}"),
        };

        let position = players
            .get(&player_id)
            .map(|p| p.position())
            .context("snapshot is missing our own entry")?;
        let others = players
            .into_values()
            .filter(|p| p.player_id != player_id)
            .map(|p| (p.player_id, p.position()))
            .collect();

        info!(player_id = %player_id, x = position.x, y = position.y, "Joined relay");
        Ok(Self {
            player_id,
            state: ClientState::Connected,
            position,
            others,
            conn,
        })
    }

    async fn handshake_frame(conn: &mut FramedConn) -> anyhow::Result<ServerMsg> {
        time::timeout(HANDSHAKE_TIMEOUT, conn.recv::<ServerMsg>())
            .await
            .context("handshake timed out")??
            .context("server closed during handshake")
    }

    /// Reports a new position for ourselves.
    pub async fn send_movement(&mut self, position: Vec2) -> anyhow::Result<()> {
        self.conn
            .send(&ClientMsg::PlayerMovement {
                x: position.x,
                y: position.y,
            })
            .await?;
        self.position = position;
        Ok(())
    }

    pub async fn send_combat_hit(&mut self, damage: u32) -> anyhow::Result<()> {
        self.conn.send(&ClientMsg::CombatHit { damage }).await
    }

    /// Waits up to `timeout` for one notification and applies it.
    ///
    /// `Ok(None)` on timeout or once the server has closed the stream.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        if self.state == ClientState::Disconnected {
            return Ok(None);
        }
        match time::timeout(timeout, self.conn.recv::<ServerMsg>()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(msg))) => {
                self.apply(&msg);
                Ok(Some(msg))
            }
            Ok(Ok(None)) => {
                info!(player_id = %self.player_id, "Server closed connection");
                self.state = ClientState::Disconnected;
                Ok(None)
            }
            Ok(Err(e)) => {
                self.state = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    /// Drains whatever arrives within `window`, returning how many
    /// notifications were applied.
    pub async fn poll(&mut self, window: Duration) -> anyhow::Result<usize> {
        let deadline = time::Instant::now() + window;
        let mut applied = 0;
        loop {
            let left = deadline.saturating_duration_since(time::Instant::now());
            if left.is_zero() {
                break;
            }
            match self.recv_timeout(left).await? {
                Some(_) => applied += 1,
                None => break,
            }
        }
        Ok(applied)
    }

    /// Folds one notification into the local view. Notifications about
    /// ourselves never touch `others`.
    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::NewPlayer(p) | ServerMsg::PlayerMoved(p) => {
                if p.player_id != self.player_id {
                    self.others.insert(p.player_id, p.position());
                }
            }
            ServerMsg::Disconnect(id) => {
                if self.others.remove(id).is_some() {
                    debug!(player_id = %id, "Remote player left");
                }
            }
            ServerMsg::CurrentPlayers(players) => {
                self.others = players
                    .values()
                    .filter(|p| p.player_id != self.player_id)
                    .map(|p| (p.player_id, p.position()))
                    .collect();
            }
            ServerMsg::Welcome(id) => {
                debug!(player_id = %id, "Unexpected welcome after handshake");
            }
        }
    }

    pub fn server_peer(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Executes a console command. `move`/`stop` are handled by the binary.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let mut out = vec![
                    format!("State: {:?}", self.state),
                    format!("Player ID: {}", self.player_id),
                    format!("Position: ({:.1}, {:.1})", self.position.x, self.position.y),
                    format!("Others: {}", self.others.len()),
                ];
                for (id, pos) in &self.others {
                    out.push(format!("  {}: ({:.1}, {:.1})", id, pos.x, pos.y));
                }
                Ok(out)
            }
            "hit" => {
                let Some(raw) = tokens.get(1) else {
                    return Ok(vec!["Usage: hit <damage>".to_string()]);
                };
                let damage: u32 = raw.parse().with_context(|| format!("parse damage '{raw}'"))?;
                self.send_combat_hit(damage).await?;
                Ok(vec![format!("Reported {damage} damage")])
            }
            "goto" => {
                let (Some(x), Some(y)) = (tokens.get(1), tokens.get(2)) else {
                    return Ok(vec!["Usage: goto <x> <y>".to_string()]);
                };
                let pos = Vec2::new(
                    x.parse().context("parse x")?,
                    y.parse().context("parse y")?,
                );
                self.send_movement(pos).await?;
                Ok(vec![format!("Moved to ({:.1}, {:.1})", pos.x, pos.y)])
            }
            other => Ok(vec![format!("Unknown command '{other}'")]),
        }
    }
}
