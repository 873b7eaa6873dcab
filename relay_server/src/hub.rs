//! The hub: single owner of the registry and the broadcast router.
//!
//! All connect, message and disconnect handling is funnelled through one
//! task which processes [`HubCommand`]s strictly in arrival order, so the
//! registry has exactly one writer and each handler runs to completion
//! before the next one starts.
//!
//! The handlers themselves live on [`HubState`] and are pure with respect to
//! the transport: they take the current state plus an event and return the
//! [`Effects`] to deliver. [`Hub`] only adds mailboxes and the economy sink.

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use relay_shared::{
    config::{CombatConfig, RelayConfig},
    event::{DomainEvent, EconomySink},
    net::{ClientMsg, PlayerId},
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{Envelope, Mailbox, Router},
    registry::{Connection, Registry},
};

/// Outcome of one handler invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Effects {
    pub envelopes: Vec<Envelope>,
    pub events: Vec<DomainEvent>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty() && self.events.is_empty()
    }
}

/// Transport-free relay state.
#[derive(Debug)]
pub struct HubState {
    pub(crate) registry: Registry,
    pub(crate) next_id: u64,
    pub(crate) rng: StdRng,
    pub(crate) spawn_extent: f32,
    pub(crate) combat: CombatConfig,
}

impl HubState {
    pub fn new(cfg: &RelayConfig) -> Self {
        Self::with_rng(cfg, StdRng::from_entropy())
    }

    /// Deterministic spawn positions, for tests.
    pub fn with_seed(cfg: &RelayConfig, seed: u64) -> Self {
        Self::with_rng(cfg, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cfg: &RelayConfig, rng: StdRng) -> Self {
        Self {
            registry: Registry::new(),
            next_id: 1,
            rng,
            spawn_extent: cfg.spawn_extent,
            combat: cfg.combat.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatches one decoded message from `id`'s own connection.
    pub fn handle_inbound(&mut self, id: PlayerId, msg: ClientMsg) -> Effects {
        match msg {
            ClientMsg::PlayerMovement { x, y } => self.apply_movement(id, x, y),
            ClientMsg::CombatHit { damage } => self.apply_combat_hit(id, damage),
        }
    }
}

/// Requests processed by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// A transport connection opened; reply carries its new id.
    Connect {
        mailbox: Mailbox,
        reply: oneshot::Sender<PlayerId>,
    },
    /// A decoded message, tagged with the transport-bound id.
    Inbound { id: PlayerId, msg: ClientMsg },
    Disconnect { id: PlayerId },
    /// Operator kick; reply says whether the id was live.
    Kick {
        id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    /// Copy of every registry entry.
    Inspect {
        reply: oneshot::Sender<Vec<Connection>>,
    },
}

/// Cloneable sender side of the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub async fn connect(&self, mailbox: Mailbox) -> anyhow::Result<PlayerId> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { mailbox, reply })?;
        rx.await.map_err(|_| anyhow::anyhow!("hub dropped connect"))
    }

    pub fn inbound(&self, id: PlayerId, msg: ClientMsg) -> anyhow::Result<()> {
        self.send(HubCommand::Inbound { id, msg })
    }

    pub fn disconnect(&self, id: PlayerId) -> anyhow::Result<()> {
        self.send(HubCommand::Disconnect { id })
    }

    pub async fn kick(&self, id: PlayerId) -> anyhow::Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Kick { id, reply })?;
        rx.await.map_err(|_| anyhow::anyhow!("hub dropped kick"))
    }

    pub async fn inspect(&self) -> anyhow::Result<Vec<Connection>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Inspect { reply })?;
        rx.await.map_err(|_| anyhow::anyhow!("hub dropped inspect"))
    }

    fn send(&self, cmd: HubCommand) -> anyhow::Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("hub stopped"))
    }
}

/// Owning side: state, router and economy sink.
pub struct Hub {
    state: HubState,
    router: Router,
    sink: Arc<dyn EconomySink>,
}

impl Hub {
    pub fn new(state: HubState, sink: Arc<dyn EconomySink>) -> Self {
        Self {
            state,
            router: Router::new(),
            sink,
        }
    }

    /// Spawns the hub task and returns its handle.
    pub fn spawn(self) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (HubHandle { tx }, task)
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        info!(remaining = self.state.registry.len(), "Hub stopped");
    }

    pub async fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { mailbox, reply } => {
                let id = self.state.allocate_id();
                self.router.register(id, mailbox);
                let effects = self.state.connect(id);
                self.deliver(effects).await;
                if reply.send(id).is_err() {
                    // Connection task vanished before learning its id.
                    self.drop_connection(id).await;
                }
            }
            HubCommand::Inbound { id, msg } => {
                let effects = self.state.handle_inbound(id, msg);
                self.deliver(effects).await;
            }
            HubCommand::Disconnect { id } => {
                self.drop_connection(id).await;
            }
            HubCommand::Kick { id, reply } => {
                let live = self.state.registry.contains(id);
                if live {
                    info!(player_id = %id, "Kicking player");
                }
                self.drop_connection(id).await;
                let _ = reply.send(live);
            }
            HubCommand::Inspect { reply } => {
                let _ = reply.send(self.state.registry.iter().cloned().collect());
            }
        }
    }

    async fn drop_connection(&mut self, id: PlayerId) {
        self.router.unregister(id);
        let effects = self.state.disconnect(id);
        self.deliver(effects).await;
    }

    async fn deliver(&mut self, effects: Effects) {
        for envelope in &effects.envelopes {
            if let Err(e) = self.router.announce_to(envelope) {
                warn!(error = %e, tag = envelope.msg.tag(), "Failed to encode envelope");
            }
        }
        for event in effects.events {
            if let Err(e) = self.sink.publish(event).await {
                warn!(error = %e, "Economy sink rejected event");
            }
        }
        debug!(players = self.state.registry.len(), "Handled hub command");
    }
}
