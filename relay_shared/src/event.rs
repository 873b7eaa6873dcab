//! Domain events leaving the relay core.
//!
//! The hub never touches balances or storage. When a combat threshold is
//! crossed it emits a [`DomainEvent`]; an [`EconomySink`] decides how the
//! external economy hears about it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::net::PlayerId;

/// Events the core emits for collaborators outside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A player's accumulated damage crossed the gold threshold.
    #[serde(rename_all = "camelCase")]
    GoldEarned {
        player_id: PlayerId,
        amount: u32,
        at: DateTime<Utc>,
    },
}

/// Receiver of domain events.
#[async_trait]
pub trait EconomySink: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> anyhow::Result<()>;
}

/// Logs every event and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl EconomySink for LogSink {
    async fn publish(&self, event: DomainEvent) -> anyhow::Result<()> {
        match event {
            DomainEvent::GoldEarned {
                player_id, amount, ..
            } => info!(player_id = %player_id, amount, "Gold earned"),
        }
        Ok(())
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EconomySink for ChannelSink {
    async fn publish(&self, event: DomainEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("economy channel closed"))
    }
}
