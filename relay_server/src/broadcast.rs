//! Broadcast router.
//!
//! Holds one outbound mailbox per registered connection and fans envelopes
//! out to a target set. Delivery is fire-and-forget: a closed mailbox drops
//! that single delivery and the rest of the broadcast carries on.

use std::collections::BTreeMap;

use bytes::Bytes;
use relay_shared::net::{PlayerId, ServerMsg};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::gateway::encode_outbound;

/// Outbound queue of one connection. Frames are pre-encoded bodies.
pub type Mailbox = mpsc::UnboundedSender<Bytes>;

/// Who receives an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A single connection (snapshots for newcomers).
    Only(PlayerId),
    All,
    AllExcept(PlayerId),
}

impl Target {
    pub fn includes(&self, id: PlayerId) -> bool {
        match *self {
            Target::Only(only) => only == id,
            Target::All => true,
            Target::AllExcept(excluded) => excluded != id,
        }
    }
}

/// A tagged notification plus its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub target: Target,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn new(target: Target, msg: ServerMsg) -> Self {
        Self { target, msg }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    mailboxes: BTreeMap<PlayerId, Mailbox>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: PlayerId, mailbox: Mailbox) {
        self.mailboxes.insert(id, mailbox);
    }

    /// Drops the mailbox, which ends that connection's writer.
    pub fn unregister(&mut self, id: PlayerId) -> bool {
        self.mailboxes.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: PlayerId) -> bool {
        self.mailboxes.contains_key(&id)
    }

    pub fn recipients(&self, target: Target) -> Vec<PlayerId> {
        self.mailboxes
            .keys()
            .copied()
            .filter(|id| target.includes(*id))
            .collect()
    }

    /// Encodes once and pushes to every recipient. Returns how many
    /// mailboxes accepted the frame.
    pub fn announce_to(&self, envelope: &Envelope) -> anyhow::Result<usize> {
        let frame = encode_outbound(&envelope.msg)?;
        let mut delivered = 0;
        for id in self.recipients(envelope.target) {
            let Some(mailbox) = self.mailboxes.get(&id) else {
                continue;
            };
            if mailbox.send(frame.clone()).is_err() {
                debug!(player_id = %id, tag = envelope.msg.tag(), "Mailbox closed, dropping delivery");
                continue;
            }
            delivered += 1;
        }
        trace!(tag = envelope.msg.tag(), target = ?envelope.target, delivered, "Broadcast");
        Ok(delivered)
    }
}
