//! Connection registry.
//!
//! Maps every live connection id to its ephemeral state. Keys are exactly
//! the set of open connections; `update`/`remove` on an unknown id are
//! no-ops so a message that lost the race with its own disconnect can never
//! resurrect an entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use relay_shared::{
    math::Vec2,
    net::{PlayerId, PlayerInfo},
};

/// One live connection's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: PlayerId,
    pub position: Vec2,
    pub connected_at: DateTime<Utc>,
    /// Damage dealt since the last gold reward.
    pub pending_damage: u64,
}

impl Connection {
    pub fn new(id: PlayerId, position: Vec2) -> Self {
        Self {
            id,
            position,
            connected_at: Utc::now(),
            pending_damage: 0,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo::new(self.id, self.position)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<PlayerId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh entry. Returns `false` and leaves the existing entry
    /// alone if `id` is already present.
    pub fn insert(&mut self, id: PlayerId, position: Vec2) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, Connection::new(id, position));
        true
    }

    /// Moves an existing entry. Returns `false` for unknown ids.
    pub fn update(&mut self, id: PlayerId, position: Vec2) -> bool {
        match self.entries.get_mut(&id) {
            Some(conn) => {
                conn.position = position;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Connection> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Connection> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PlayerId) -> Option<&mut Connection> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Full current mapping, in wire form.
    pub fn snapshot(&self) -> BTreeMap<PlayerId, PlayerInfo> {
        self.entries
            .iter()
            .map(|(id, conn)| (*id, conn.info()))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
