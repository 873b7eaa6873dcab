//! Session lifecycle: connect and disconnect transitions.

use rand::Rng;
use relay_shared::{
    math::Vec2,
    net::{PlayerId, PlayerInfo, ServerMsg},
};
use tracing::{debug, info};

use crate::{
    broadcast::{Envelope, Target},
    hub::{Effects, HubState},
};

impl HubState {
    /// Hands out the next id. Ids are never reused within a process.
    pub fn allocate_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Picks a spawn position in `[-spawn_extent, spawn_extent)` per axis,
    /// or the origin when the extent is not a positive finite number.
    pub fn spawn_position(&mut self) -> Vec2 {
        let extent = self.spawn_extent;
        if !extent.is_finite() || extent <= 0.0 {
            return Vec2::ZERO;
        }
        Vec2::new(
            self.rng.gen_range(-extent..extent),
            self.rng.gen_range(-extent..extent),
        )
    }

    /// Registers `id` at a random spawn point.
    pub fn connect(&mut self, id: PlayerId) -> Effects {
        let position = self.spawn_position();
        self.connect_at(id, position)
    }

    /// Registers `id` at `position`: the newcomer gets its id and the full
    /// snapshot (itself included), everyone else gets `newPlayer`.
    pub fn connect_at(&mut self, id: PlayerId, position: Vec2) -> Effects {
        if !self.registry.insert(id, position) {
            debug!(player_id = %id, "Duplicate connect ignored");
            return Effects::none();
        }
        info!(player_id = %id, x = position.x, y = position.y, players = self.registry.len(), "Player connected");

        Effects {
            envelopes: vec![
                Envelope::new(Target::Only(id), ServerMsg::Welcome(id)),
                Envelope::new(
                    Target::Only(id),
                    ServerMsg::CurrentPlayers(self.registry.snapshot()),
                ),
                Envelope::new(
                    Target::AllExcept(id),
                    ServerMsg::NewPlayer(PlayerInfo::new(id, position)),
                ),
            ],
            events: Vec::new(),
        }
    }

    /// Removes `id` and announces it once. Repeated calls are no-ops.
    pub fn disconnect(&mut self, id: PlayerId) -> Effects {
        if self.registry.remove(id).is_none() {
            debug!(player_id = %id, "Disconnect for unknown player ignored");
            return Effects::none();
        }
        info!(player_id = %id, players = self.registry.len(), "Player disconnected");

        Effects {
            envelopes: vec![Envelope::new(
                Target::AllExcept(id),
                ServerMsg::Disconnect(id),
            )],
            events: Vec::new(),
        }
    }
}
