//! State mutation: position reports and combat hits.
//!
//! The id always comes from the connection that sent the message, never from
//! its payload, so a client can only ever touch its own entry. Positions are
//! taken as reported; there is no bounds or velocity check here, only a
//! refusal of non-finite values that could not be re-encoded.

use chrono::Utc;
use relay_shared::{
    event::DomainEvent,
    math::Vec2,
    net::{PlayerId, PlayerInfo, ServerMsg},
};
use tracing::{debug, trace};

use crate::{
    broadcast::{Envelope, Target},
    hub::{Effects, HubState},
};

impl HubState {
    /// Moves `id` and relays the new position to everyone else.
    pub fn apply_movement(&mut self, id: PlayerId, x: f32, y: f32) -> Effects {
        let position = Vec2::new(x, y);
        if !position.is_finite() {
            debug!(player_id = %id, "Non-finite movement ignored");
            return Effects::none();
        }
        if !self.registry.update(id, position) {
            debug!(player_id = %id, "Movement from unknown player ignored");
            return Effects::none();
        }
        trace!(player_id = %id, x, y, "Player moved");

        Effects {
            envelopes: vec![Envelope::new(
                Target::AllExcept(id),
                ServerMsg::PlayerMoved(PlayerInfo::new(id, position)),
            )],
            events: Vec::new(),
        }
    }

    /// Accumulates damage dealt by `id` and emits one gold event per hit
    /// that crosses the threshold, carrying the remainder forward.
    pub fn apply_combat_hit(&mut self, id: PlayerId, damage: u32) -> Effects {
        let threshold = u64::from(self.combat.gold_threshold);
        let reward = self.combat.gold_reward;
        let Some(conn) = self.registry.get_mut(id) else {
            debug!(player_id = %id, "Combat hit from unknown player ignored");
            return Effects::none();
        };
        if threshold == 0 || damage == 0 {
            return Effects::none();
        }

        conn.pending_damage += u64::from(damage);
        let crossings = conn.pending_damage / threshold;
        conn.pending_damage %= threshold;
        if crossings == 0 {
            return Effects::none();
        }

        let amount = u32::try_from(crossings)
            .unwrap_or(u32::MAX)
            .saturating_mul(reward);
        debug!(player_id = %id, crossings, amount, "Combat threshold crossed");

        Effects {
            envelopes: Vec::new(),
            events: vec![DomainEvent::GoldEarned {
                player_id: id,
                amount,
                at: Utc::now(),
            }],
        }
    }
}
