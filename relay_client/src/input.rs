//! Input handling.
//!
//! Turns held movement keys into a velocity and integrates it per tick.
//! Horizontal and vertical axes are independent; within an axis left beats
//! right and up beats down. Screen convention: up is negative y.

use relay_shared::math::Vec2;

/// Movement keys held at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl KeyState {
    /// Parses a set of WASD letters, e.g. `"wd"`. Other characters are
    /// ignored.
    pub fn from_wasd(keys: &str) -> Self {
        let mut state = Self::default();
        for c in keys.chars() {
            match c.to_ascii_lowercase() {
                'w' => state.up = true,
                'a' => state.left = true,
                's' => state.down = true,
                'd' => state.right = true,
                _ => {}
            }
        }
        state
    }

    pub fn is_idle(self) -> bool {
        self.velocity(1.0) == Vec2::ZERO
    }

    pub fn velocity(self, speed: f32) -> Vec2 {
        let x = if self.left {
            -speed
        } else if self.right {
            speed
        } else {
            0.0
        };
        let y = if self.up {
            -speed
        } else if self.down {
            speed
        } else {
            0.0
        };
        Vec2::new(x, y)
    }
}

/// Advances `position` by the velocity for `keys` over `dt_sec`.
pub fn integrate(position: Vec2, keys: KeyState, speed: f32, dt_sec: f32) -> Vec2 {
    position.add(keys.velocity(speed).scale(dt_sec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_wins_over_right_and_up_over_down() {
        let keys = KeyState::from_wasd("adws");
        assert_eq!(keys.velocity(80.0), Vec2::new(-80.0, -80.0));
    }

    #[test]
    fn idle_keys_do_not_move() {
        let keys = KeyState::from_wasd("xyz");
        assert!(keys.is_idle());
        assert_eq!(integrate(Vec2::new(3.0, 4.0), keys, 80.0, 1.0), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn integrate_scales_by_dt() {
        let keys = KeyState::from_wasd("D");
        assert_eq!(integrate(Vec2::ZERO, keys, 80.0, 0.25), Vec2::new(20.0, 0.0));
    }
}
