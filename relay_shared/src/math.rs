//! Math types.
//!
//! The relay only ever moves players on a plane, so this stays a single
//! small vector type with stable semantics.

use serde::{Deserialize, Serialize};

/// 2D vector in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// True when both components lie in `[-extent, extent)`.
    pub fn within_extent(self, extent: f32) -> bool {
        (-extent..extent).contains(&self.x) && (-extent..extent).contains(&self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_scale_then_add() {
        let p = Vec2::new(1.0, -2.0);
        let v = Vec2::new(80.0, 0.0).scale(0.5);
        assert_eq!(p.add(v), Vec2::new(41.0, -2.0));
    }

    #[test]
    fn extent_is_half_open() {
        assert!(Vec2::new(-128.0, 127.9).within_extent(128.0));
        assert!(!Vec2::new(128.0, 0.0).within_extent(128.0));
        assert!(!Vec2::new(0.0, -128.1).within_extent(128.0));
    }

    #[test]
    fn infinity_and_nan_are_not_finite() {
        assert!(Vec2::new(5000.0, -9000.0).is_finite());
        assert!(!Vec2::new(f32::INFINITY, 0.0).is_finite());
        assert!(!Vec2::new(0.0, f32::NAN).is_finite());
    }
}
