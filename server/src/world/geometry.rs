//! Flat XZ-plane helpers.

use serde::Deserialize;

/// Axis-aligned rectangle in world units
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Rect {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: [f32; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }

    /// Finite corners with `min <= max` on both axes
    pub fn is_valid(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
            && self.min[0] <= self.max[0]
            && self.min[1] <= self.max[1]
    }

    /// Never panics, even on an inverted rect
    pub fn clamp(&self, p: [f32; 2]) -> [f32; 2] {
        [
            p[0].max(self.min[0]).min(self.max[0]),
            p[1].max(self.min[1]).min(self.max[1]),
        ]
    }

    /// The four points just past each edge, level with `p`
    pub fn exits(&self, p: [f32; 2], margin: f32) -> [[f32; 2]; 4] {
        [
            [self.min[0] - margin, p[1]],
            [self.max[0] + margin, p[1]],
            [p[0], self.min[1] - margin],
            [p[0], self.max[1] + margin],
        ]
    }

    pub fn center(&self) -> [f32; 2] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
        ]
    }
}

pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[1] - a[1];
    (dx * dx + dz * dz).sqrt()
}

/// Step from `from` towards `to` by at most `max_step`
pub fn step_towards(from: [f32; 2], to: [f32; 2], max_step: f32) -> [f32; 2] {
    let dist = distance(from, to);
    if dist <= max_step || dist <= f32::EPSILON {
        return to;
    }
    let ratio = max_step / dist;
    [
        from[0] + (to[0] - from[0]) * ratio,
        from[1] + (to[1] - from[1]) * ratio,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clamp_and_contains() {
        let r = Rect::new([-10.0, -5.0], [10.0, 5.0]);
        assert!(r.contains([0.0, 0.0]));
        assert!(!r.contains([11.0, 0.0]));
        assert_eq!(r.clamp([20.0, -9.0]), [10.0, -5.0]);
        assert_eq!(r.center(), [0.0, 0.0]);
    }

    #[test]
    fn test_inverted_rect_is_invalid_and_clamp_does_not_panic() {
        let r = Rect::new([50.0, 0.0], [0.0, 50.0]);
        assert!(!r.is_valid());
        assert!(!Rect::new([0.0, f32::NAN], [1.0, 1.0]).is_valid());
        assert!(Rect::new([0.0, 0.0], [0.0, 0.0]).is_valid());
        let _ = r.clamp([10.0, 10.0]);
    }

    #[test]
    fn test_exits_sit_outside() {
        let r = Rect::new([-8.0, -8.0], [8.0, 8.0]);
        for exit in r.exits([1.0, 2.0], 0.5) {
            assert!(!r.contains(exit));
        }
        assert_eq!(r.exits([1.0, 2.0], 0.5)[1], [8.5, 2.0]);
    }

    #[test]
    fn test_step_towards_does_not_overshoot() {
        assert_eq!(step_towards([0.0, 0.0], [3.0, 4.0], 10.0), [3.0, 4.0]);
        let p = step_towards([0.0, 0.0], [3.0, 4.0], 2.5);
        assert!((distance([0.0, 0.0], p) - 2.5).abs() < 1e-5);
    }
}
