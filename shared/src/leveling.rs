//! Experience curve and level rollover.

use serde::{Deserialize, Serialize};

/// Highest reachable level
pub const MAX_LEVEL: u32 = 99;

const EXP_CURVE_BASE: f64 = 100.0;
const EXP_CURVE_EXPONENT: f64 = 1.5;

/// Experience required to go from `level` to `level + 1`
pub fn exp_to_next_level(level: u32) -> u64 {
    (EXP_CURVE_BASE * (level.max(1) as f64).powf(EXP_CURVE_EXPONENT)) as u64
}

/// Result of applying an experience delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub exp: u64,
    pub levels_gained: u32,
}

/// Add `delta` experience and roll the level over as many thresholds as it
/// crosses. At `MAX_LEVEL` experience keeps accumulating.
pub fn roll_over(level: u32, exp: u64, delta: u64) -> LevelProgress {
    let mut level = level.clamp(1, MAX_LEVEL);
    let mut exp = exp.saturating_add(delta);
    let mut levels_gained = 0;

    while level < MAX_LEVEL {
        let needed = exp_to_next_level(level);
        if exp < needed {
            break;
        }
        exp -= needed;
        level += 1;
        levels_gained += 1;
    }

    LevelProgress {
        level,
        exp,
        levels_gained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_grows() {
        assert_eq!(exp_to_next_level(1), 100);
        assert!(exp_to_next_level(10) > exp_to_next_level(9));
    }

    #[test]
    fn test_roll_over_single_level() {
        let p = roll_over(1, 90, 20);
        assert_eq!(p.level, 2);
        assert_eq!(p.exp, 10);
        assert_eq!(p.levels_gained, 1);
    }

    #[test]
    fn test_roll_over_multiple_levels() {
        // 100 (1->2) + 282 (2->3) = 382
        let p = roll_over(1, 0, 400);
        assert_eq!(p.level, 3);
        assert_eq!(p.exp, 18);
        assert_eq!(p.levels_gained, 2);
    }

    #[test]
    fn test_roll_over_below_threshold() {
        let p = roll_over(5, 3, 4);
        assert_eq!(p, LevelProgress { level: 5, exp: 7, levels_gained: 0 });
    }

    #[test]
    fn test_max_level_keeps_exp() {
        let p = roll_over(MAX_LEVEL, 0, 1_000_000);
        assert_eq!(p.level, MAX_LEVEL);
        assert_eq!(p.exp, 1_000_000);
        assert_eq!(p.levels_gained, 0);
    }
}
