//! Creature archetypes and the lookup table both combat paths read from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Template id used when a zone or spawn references an unknown creature
pub const FALLBACK_TEMPLATE_ID: u32 = 0;

/// Health Potion
pub const ITEM_HEALTH_POTION: u32 = 1;
/// Goblin Ear
pub const ITEM_GOBLIN_EAR: u32 = 3;
/// Wolf Pelt
pub const ITEM_WOLF_PELT: u32 = 6;
/// Bone Fragment
pub const ITEM_BONE_FRAGMENT: u32 = 7;

/// Per-kill drop rule. `rate` is the intended drop probability per kill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootRule {
    pub item_id: u32,
    pub rate: f64,
}

/// Immutable creature reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureTemplate {
    pub id: u32,
    pub name: String,
    pub tier: u8,
    pub base_hp: u32,
    pub exp_base: u64,
    pub gold_min: u64,
    pub gold_max: u64,
    pub damage_min: u32,
    pub damage_max: u32,
    pub attack_cooldown_ms: u32,
    pub move_speed: f32,
    pub detection_radius: f32,
    pub attack_range: f32,
    pub separation_radius: f32,
    #[serde(default)]
    pub loot: Vec<LootRule>,
}

impl CreatureTemplate {
    /// Weak stand-in used whenever a template id cannot be resolved
    pub fn fallback() -> Self {
        Self {
            id: FALLBACK_TEMPLATE_ID,
            name: "Stray Critter".into(),
            tier: 0,
            base_hp: 20,
            exp_base: 1,
            gold_min: 0,
            gold_max: 1,
            damage_min: 1,
            damage_max: 2,
            attack_cooldown_ms: 2000,
            move_speed: 2.0,
            detection_radius: 6.0,
            attack_range: 1.5,
            separation_radius: 1.0,
            loot: Vec::new(),
        }
    }

    /// Average gold per kill, floored
    pub fn avg_gold(&self) -> u64 {
        (self.gold_min + self.gold_max.max(self.gold_min)) / 2
    }
}

/// Lookup table of creature templates, passed explicitly to whatever needs it
#[derive(Debug, Clone)]
pub struct CreatureTable {
    templates: HashMap<u32, CreatureTemplate>,
    fallback: CreatureTemplate,
}

impl CreatureTable {
    pub fn new(templates: Vec<CreatureTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id, t)).collect(),
            fallback: CreatureTemplate::fallback(),
        }
    }

    /// Built-in creatures used when no world file provides any
    pub fn with_defaults() -> Self {
        Self::new(vec![
            CreatureTemplate {
                id: 1,
                name: "Goblin".into(),
                tier: 1,
                base_hp: 50,
                exp_base: 12,
                gold_min: 2,
                gold_max: 6,
                damage_min: 6,
                damage_max: 9,
                attack_cooldown_ms: 2000,
                move_speed: 3.0,
                detection_radius: 10.0,
                attack_range: 2.0,
                separation_radius: 1.2,
                loot: vec![
                    LootRule { item_id: ITEM_GOBLIN_EAR, rate: 0.5 },
                    LootRule { item_id: ITEM_HEALTH_POTION, rate: 0.2 },
                ],
            },
            CreatureTemplate {
                id: 2,
                name: "Wolf".into(),
                tier: 1,
                base_hp: 40,
                exp_base: 10,
                gold_min: 1,
                gold_max: 4,
                damage_min: 8,
                damage_max: 11,
                attack_cooldown_ms: 1600,
                move_speed: 4.5,
                detection_radius: 12.0,
                attack_range: 1.8,
                separation_radius: 1.0,
                loot: vec![LootRule { item_id: ITEM_WOLF_PELT, rate: 0.5 }],
            },
            CreatureTemplate {
                id: 3,
                name: "Skeleton".into(),
                tier: 2,
                base_hp: 70,
                exp_base: 20,
                gold_min: 4,
                gold_max: 10,
                damage_min: 10,
                damage_max: 14,
                attack_cooldown_ms: 2200,
                move_speed: 2.5,
                detection_radius: 9.0,
                attack_range: 2.2,
                separation_radius: 1.3,
                loot: vec![
                    LootRule { item_id: ITEM_BONE_FRAGMENT, rate: 0.5 },
                    LootRule { item_id: ITEM_HEALTH_POTION, rate: 0.2 },
                ],
            },
        ])
    }

    pub fn get(&self, id: u32) -> Option<&CreatureTemplate> {
        self.templates.get(&id)
    }

    /// Resolve a template, substituting the weak fallback for unknown ids.
    /// The flag is true when the fallback was used.
    pub fn get_or_fallback(&self, id: u32) -> (&CreatureTemplate, bool) {
        match self.templates.get(&id) {
            Some(t) => (t, false),
            None => (&self.fallback, true),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for CreatureTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_template_falls_back_to_weak_default() {
        let table = CreatureTable::with_defaults();
        let (template, fell_back) = table.get_or_fallback(999);

        assert!(fell_back);
        assert_eq!(template.id, FALLBACK_TEMPLATE_ID);
        assert!(template.base_hp <= 20);
        assert!(template.damage_max <= 2);
    }

    #[test]
    fn test_known_template_resolves() {
        let table = CreatureTable::with_defaults();
        let (template, fell_back) = table.get_or_fallback(1);

        assert!(!fell_back);
        assert_eq!(template.name, "Goblin");
    }

    #[test]
    fn test_avg_gold_floors() {
        let mut t = CreatureTemplate::fallback();
        t.gold_min = 1;
        t.gold_max = 4;
        assert_eq!(t.avg_gold(), 2);
        t.gold_max = 3;
        assert_eq!(t.avg_gold(), 2);
    }
}
