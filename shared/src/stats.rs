//! Derived combat stats.
//!
//! `resolve` is the single formula both the live combat loop and the offline
//! AFK estimator read their numbers from. It is a pure function of its inputs:
//! integer arithmetic only for everything that feeds damage and cadence, no
//! randomness, no clock.

use serde::{Deserialize, Serialize};

/// Flat damage every hit starts from before stats are added
pub const BASE_HIT_DAMAGE: i32 = 1;

/// Fixed attack cadence for every class (ms per hit)
pub const ATTACK_CADENCE_MS: u32 = 600;

/// Base health before vitality and level
pub const BASE_HP: i32 = 50;
/// Health per point of vitality
pub const HP_PER_VITALITY: i32 = 10;
/// Health per character level
pub const HP_PER_LEVEL: i32 = 8;

/// Base mana before intelligence/wisdom and level
pub const BASE_MANA: i32 = 20;
/// Mana per point of intelligence or wisdom
pub const MANA_PER_CASTER_STAT: i32 = 4;
/// Mana per character level
pub const MANA_PER_LEVEL: i32 = 3;

/// Movement speed in world units per second at +0%
pub const BASE_MOVE_SPEED: f32 = 5.0;

/// The four governing stats a class can draw its damage from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatKind {
    Strength,
    Dexterity,
    Intelligence,
    Wisdom,
}

/// Character class archetype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CharacterClass {
    Ninja = 0,
    Warrior = 1,
    Sura = 2,
    Shaman = 3,
}

impl CharacterClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ninja),
            1 => Some(Self::Warrior),
            2 => Some(Self::Sura),
            3 => Some(Self::Shaman),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ninja => "Ninja",
            Self::Warrior => "Warrior",
            Self::Sura => "Sura",
            Self::Shaman => "Shaman",
        }
    }

    /// The stat that governs this class's per-hit damage
    pub fn main_stat(&self) -> StatKind {
        match self {
            Self::Ninja => StatKind::Dexterity,
            Self::Warrior => StatKind::Strength,
            Self::Sura => StatKind::Intelligence,
            Self::Shaman => StatKind::Wisdom,
        }
    }

    /// Reach of a basic attack in world units
    pub fn attack_range(&self) -> f32 {
        match self {
            Self::Ninja => 2.0,
            Self::Warrior => 2.5,
            Self::Sura => 2.5,
            Self::Shaman => 6.0,
        }
    }
}

/// Allocated character stats (persisted)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub strength: i32,
    pub dexterity: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub vitality: i32,
}

impl BaseStats {
    pub fn get(&self, kind: StatKind) -> i32 {
        match kind {
            StatKind::Strength => self.strength,
            StatKind::Dexterity => self.dexterity,
            StatKind::Intelligence => self.intelligence,
            StatKind::Wisdom => self.wisdom,
        }
    }

    pub fn add(&mut self, other: &BaseStats) {
        self.strength = self.strength.saturating_add(other.strength);
        self.dexterity = self.dexterity.saturating_add(other.dexterity);
        self.intelligence = self.intelligence.saturating_add(other.intelligence);
        self.wisdom = self.wisdom.saturating_add(other.wisdom);
        self.vitality = self.vitality.saturating_add(other.vitality);
    }
}

/// Bonuses granted by one equipped item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquippedItem {
    pub item_id: u32,
    /// Flat damage added to every hit
    #[serde(default)]
    pub weapon_damage: i32,
    /// Width of the per-hit damage roll above the minimum
    #[serde(default)]
    pub damage_spread: u32,
    #[serde(default)]
    pub stats: BaseStats,
    #[serde(default)]
    pub max_hp: i32,
    #[serde(default)]
    pub max_mana: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub move_speed_percent: i32,
}

/// Everything a character has equipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub items: Vec<EquippedItem>,
}

impl Equipment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: EquippedItem) -> Self {
        self.items.push(item);
        self
    }
}

/// What a learned talent does per rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TalentEffect {
    /// Adds to the class's governing stat
    MainStat(i32),
    /// Adds flat damage to every hit
    HitDamage(i32),
    MaxHp(i32),
    MaxMana(i32),
    Defense(i32),
    MoveSpeedPercent(i32),
}

/// A learned talent and its rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talent {
    pub id: u32,
    pub rank: u8,
    pub effect: TalentEffect,
}

/// Combat numbers derived from base stats, level, equipment and talents.
/// Never persisted; recompute whenever an input changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub max_hp: u32,
    pub max_mana: u32,
    pub damage_min: u32,
    pub damage_max: u32,
    pub attack_cooldown_ms: u32,
    pub move_speed: f32,
    pub attack_range: f32,
    pub defense: u32,
}

impl DerivedStats {
    /// Mean of the uniform per-hit damage roll
    pub fn expected_hit(&self) -> f64 {
        (self.damage_min as f64 + self.damage_max as f64) / 2.0
    }

    /// Expected damage per second at the fixed attack cadence
    pub fn dps(&self) -> f64 {
        let cooldown_secs = self.attack_cooldown_ms.max(1) as f64 / 1000.0;
        self.expected_hit() / cooldown_secs
    }
}

/// Per-hit damage: `max(1, BASE + mainStat + floor(level/2) + weaponBonus)`
pub fn damage_per_hit(main_stat: i32, level: u32, weapon_bonus: i32) -> u32 {
    let half_level = (level / 2) as i32;
    BASE_HIT_DAMAGE
        .saturating_add(main_stat)
        .saturating_add(half_level)
        .saturating_add(weapon_bonus)
        .max(1) as u32
}

/// Resolve derived combat stats. Stored bonuses are untrusted, so every sum
/// saturates.
pub fn resolve(
    class: CharacterClass,
    base: &BaseStats,
    level: u32,
    equipment: &Equipment,
    talents: &[Talent],
) -> DerivedStats {
    let mut stats = *base;
    let mut weapon_bonus: i32 = 0;
    let mut spread: u32 = 0;
    let mut hp_bonus: i32 = 0;
    let mut mana_bonus: i32 = 0;
    let mut defense: i32 = 0;
    let mut speed_percent: i32 = 0;

    for item in &equipment.items {
        stats.add(&item.stats);
        weapon_bonus = weapon_bonus.saturating_add(item.weapon_damage);
        spread = spread.saturating_add(item.damage_spread);
        hp_bonus = hp_bonus.saturating_add(item.max_hp);
        mana_bonus = mana_bonus.saturating_add(item.max_mana);
        defense = defense.saturating_add(item.defense);
        speed_percent = speed_percent.saturating_add(item.move_speed_percent);
    }

    let mut main_bonus: i32 = 0;
    for talent in talents {
        let rank = talent.rank as i32;
        let (slot, v) = match talent.effect {
            TalentEffect::MainStat(v) => (&mut main_bonus, v),
            TalentEffect::HitDamage(v) => (&mut weapon_bonus, v),
            TalentEffect::MaxHp(v) => (&mut hp_bonus, v),
            TalentEffect::MaxMana(v) => (&mut mana_bonus, v),
            TalentEffect::Defense(v) => (&mut defense, v),
            TalentEffect::MoveSpeedPercent(v) => (&mut speed_percent, v),
        };
        *slot = slot.saturating_add(v.saturating_mul(rank));
    }

    let main_stat = stats.get(class.main_stat()).saturating_add(main_bonus);
    let damage_min = damage_per_hit(main_stat, level, weapon_bonus);
    let level = i32::try_from(level).unwrap_or(i32::MAX);

    let max_hp = BASE_HP
        .saturating_add(stats.vitality.saturating_mul(HP_PER_VITALITY))
        .saturating_add(level.saturating_mul(HP_PER_LEVEL))
        .saturating_add(hp_bonus)
        .max(1);
    let max_mana = BASE_MANA
        .saturating_add(
            stats
                .intelligence
                .saturating_add(stats.wisdom)
                .saturating_mul(MANA_PER_CASTER_STAT),
        )
        .saturating_add(level.saturating_mul(MANA_PER_LEVEL))
        .saturating_add(mana_bonus)
        .max(0);
    let defense = (stats.vitality / 2).saturating_add(defense).max(0);
    let move_speed = BASE_MOVE_SPEED * 100i32.saturating_add(speed_percent).max(10) as f32 / 100.0;

    DerivedStats {
        max_hp: max_hp as u32,
        max_mana: max_mana as u32,
        damage_min,
        damage_max: damage_min.saturating_add(spread),
        attack_cooldown_ms: ATTACK_CADENCE_MS,
        move_speed,
        attack_range: class.attack_range(),
        defense: defense as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warrior_stats() -> BaseStats {
        BaseStats {
            strength: 5,
            dexterity: 2,
            intelligence: 1,
            wisdom: 1,
            vitality: 4,
        }
    }

    #[test]
    fn test_damage_per_hit_formula() {
        // 1 + 5 + floor(7/2) + 2
        assert_eq!(damage_per_hit(5, 7, 2), 11);
        assert_eq!(damage_per_hit(0, 0, 0), 1);
    }

    #[test]
    fn test_damage_per_hit_never_below_one() {
        assert_eq!(damage_per_hit(-20, 1, -5), 1);
    }

    #[test]
    fn test_resolve_uses_class_main_stat() {
        let base = BaseStats {
            strength: 10,
            dexterity: 3,
            intelligence: 0,
            wisdom: 0,
            vitality: 0,
        };
        let warrior = resolve(CharacterClass::Warrior, &base, 1, &Equipment::new(), &[]);
        let ninja = resolve(CharacterClass::Ninja, &base, 1, &Equipment::new(), &[]);

        assert_eq!(warrior.damage_min, 11);
        assert_eq!(ninja.damage_min, 4);
    }

    #[test]
    fn test_worked_example_dps() {
        let derived = resolve(CharacterClass::Warrior, &warrior_stats(), 1, &Equipment::new(), &[]);

        assert_eq!(derived.damage_min, 6);
        assert_eq!(derived.damage_max, 6);
        assert_eq!(derived.attack_cooldown_ms, 600);
        assert!((derived.dps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_equipment_and_talents_stack() {
        let sword = EquippedItem {
            item_id: 12,
            weapon_damage: 3,
            damage_spread: 4,
            stats: BaseStats {
                strength: 2,
                ..Default::default()
            },
            defense: 5,
            ..Default::default()
        };
        let talents = [
            Talent {
                id: 1,
                rank: 2,
                effect: TalentEffect::MainStat(1),
            },
            Talent {
                id: 2,
                rank: 1,
                effect: TalentEffect::MaxHp(25),
            },
        ];
        let equipment = Equipment::new().with_item(sword);
        let derived = resolve(CharacterClass::Warrior, &warrior_stats(), 4, &equipment, &talents);

        // 1 + (5 + 2 + 2) + 2 + 3
        assert_eq!(derived.damage_min, 15);
        assert_eq!(derived.damage_max, 19);
        // 50 + 4*10 + 4*8 + 25
        assert_eq!(derived.max_hp, 147);
        assert_eq!(derived.defense, 7);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let equipment = Equipment::new().with_item(EquippedItem {
            item_id: 16,
            move_speed_percent: 15,
            ..Default::default()
        });
        let a = resolve(CharacterClass::Shaman, &warrior_stats(), 9, &equipment, &[]);
        let b = resolve(CharacterClass::Shaman, &warrior_stats(), 9, &equipment, &[]);

        assert_eq!(a, b);
        assert_eq!(a.attack_range, 6.0);
        assert!((a.move_speed - 5.75).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_stored_bonuses_saturate() {
        let huge = EquippedItem {
            item_id: 99,
            weapon_damage: i32::MAX,
            damage_spread: u32::MAX,
            stats: BaseStats {
                strength: i32::MAX,
                vitality: i32::MAX,
                ..Default::default()
            },
            defense: i32::MIN,
            move_speed_percent: i32::MAX,
            ..Default::default()
        };
        let equipment = Equipment::new().with_item(huge.clone()).with_item(huge);
        let talents = [Talent {
            id: 1,
            rank: u8::MAX,
            effect: TalentEffect::MaxHp(i32::MAX),
        }];

        let derived = resolve(CharacterClass::Warrior, &warrior_stats(), u32::MAX, &equipment, &talents);

        assert_eq!(derived.damage_min, i32::MAX as u32);
        assert_eq!(derived.damage_max, u32::MAX);
        assert_eq!(derived.max_hp, i32::MAX as u32);
        assert!(derived.move_speed.is_finite());
    }
}
