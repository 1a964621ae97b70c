//! Server-side player combatant.

use hunt_shared::{CharacterClass, DerivedStats, PlayerState};

/// A connected character taking part in live combat
#[derive(Debug, Clone)]
pub struct PlayerCombatant {
    /// Runtime id, shared with the connection
    pub id: u64,
    pub character_id: i64,
    pub name: String,
    pub class: CharacterClass,
    pub zone_id: u32,
    pub position: [f32; 2],
    pub hp: u32,
    pub stats: DerivedStats,
    /// Earliest live ms the next attack may land
    pub next_attack_at_ms: u64,
    pub auto_attack: bool,
    /// Set on death; the player is revived at the zone spawn at this time
    pub respawn_at_ms: Option<u64>,
}

impl PlayerCombatant {
    pub fn new(
        id: u64,
        character_id: i64,
        name: String,
        class: CharacterClass,
        zone_id: u32,
        position: [f32; 2],
        stats: DerivedStats,
    ) -> Self {
        Self {
            id,
            character_id,
            name,
            class,
            zone_id,
            position,
            hp: stats.max_hp,
            stats,
            next_attack_at_ms: 0,
            auto_attack: false,
            respawn_at_ms: None,
        }
    }

    /// Take damage reduced by half of defense
    pub fn take_damage(&mut self, damage: u32) -> u32 {
        let actual_damage = damage.saturating_sub(self.stats.defense / 2);
        self.hp = self.hp.saturating_sub(actual_damage);
        actual_damage
    }

    /// Check if dead
    pub fn is_dead(&self) -> bool {
        self.hp == 0
    }

    /// Back to full health, used on respawn and zone change
    pub fn restore(&mut self) {
        self.hp = self.stats.max_hp;
        self.respawn_at_ms = None;
    }

    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            position: self.position,
            health: self.hp,
            max_health: self.stats.max_hp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunt_shared::{resolve, BaseStats, Equipment};

    fn warrior() -> PlayerCombatant {
        let base = BaseStats { strength: 5, vitality: 4, ..Default::default() };
        let stats = resolve(CharacterClass::Warrior, &base, 1, &Equipment::default(), &[]);
        PlayerCombatant::new(1, 10, "Tester".into(), CharacterClass::Warrior, 1, [0.0, 0.0], stats)
    }

    #[test]
    fn test_defense_reduces_damage() {
        let mut player = warrior();
        assert_eq!(player.stats.defense, 2);
        let before = player.hp;

        assert_eq!(player.take_damage(5), 4);
        assert_eq!(player.hp, before - 4);
    }

    #[test]
    fn test_death_and_restore() {
        let mut player = warrior();
        player.take_damage(10_000);
        assert!(player.is_dead());

        player.restore();
        assert_eq!(player.hp, player.stats.max_hp);
    }
}
