//! Combat resolution for the live loop.
//!
//! Both directions go through [`CombatResolver`]: a player hitting a
//! creature and a creature hitting a player. Each actor is gated by its own
//! absolute next-attack time, so no actor can land two hits inside one
//! cooldown window. The resolver is the only place a creature is set dead.

use std::sync::Arc;

use rand::Rng;

use hunt_shared::{CreatureTable, CreatureTemplate, RewardBatch};

use super::ai::CreatureAttack;
use super::geometry::distance;
use crate::entities::{CreatureInstance, PlayerCombatant};
use crate::error::CombatError;

/// Experience for one kill of a creature with `exp_base` in a zone of the
/// given difficulty. Live kills and offline estimates share this.
pub fn kill_exp(exp_base: u64, difficulty: f64) -> u64 {
    (exp_base as f64 * difficulty.max(0.0)).floor() as u64
}

/// Result of a player's swing
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub damage: u32,
    pub target_hp: u32,
    /// Present when the swing killed the creature
    pub reward: Option<RewardBatch>,
}

/// Result of a creature's swing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    pub damage: u32,
    pub target_hp: u32,
    pub killed: bool,
}

pub struct CombatResolver {
    templates: Arc<CreatureTable>,
}

impl CombatResolver {
    pub fn new(templates: Arc<CreatureTable>) -> Self {
        Self { templates }
    }

    pub fn template(&self, template_id: u32) -> &CreatureTemplate {
        self.templates.get_or_fallback(template_id).0
    }

    /// Player swings at a creature
    pub fn player_attack<R: Rng>(
        &self,
        player: &mut PlayerCombatant,
        creature: &mut CreatureInstance,
        difficulty: f64,
        now_ms: u64,
        rng: &mut R,
    ) -> Result<AttackOutcome, CombatError> {
        if !creature.alive {
            return Err(CombatError::TargetDead);
        }
        if now_ms < player.next_attack_at_ms {
            return Err(CombatError::OnCooldown {
                ready_at_ms: player.next_attack_at_ms,
            });
        }
        if distance(player.position, creature.position) > player.stats.attack_range {
            return Err(CombatError::OutOfRange);
        }

        let (low, high) = ordered(player.stats.damage_min, player.stats.damage_max);
        let damage = rng.gen_range(low..=high);
        player.next_attack_at_ms = now_ms + player.stats.attack_cooldown_ms as u64;

        let target_hp = creature.take_damage(damage);
        if creature.target_id.is_none() {
            creature.target_id = Some(player.id);
        }

        let reward = if target_hp == 0 {
            creature.mark_dead();
            creature.killed_by = Some(player.id);
            Some(self.kill_reward(self.template(creature.template_id), difficulty, rng))
        } else {
            None
        };

        Ok(AttackOutcome {
            damage,
            target_hp,
            reward,
        })
    }

    /// Creature swing produced by the AI. The AI already enforced the
    /// creature's own cooldown.
    pub fn creature_attack<R: Rng>(
        &self,
        attack: &CreatureAttack,
        creature: &CreatureInstance,
        player: &mut PlayerCombatant,
        rng: &mut R,
    ) -> Option<HitOutcome> {
        if !creature.alive || player.is_dead() || attack.target_id != player.id {
            return None;
        }

        let template = self.template(creature.template_id);
        let (low, high) = ordered(template.damage_min, template.damage_max);
        let damage = player.take_damage(rng.gen_range(low..=high));

        Some(HitOutcome {
            damage,
            target_hp: player.hp,
            killed: player.is_dead(),
        })
    }

    /// Reward for one live kill: scaled experience, a uniform gold roll,
    /// and an independent roll per loot rule
    pub fn kill_reward<R: Rng>(
        &self,
        template: &CreatureTemplate,
        difficulty: f64,
        rng: &mut R,
    ) -> RewardBatch {
        let (gold_min, gold_max) = ordered(template.gold_min, template.gold_max);
        let mut batch = RewardBatch {
            exp_delta: kill_exp(template.exp_base, difficulty),
            gold_delta: rng.gen_range(gold_min..=gold_max),
            loot: Vec::new(),
        };
        for rule in &template.loot {
            if rng.gen_bool(rule.rate.clamp(0.0, 1.0)) {
                batch.add_loot(rule.item_id, 1);
            }
        }
        batch
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunt_shared::{resolve, BaseStats, CharacterClass, Equipment};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (CombatResolver, PlayerCombatant, CreatureInstance) {
        let table = Arc::new(CreatureTable::with_defaults());
        let base = BaseStats { strength: 5, ..Default::default() };
        let stats = resolve(CharacterClass::Warrior, &base, 1, &Equipment::default(), &[]);
        let player = PlayerCombatant::new(7, 70, "Hero".into(), CharacterClass::Warrior, 1, [0.0, 0.0], stats);
        let goblin = CreatureInstance::new(100, table.get(1).expect("goblin"), 1, [1.0, 0.0], 0);
        (CombatResolver::new(table), player, goblin)
    }

    #[test]
    fn test_kill_exp_scales_with_difficulty() {
        assert_eq!(kill_exp(5, 1.0), 5);
        assert_eq!(kill_exp(12, 1.5), 18);
        assert_eq!(kill_exp(5, 1.25), 6);
    }

    #[test]
    fn test_player_hit_applies_fixed_damage() {
        let (resolver, mut player, mut goblin) = setup();
        let mut rng = StdRng::seed_from_u64(5);

        let outcome = resolver
            .player_attack(&mut player, &mut goblin, 1.0, 1_000, &mut rng)
            .expect("hit");

        assert_eq!(outcome.damage, 6);
        assert_eq!(outcome.target_hp, 44);
        assert_eq!(goblin.target_id, Some(7));
        assert_eq!(player.next_attack_at_ms, 1_600);
        assert!(outcome.reward.is_none());
    }

    #[test]
    fn test_player_cannot_attack_inside_cooldown() {
        let (resolver, mut player, mut goblin) = setup();
        let mut rng = StdRng::seed_from_u64(5);

        resolver.player_attack(&mut player, &mut goblin, 1.0, 1_000, &mut rng).expect("hit");
        let err = resolver
            .player_attack(&mut player, &mut goblin, 1.0, 1_599, &mut rng)
            .unwrap_err();

        assert_eq!(err, CombatError::OnCooldown { ready_at_ms: 1_600 });
        assert_eq!(goblin.hp, 44);
        assert!(resolver.player_attack(&mut player, &mut goblin, 1.0, 1_600, &mut rng).is_ok());
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let (resolver, mut player, mut goblin) = setup();
        let mut rng = StdRng::seed_from_u64(5);
        goblin.position = [10.0, 0.0];

        let err = resolver
            .player_attack(&mut player, &mut goblin, 1.0, 0, &mut rng)
            .unwrap_err();
        assert_eq!(err, CombatError::OutOfRange);
        assert_eq!(player.next_attack_at_ms, 0);
    }

    #[test]
    fn test_killing_blow_marks_dead_and_rewards() {
        let (resolver, mut player, mut goblin) = setup();
        let mut rng = StdRng::seed_from_u64(5);
        goblin.hp = 3;

        let outcome = resolver
            .player_attack(&mut player, &mut goblin, 1.5, 0, &mut rng)
            .expect("hit");

        assert!(!goblin.alive);
        assert_eq!(goblin.killed_by, Some(7));
        let reward = outcome.reward.expect("reward");
        assert_eq!(reward.exp_delta, 18);
        assert!((2..=6).contains(&reward.gold_delta));

        let err = resolver
            .player_attack(&mut player, &mut goblin, 1.5, 10_000, &mut rng)
            .unwrap_err();
        assert_eq!(err, CombatError::TargetDead);
    }

    #[test]
    fn test_creature_hit_respects_defense() {
        let (resolver, mut player, goblin) = setup();
        let mut rng = StdRng::seed_from_u64(9);
        let attack = CreatureAttack { creature_id: goblin.id, target_id: player.id };

        let hit = resolver
            .creature_attack(&attack, &goblin, &mut player, &mut rng)
            .expect("hit");

        assert!((6..=9).contains(&hit.damage));
        assert_eq!(hit.target_hp, player.stats.max_hp - hit.damage);
        assert!(!hit.killed);
    }

    #[test]
    fn test_dead_creature_cannot_hit() {
        let (resolver, mut player, mut goblin) = setup();
        let mut rng = StdRng::seed_from_u64(9);
        goblin.mark_dead();
        let attack = CreatureAttack { creature_id: goblin.id, target_id: player.id };

        assert!(resolver.creature_attack(&attack, &goblin, &mut player, &mut rng).is_none());
    }

    #[test]
    fn test_live_loot_rates_are_roughly_honoured() {
        let (resolver, _, _) = setup();
        let mut rng = StdRng::seed_from_u64(42);
        let template = resolver.template(1).clone();

        let mut ears = 0;
        for _ in 0..2_000 {
            let batch = resolver.kill_reward(&template, 1.0, &mut rng);
            ears += batch.loot.iter().filter(|l| l.item_id == 3).map(|l| l.qty).sum::<u32>();
        }
        assert!((800..=1_200).contains(&ears), "ears = {}", ears);
    }
}
