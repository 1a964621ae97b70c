//! Game world management.
//!
//! The authoritative live simulation. One call to [`GameWorld::tick`] is a
//! bounded, synchronous pass over every zone: fill empty spawn points, step
//! creature AI, separate and bound creatures, push players out of contact,
//! resolve creature attacks, run auto-attacks, then drop the dead so their
//! spawn points can schedule a refill.

pub mod ai;
pub mod combat;
pub mod geometry;
pub mod spawn;
pub mod zone_manager;

pub use ai::{AiConfig, ArenaHost, CreatureAttack, Target};
pub use combat::{kill_exp, AttackOutcome, CombatResolver, HitOutcome};
pub use geometry::{distance, Rect};
pub use spawn::{SpawnDirector, SpawnPoint, SpawnRequest};
pub use zone_manager::{load_world, SpawnBudget, SpawnPart, ZoneDefinition, ZoneManager, DEFAULT_ZONE_ID};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use hunt_shared::{CreatureTable, RewardBatch, ServerMessage};

use crate::entities::{CreatureInstance, PlayerCombatant};
use crate::error::CombatError;

/// Dead players come back at the zone spawn after this long
pub const PLAYER_RESPAWN_MS: u64 = 5_000;

/// Creature ids start high so they never collide with connection ids
const FIRST_CREATURE_ID: u64 = 10_000;

/// A message for everyone in a zone
#[derive(Debug, Clone)]
pub struct WorldEvent {
    pub zone_id: u32,
    pub message: ServerMessage,
}

/// A live kill's reward, bound for the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct KillReward {
    pub player_id: u64,
    pub character_id: i64,
    pub batch: RewardBatch,
}

/// Everything one tick produced
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Zone broadcasts
    pub events: Vec<WorldEvent>,
    /// Messages for a single player
    pub direct: Vec<(u64, ServerMessage)>,
    pub rewards: Vec<KillReward>,
}

/// [`ArenaHost`] backed by a zone definition
struct ZoneArena<'a> {
    zone: &'a ZoneDefinition,
    attacks: Vec<CreatureAttack>,
}

impl<'a> ZoneArena<'a> {
    fn new(zone: &'a ZoneDefinition) -> Self {
        Self {
            zone,
            attacks: Vec::new(),
        }
    }
}

impl ArenaHost for ZoneArena<'_> {
    fn bounds(&self) -> Rect {
        self.zone.bounds
    }

    fn in_safe_zone(&self, position: [f32; 2]) -> bool {
        self.zone.in_safe_zone(position)
    }

    fn on_attack(&mut self, attack: CreatureAttack) {
        self.attacks.push(attack);
    }
}

/// The game world containing all live entities
pub struct GameWorld {
    zones: Arc<ZoneManager>,
    templates: Arc<CreatureTable>,
    combat: CombatResolver,
    spawns: SpawnDirector,
    players: BTreeMap<u64, PlayerCombatant>,
    creatures: BTreeMap<u64, CreatureInstance>,
    /// Output of attacks requested between ticks
    pending: TickOutput,
    next_creature_id: u64,
    rng: StdRng,
    tick: u64,
}

impl GameWorld {
    pub fn new(zones: Arc<ZoneManager>, templates: Arc<CreatureTable>, seed: Option<u64>) -> Self {
        let mut spawns = SpawnDirector::new();
        for zone_id in zones.zone_ids() {
            if let Some(zone) = zones.get(zone_id) {
                spawns.register_zone(zone);
            }
        }
        info!(
            "World ready: {} zones, {} creature templates, {} spawn points",
            zones.len(),
            templates.len(),
            spawns.len()
        );

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            zones,
            combat: CombatResolver::new(templates.clone()),
            templates,
            spawns,
            players: BTreeMap::new(),
            creatures: BTreeMap::new(),
            pending: TickOutput::default(),
            next_creature_id: FIRST_CREATURE_ID,
            rng,
            tick: 0,
        }
    }

    pub fn zones(&self) -> &Arc<ZoneManager> {
        &self.zones
    }

    pub fn templates(&self) -> &Arc<CreatureTable> {
        &self.templates
    }

    pub fn spawns(&self) -> &SpawnDirector {
        &self.spawns
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Put a player into the world. Unknown zones send them to the default zone.
    pub fn spawn_player(&mut self, mut player: PlayerCombatant) {
        let zone = match self.zones.get(player.zone_id) {
            Some(zone) => zone,
            None => {
                warn!(
                    "Player {} in unknown zone {}, moving to zone {}",
                    player.id, player.zone_id, DEFAULT_ZONE_ID
                );
                player.zone_id = DEFAULT_ZONE_ID;
                player.position = self
                    .zones
                    .get(DEFAULT_ZONE_ID)
                    .map(|z| z.player_spawn)
                    .unwrap_or([0.0, 0.0]);
                self.players.insert(player.id, player);
                return;
            }
        };
        player.position = zone.bounds.clamp(player.position);
        self.players.insert(player.id, player);
    }

    pub fn despawn_player(&mut self, id: u64) -> Option<PlayerCombatant> {
        self.players.remove(&id)
    }

    pub fn player(&self, id: u64) -> Option<&PlayerCombatant> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerCombatant> {
        self.players.values()
    }

    pub fn creature(&self, id: u64) -> Option<&CreatureInstance> {
        self.creatures.get(&id)
    }

    pub fn creatures_in_zone(&self, zone_id: u32) -> Vec<&CreatureInstance> {
        self.creatures.values().filter(|c| c.zone_id == zone_id).collect()
    }

    /// Client-reported movement, clamped to the player's zone
    pub fn update_player_position(&mut self, player_id: u64, position: [f32; 2]) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if player.is_dead() {
            return false;
        }
        player.position = match self.zones.get(player.zone_id) {
            Some(zone) => zone.bounds.clamp(position),
            None => position,
        };
        true
    }

    pub fn set_auto_attack(&mut self, player_id: u64, enabled: bool) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.auto_attack = enabled;
                true
            }
            None => false,
        }
    }

    /// Move a player to another zone's spawn. Auto-attack is switched off.
    pub fn change_zone(&mut self, player_id: u64, zone_id: u32) -> Option<[f32; 2]> {
        let zone = self.zones.get(zone_id)?;
        let player = self.players.get_mut(&player_id)?;
        player.zone_id = zone_id;
        player.position = zone.player_spawn;
        player.auto_attack = false;
        info!("Player {} moved to zone {} ({})", player_id, zone_id, zone.name);
        Some(zone.player_spawn)
    }

    /// Manual attack. Its events are delivered with the next tick's output.
    pub fn player_attack(
        &mut self,
        player_id: u64,
        target_id: u64,
        now_ms: u64,
    ) -> Result<(), CombatError> {
        let mut pending = std::mem::take(&mut self.pending);
        let result = self.resolve_player_attack(player_id, target_id, now_ms, &mut pending);
        self.pending = pending;
        result
    }

    /// Snapshot of one zone for broadcast
    pub fn world_state(&self, zone_id: u32) -> ServerMessage {
        ServerMessage::WorldState {
            tick: self.tick,
            players: self
                .players
                .values()
                .filter(|p| p.zone_id == zone_id)
                .map(|p| p.to_state())
                .collect(),
            creatures: self
                .creatures
                .values()
                .filter(|c| c.zone_id == zone_id && c.alive)
                .map(|c| c.to_state())
                .collect(),
        }
    }

    /// Advance the simulation. `now_ms` is monotonic time since start.
    pub fn tick(&mut self, now_ms: u64, delta_secs: f32) -> TickOutput {
        self.tick += 1;
        let mut out = std::mem::take(&mut self.pending);

        self.fill_spawns(now_ms, &mut out);
        self.revive_players(now_ms, &mut out);
        let attacks = self.step_creatures(now_ms, delta_secs);
        self.separate_creatures();
        self.enforce_bounds();
        self.apply_knockback();
        self.resolve_creature_attacks(&attacks, now_ms, &mut out);
        self.run_auto_attacks(now_ms, &mut out);
        self.remove_dead(now_ms);

        out
    }

    fn fill_spawns(&mut self, now_ms: u64, out: &mut TickOutput) {
        for request in self.spawns.due_spawns(now_ms) {
            let (template, fell_back) = self.templates.get_or_fallback(request.template_id);
            if fell_back {
                warn!(
                    "Spawn point {} in zone {} references unknown template {}, using fallback",
                    request.spawn_ref, request.zone_id, request.template_id
                );
            }

            let id = self.next_creature_id;
            self.next_creature_id += 1;
            let creature =
                CreatureInstance::new(id, template, request.zone_id, request.position, request.spawn_ref);

            out.events.push(WorldEvent {
                zone_id: request.zone_id,
                message: ServerMessage::CreatureSpawn {
                    creature_id: id,
                    template_id: creature.template_id,
                    position: creature.position,
                    health: creature.hp,
                },
            });
            self.spawns.bind(request.spawn_ref, id);
            self.creatures.insert(id, creature);
        }
    }

    fn revive_players(&mut self, now_ms: u64, out: &mut TickOutput) {
        for player in self.players.values_mut() {
            let due = matches!(player.respawn_at_ms, Some(at) if now_ms >= at);
            if !due {
                continue;
            }
            if let Some(zone) = self.zones.get(player.zone_id) {
                player.position = zone.player_spawn;
            }
            player.restore();
            debug!("Player {} respawned in zone {}", player.id, player.zone_id);
            out.direct.push((
                player.id,
                ServerMessage::ZoneChanged {
                    zone_id: player.zone_id,
                    position: player.position,
                },
            ));
        }
    }

    fn step_creatures(&mut self, now_ms: u64, delta_secs: f32) -> Vec<CreatureAttack> {
        // Living players outside safe zones, per zone
        let mut targets: HashMap<u32, Vec<Target>> = HashMap::new();
        for player in self.players.values().filter(|p| !p.is_dead()) {
            let safe = self
                .zones
                .get(player.zone_id)
                .map(|z| z.in_safe_zone(player.position))
                .unwrap_or(false);
            if !safe {
                targets.entry(player.zone_id).or_default().push(Target {
                    id: player.id,
                    position: player.position,
                });
            }
        }

        let mut attacks = Vec::new();
        for creature in self.creatures.values_mut() {
            let Some(zone) = self.zones.get(creature.zone_id) else {
                continue;
            };
            let config = AiConfig::from_template(self.templates.get_or_fallback(creature.template_id).0);
            let zone_targets = targets.get(&creature.zone_id).map(Vec::as_slice).unwrap_or(&[]);

            let mut arena = ZoneArena::new(zone);
            let before = creature.mode;
            ai::step(creature, &config, zone_targets, now_ms, delta_secs, &mut arena, &mut self.rng);
            if creature.mode != before {
                debug!(
                    "Creature {} {:?} -> {:?} (target {:?})",
                    creature.id, before, creature.mode, creature.target_id
                );
            }
            attacks.extend(arena.attacks);
        }
        attacks
    }

    fn separate_creatures(&mut self) {
        let mut by_zone: BTreeMap<u32, Vec<(u64, [f32; 2], f32)>> = BTreeMap::new();
        for creature in self.creatures.values().filter(|c| c.alive) {
            let radius = self.templates.get_or_fallback(creature.template_id).0.separation_radius;
            by_zone
                .entry(creature.zone_id)
                .or_default()
                .push((creature.id, creature.position, radius));
        }

        for bodies in by_zone.values() {
            let shapes: Vec<([f32; 2], f32)> = bodies.iter().map(|(_, p, r)| (*p, *r)).collect();
            let offsets = ai::separation_offsets(&shapes);
            for ((id, _, _), offset) in bodies.iter().zip(offsets) {
                if let Some(creature) = self.creatures.get_mut(id) {
                    creature.position[0] += offset[0];
                    creature.position[1] += offset[1];
                }
            }
        }
    }

    fn enforce_bounds(&mut self) {
        for creature in self.creatures.values_mut().filter(|c| c.alive) {
            if let Some(zone) = self.zones.get(creature.zone_id) {
                ai::enforce_bounds(creature, &ZoneArena::new(zone));
            }
        }
    }

    fn apply_knockback(&mut self) {
        for player in self.players.values_mut().filter(|p| !p.is_dead()) {
            let Some(zone) = self.zones.get(player.zone_id) else {
                continue;
            };
            for creature in self
                .creatures
                .values()
                .filter(|c| c.alive && c.zone_id == player.zone_id)
            {
                let radius = self.templates.get_or_fallback(creature.template_id).0.separation_radius;
                if let Some(pushed) = ai::knockback(player.position, creature.position, radius) {
                    player.position = zone.bounds.clamp(pushed);
                }
            }
        }
    }

    fn resolve_creature_attacks(&mut self, attacks: &[CreatureAttack], now_ms: u64, out: &mut TickOutput) {
        for attack in attacks {
            let Some(creature) = self.creatures.get(&attack.creature_id) else {
                continue;
            };
            let Some(player) = self.players.get_mut(&attack.target_id) else {
                continue;
            };
            let Some(hit) = self.combat.creature_attack(attack, creature, player, &mut self.rng) else {
                continue;
            };

            out.events.push(WorldEvent {
                zone_id: creature.zone_id,
                message: ServerMessage::DamageEvent {
                    attacker_id: creature.id,
                    target_id: player.id,
                    damage: hit.damage,
                    target_new_health: hit.target_hp,
                },
            });

            if hit.killed {
                info!("Player {} was killed by creature {}", player.id, creature.id);
                player.respawn_at_ms = Some(now_ms + PLAYER_RESPAWN_MS);
                player.auto_attack = false;
                out.events.push(WorldEvent {
                    zone_id: creature.zone_id,
                    message: ServerMessage::PlayerDeath {
                        player_id: player.id,
                        killer_id: creature.id,
                    },
                });
            }
        }
    }

    fn run_auto_attacks(&mut self, now_ms: u64, out: &mut TickOutput) {
        let ready: Vec<u64> = self
            .players
            .values()
            .filter(|p| p.auto_attack && !p.is_dead() && now_ms >= p.next_attack_at_ms)
            .map(|p| p.id)
            .collect();

        for player_id in ready {
            let Some(target_id) = self.nearest_in_range(player_id) else {
                continue;
            };
            if let Err(e) = self.resolve_player_attack(player_id, target_id, now_ms, out) {
                debug!("Auto-attack by {} on {} skipped: {}", player_id, target_id, e);
            }
        }
    }

    /// Closest living creature the player can hit right now
    fn nearest_in_range(&self, player_id: u64) -> Option<u64> {
        let player = self.players.get(&player_id)?;
        self.creatures
            .values()
            .filter(|c| c.alive && c.zone_id == player.zone_id)
            .map(|c| (c.id, distance(player.position, c.position)))
            .filter(|(_, d)| *d <= player.stats.attack_range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn resolve_player_attack(
        &mut self,
        player_id: u64,
        target_id: u64,
        now_ms: u64,
        out: &mut TickOutput,
    ) -> Result<(), CombatError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(CombatError::UnknownPlayer(player_id))?;
        if player.is_dead() {
            return Err(CombatError::AttackerDead);
        }
        let zone_id = player.zone_id;
        let creature = self
            .creatures
            .get_mut(&target_id)
            .filter(|c| c.zone_id == zone_id)
            .ok_or(CombatError::UnknownTarget(target_id))?;
        let difficulty = self.zones.get(zone_id).map(|z| z.difficulty).unwrap_or(1.0);

        let outcome = self
            .combat
            .player_attack(player, creature, difficulty, now_ms, &mut self.rng)?;

        out.events.push(WorldEvent {
            zone_id,
            message: ServerMessage::DamageEvent {
                attacker_id: player_id,
                target_id,
                damage: outcome.damage,
                target_new_health: outcome.target_hp,
            },
        });

        if let Some(batch) = outcome.reward {
            info!(
                "Player {} killed creature {} (+{} exp, +{} gold)",
                player_id, target_id, batch.exp_delta, batch.gold_delta
            );
            out.events.push(WorldEvent {
                zone_id,
                message: ServerMessage::CreatureDeath {
                    creature_id: target_id,
                    killer_id: Some(player_id),
                },
            });
            out.direct.push((
                player_id,
                ServerMessage::RewardGranted {
                    exp: batch.exp_delta,
                    gold: batch.gold_delta,
                    loot: batch.loot.clone(),
                },
            ));
            out.rewards.push(KillReward {
                player_id,
                character_id: player.character_id,
                batch,
            });
        }
        Ok(())
    }

    /// Dead creatures leave the active set first, then free their spawn point
    fn remove_dead(&mut self, now_ms: u64) {
        let dead: Vec<u64> = self
            .creatures
            .values()
            .filter(|c| !c.alive)
            .map(|c| c.id)
            .collect();

        for id in dead {
            if self.creatures.remove(&id).is_some() {
                self.spawns.on_instance_removed(id, now_ms);
            }
        }
    }
}
