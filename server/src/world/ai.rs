//! Creature behaviour.
//!
//! One state machine for every creature, parametrized by [`AiConfig`]. The
//! AI never touches the world directly: it reads arena bounds and safe zones
//! from an [`ArenaHost`] and hands attacks back through it. Death is not an
//! AI transition; only the combat resolver sets a creature dead.

use rand::Rng;

use hunt_shared::{CreatureMode, CreatureTemplate};

use super::geometry::{distance, step_towards, Rect};
use crate::entities::CreatureInstance;

/// Wander timing used for every template
const PATROL_INTERVAL_MS: u64 = 4_000;
const PATROL_RADIUS: f32 = 5.0;
/// Creatures give up and walk home beyond this distance from spawn
const LEASH_RANGE: f32 = 30.0;
/// Chasers stop short of the attack range so they do not stand inside the target
const CHASE_STOP_FACTOR: f32 = 0.8;

/// Behaviour parameters for one creature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiConfig {
    pub detection_radius: f32,
    pub attack_range: f32,
    pub separation_radius: f32,
    pub move_speed: f32,
    pub attack_cooldown_ms: u32,
    pub patrol_interval_ms: u64,
    pub patrol_radius: f32,
    pub leash_range: f32,
}

impl AiConfig {
    pub fn from_template(template: &CreatureTemplate) -> Self {
        Self {
            detection_radius: template.detection_radius,
            attack_range: template.attack_range,
            separation_radius: template.separation_radius,
            move_speed: template.move_speed,
            attack_cooldown_ms: template.attack_cooldown_ms,
            patrol_interval_ms: PATROL_INTERVAL_MS,
            patrol_radius: PATROL_RADIUS,
            leash_range: LEASH_RANGE,
        }
    }
}

/// An attack a creature wants to land this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatureAttack {
    pub creature_id: u64,
    pub target_id: u64,
}

/// Something a creature can chase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub id: u64,
    pub position: [f32; 2],
}

/// What the AI needs from the environment it runs in
pub trait ArenaHost {
    fn bounds(&self) -> Rect;
    fn in_safe_zone(&self, position: [f32; 2]) -> bool;
    fn on_attack(&mut self, attack: CreatureAttack);
}

/// Advance one creature by one tick
pub fn step<H: ArenaHost, R: Rng>(
    creature: &mut CreatureInstance,
    config: &AiConfig,
    targets: &[Target],
    now_ms: u64,
    delta_secs: f32,
    host: &mut H,
    rng: &mut R,
) {
    if !creature.alive {
        creature.mode = CreatureMode::Dead;
        return;
    }

    let max_step = config.move_speed * delta_secs;

    // Leash: too far from home, drop everything and walk back
    if distance(creature.position, creature.spawn_position) > config.leash_range {
        creature.target_id = None;
        creature.patrol_target = Some(creature.spawn_position);
        creature.mode = CreatureMode::Patrol;
        creature.position = step_towards(creature.position, creature.spawn_position, max_step);
        return;
    }

    let nearest = targets
        .iter()
        .map(|t| (t, distance(creature.position, t.position)))
        .filter(|(_, d)| *d <= config.detection_radius)
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((target, dist)) => {
            creature.target_id = Some(target.id);
            creature.patrol_target = None;

            if dist <= config.attack_range {
                creature.mode = CreatureMode::Attack;
                if now_ms >= creature.next_attack_at_ms {
                    creature.next_attack_at_ms = now_ms + config.attack_cooldown_ms as u64;
                    host.on_attack(CreatureAttack {
                        creature_id: creature.id,
                        target_id: target.id,
                    });
                }
            } else {
                creature.mode = CreatureMode::Chase;
                let gap = dist - config.attack_range * CHASE_STOP_FACTOR;
                creature.position =
                    step_towards(creature.position, target.position, max_step.min(gap.max(0.0)));
            }
        }
        None => {
            creature.target_id = None;
            match creature.mode {
                CreatureMode::Chase | CreatureMode::Attack => {
                    creature.mode = CreatureMode::Idle;
                    creature.next_patrol_at_ms = now_ms + config.patrol_interval_ms;
                }
                CreatureMode::Idle => {
                    if now_ms >= creature.next_patrol_at_ms {
                        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                        let radius = rng.gen_range(0.0..=config.patrol_radius);
                        let waypoint = [
                            creature.spawn_position[0] + radius * angle.cos(),
                            creature.spawn_position[1] + radius * angle.sin(),
                        ];
                        creature.patrol_target = Some(host.bounds().clamp(waypoint));
                        creature.mode = CreatureMode::Patrol;
                        creature.next_patrol_at_ms = now_ms + config.patrol_interval_ms;
                    }
                }
                CreatureMode::Patrol => match creature.patrol_target {
                    Some(waypoint) => {
                        creature.position = step_towards(creature.position, waypoint, max_step);
                        if distance(creature.position, waypoint) <= f32::EPSILON {
                            creature.patrol_target = None;
                            creature.mode = CreatureMode::Idle;
                        }
                    }
                    None => creature.mode = CreatureMode::Idle,
                },
                CreatureMode::Dead => {}
            }
        }
    }
}

/// Pairwise push-apart offsets. Bodies closer than the larger of their two
/// separation radii are pushed apart along the line between them, each by
/// half the overlap.
pub fn separation_offsets(bodies: &[([f32; 2], f32)]) -> Vec<[f32; 2]> {
    let mut offsets = vec![[0.0f32; 2]; bodies.len()];
    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let (pi, ri) = bodies[i];
            let (pj, rj) = bodies[j];
            let min_dist = ri.max(rj);
            let dist = distance(pi, pj);
            if dist >= min_dist {
                continue;
            }
            let overlap = min_dist - dist;
            // Coincident bodies separate along x, lower index to the left
            let dir = if dist > f32::EPSILON {
                [(pj[0] - pi[0]) / dist, (pj[1] - pi[1]) / dist]
            } else {
                [1.0, 0.0]
            };
            let half = overlap / 2.0;
            offsets[i][0] -= dir[0] * half;
            offsets[i][1] -= dir[1] * half;
            offsets[j][0] += dir[0] * half;
            offsets[j][1] += dir[1] * half;
        }
    }
    offsets
}

/// Clamp into the arena and keep out of safe zones. A creature pushed into a
/// safe zone is put back at its last position outside one.
pub fn enforce_bounds<H: ArenaHost>(creature: &mut CreatureInstance, host: &H) {
    creature.position = host.bounds().clamp(creature.position);
    if host.in_safe_zone(creature.position) {
        creature.position = creature.last_outside_position;
    } else {
        creature.last_outside_position = creature.position;
    }
}

/// New player position after touching a creature, if they overlap. Contact
/// only ever moves the player; it never deals damage.
pub fn knockback(player: [f32; 2], creature: [f32; 2], radius: f32) -> Option<[f32; 2]> {
    let dist = distance(creature, player);
    if dist >= radius {
        return None;
    }
    let dir = if dist > f32::EPSILON {
        [(player[0] - creature[0]) / dist, (player[1] - creature[1]) / dist]
    } else {
        [1.0, 0.0]
    };
    Some([creature[0] + dir[0] * radius, creature[1] + dir[1] * radius])
}
