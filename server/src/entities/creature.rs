//! Server-side creature instance.

use hunt_shared::{CreatureMode, CreatureState, CreatureTemplate};

/// A live creature spawned from a template
#[derive(Debug, Clone)]
pub struct CreatureInstance {
    pub id: u64,
    pub template_id: u32,
    pub zone_id: u32,
    pub position: [f32; 2],
    pub spawn_position: [f32; 2],
    /// Last position that was not inside a safe zone
    pub last_outside_position: [f32; 2],
    pub hp: u32,
    pub max_hp: u32,
    pub alive: bool,
    pub mode: CreatureMode,
    pub target_id: Option<u64>,
    /// Earliest live ms the next attack may land
    pub next_attack_at_ms: u64,
    pub next_patrol_at_ms: u64,
    pub patrol_target: Option<[f32; 2]>,
    /// Index of the spawn point that produced this instance
    pub spawn_ref: usize,
    /// Player credited with the kill
    pub killed_by: Option<u64>,
}

impl CreatureInstance {
    pub fn new(
        id: u64,
        template: &CreatureTemplate,
        zone_id: u32,
        position: [f32; 2],
        spawn_ref: usize,
    ) -> Self {
        Self {
            id,
            template_id: template.id,
            zone_id,
            position,
            spawn_position: position,
            last_outside_position: position,
            hp: template.base_hp,
            max_hp: template.base_hp,
            alive: true,
            mode: CreatureMode::Idle,
            target_id: None,
            next_attack_at_ms: 0,
            next_patrol_at_ms: 0,
            patrol_target: None,
            spawn_ref,
            killed_by: None,
        }
    }

    /// Apply damage, returning the remaining hp
    pub fn take_damage(&mut self, damage: u32) -> u32 {
        self.hp = self.hp.saturating_sub(damage);
        self.hp
    }

    pub fn mark_dead(&mut self) {
        self.hp = 0;
        self.alive = false;
        self.mode = CreatureMode::Dead;
        self.target_id = None;
    }

    pub fn to_state(&self) -> CreatureState {
        CreatureState {
            id: self.id,
            template_id: self.template_id,
            position: self.position,
            health: self.hp,
            max_health: self.max_hp,
            mode: self.mode,
            target_id: self.target_id,
        }
    }
}
