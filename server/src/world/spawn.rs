//! Spawn director: owns every spawn point, which instance occupies it, and
//! when an empty point may refill.

use std::collections::HashMap;

use log::{debug, info, warn};

use super::zone_manager::ZoneDefinition;

/// A fixed creature slot in a zone
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub zone_id: u32,
    pub position: [f32; 2],
    pub template_id: u32,
    pub respawn_delay_ms: u32,
    /// Instance currently occupying this point
    pub active_instance: Option<u64>,
    /// Earliest time (live ms) the point may spawn again
    pub ready_at_ms: u64,
}

/// Request to create an instance at a spawn point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub spawn_ref: usize,
    pub zone_id: u32,
    pub position: [f32; 2],
    pub template_id: u32,
}

/// Tracks spawn points and pending respawns across all zones
#[derive(Default)]
pub struct SpawnDirector {
    points: Vec<SpawnPoint>,
    /// Maps instance id to spawn point index
    instance_to_point: HashMap<u64, usize>,
}

impl SpawnDirector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create spawn points for every slot in a zone. They are ready at once.
    pub fn register_zone(&mut self, zone: &ZoneDefinition) {
        let slots = zone.spawn_slots();
        info!("Registered {} spawn points for zone {} ({})", slots.len(), zone.id, zone.name);
        for slot in slots {
            self.points.push(SpawnPoint {
                zone_id: zone.id,
                position: slot.position,
                template_id: slot.template_id,
                respawn_delay_ms: slot.respawn_delay_ms,
                active_instance: None,
                ready_at_ms: 0,
            });
        }
    }

    /// Points that are empty and whose respawn delay has elapsed
    pub fn due_spawns(&self, now_ms: u64) -> Vec<SpawnRequest> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active_instance.is_none() && now_ms >= p.ready_at_ms)
            .map(|(i, p)| SpawnRequest {
                spawn_ref: i,
                zone_id: p.zone_id,
                position: p.position,
                template_id: p.template_id,
            })
            .collect()
    }

    /// Record that `instance_id` now occupies the point
    pub fn bind(&mut self, spawn_ref: usize, instance_id: u64) {
        match self.points.get_mut(spawn_ref) {
            Some(point) => {
                point.active_instance = Some(instance_id);
                self.instance_to_point.insert(instance_id, spawn_ref);
            }
            None => warn!("Tried to bind instance {} to unknown spawn point {}", instance_id, spawn_ref),
        }
    }

    /// Called once the instance has left the active set. Frees the point and
    /// schedules its refill `respawn_delay_ms` from now.
    pub fn on_instance_removed(&mut self, instance_id: u64, now_ms: u64) {
        let Some(index) = self.instance_to_point.remove(&instance_id) else {
            return;
        };
        if let Some(point) = self.points.get_mut(index) {
            point.active_instance = None;
            point.ready_at_ms = now_ms + point.respawn_delay_ms as u64;
            debug!(
                "Instance {} left spawn point {} in zone {}, respawning in {}ms",
                instance_id, index, point.zone_id, point.respawn_delay_ms
            );
        }
    }

    pub fn point(&self, spawn_ref: usize) -> Option<&SpawnPoint> {
        self.points.get(spawn_ref)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl std::fmt::Debug for SpawnDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnDirector")
            .field("points", &self.points.len())
            .field("occupied", &self.instance_to_point.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::zone_manager::{ZoneManager, DEFAULT_ZONE_ID};

    fn director() -> SpawnDirector {
        let zones = ZoneManager::with_defaults();
        let mut director = SpawnDirector::new();
        director.register_zone(zones.get(DEFAULT_ZONE_ID).expect("zone"));
        director
    }

    #[test]
    fn test_all_points_due_at_start() {
        let director = director();
        assert_eq!(director.due_spawns(0).len(), director.len());
    }

    #[test]
    fn test_bound_point_is_not_due() {
        let mut director = director();
        let first = director.due_spawns(0)[0];
        director.bind(first.spawn_ref, 100);

        let due = director.due_spawns(0);
        assert!(due.iter().all(|r| r.spawn_ref != first.spawn_ref));
    }

    #[test]
    fn test_respawn_waits_for_delay() {
        let mut director = director();
        let first = director.due_spawns(0)[0];
        director.bind(first.spawn_ref, 100);
        director.on_instance_removed(100, 5_000);

        let delay = director.point(first.spawn_ref).expect("point").respawn_delay_ms as u64;
        let not_yet = director.due_spawns(5_000 + delay - 1);
        assert!(not_yet.iter().all(|r| r.spawn_ref != first.spawn_ref));

        let due = director.due_spawns(5_000 + delay);
        assert!(due.iter().any(|r| r.spawn_ref == first.spawn_ref));
    }

    #[test]
    fn test_unknown_instance_removal_is_ignored() {
        let mut director = director();
        director.on_instance_removed(42, 1_000);
        assert_eq!(director.due_spawns(0).len(), director.len());
    }
}
