//! Zone management system.
//!
//! A zone is a bounded arena with optional safe zones creatures may not
//! enter, and a spawn composition: which creature templates live there, how
//! many concurrent slots each gets, and how fast slots refill. The live spawn
//! director and the AFK estimator both read the same composition.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::path::Path;

use log::{error, info, warn};
use serde::Deserialize;

use hunt_shared::{CreatureTable, CreatureTemplate};

use super::geometry::{distance, Rect};

/// Default zone new characters enter
pub const DEFAULT_ZONE_ID: u32 = 1;

/// How far outside a safe zone edge a displaced spawn slot lands
const SAFE_ZONE_MARGIN: f32 = 0.5;

/// One template's share of a zone's population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnBudget {
    pub template_id: u32,
    /// Concurrent creature slots
    pub budget: u32,
    pub respawn_ms: u32,
}

/// Spawn configuration for one template in a zone
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnPart {
    pub template_id: u32,
    pub budget: u32,
    pub respawn_ms: u32,
    /// Centre of the ring the spawn points are laid out on
    pub anchor: [f32; 2],
    #[serde(default = "default_spawn_radius")]
    pub radius: f32,
}

fn default_spawn_radius() -> f32 {
    6.0
}

fn default_difficulty() -> f64 {
    1.0
}

/// Zone definition
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDefinition {
    pub id: u32,
    pub name: String,
    pub bounds: Rect,
    #[serde(default)]
    pub safe_zones: Vec<Rect>,
    pub player_spawn: [f32; 2],
    /// Experience multiplier applied to every kill in the zone
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default)]
    pub spawn_parts: Vec<SpawnPart>,
}

/// A single creature slot derived from a spawn part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSlot {
    pub position: [f32; 2],
    pub template_id: u32,
    pub respawn_delay_ms: u32,
}

impl ZoneDefinition {
    pub fn in_safe_zone(&self, p: [f32; 2]) -> bool {
        self.safe_zones.iter().any(|r| r.contains(p))
    }

    /// Spawn composition as read by the AFK estimator
    pub fn composition(&self) -> Vec<SpawnBudget> {
        self.spawn_parts
            .iter()
            .map(|p| SpawnBudget {
                template_id: p.template_id,
                budget: p.budget,
                respawn_ms: p.respawn_ms,
            })
            .collect()
    }

    /// Checks a zone from the world file before any geometry runs on it
    pub fn validate(&self) -> Result<(), String> {
        if !self.bounds.is_valid() {
            return Err(format!("invalid bounds {:?}", self.bounds));
        }
        if let Some(r) = self.safe_zones.iter().find(|r| !r.is_valid()) {
            return Err(format!("invalid safe zone {:?}", r));
        }
        if !self.player_spawn.iter().all(|v| v.is_finite()) {
            return Err(format!("invalid player spawn {:?}", self.player_spawn));
        }
        if !self.difficulty.is_finite() || self.difficulty < 0.0 {
            return Err(format!("invalid difficulty {}", self.difficulty));
        }
        for part in &self.spawn_parts {
            if !part.anchor.iter().all(|v| v.is_finite()) || !part.radius.is_finite() || part.radius < 0.0 {
                return Err(format!("invalid spawn part for template {}", part.template_id));
            }
        }
        Ok(())
    }

    /// One slot per unit of budget, evenly spaced on a ring around each
    /// part's anchor and clamped to the zone bounds. Slots that land in a
    /// safe zone move to the nearest point outside it; a slot with no such
    /// point inside the bounds is dropped.
    pub fn spawn_slots(&self) -> Vec<SpawnSlot> {
        let mut slots = Vec::new();
        for part in &self.spawn_parts {
            for i in 0..part.budget {
                let position = if part.budget == 1 {
                    part.anchor
                } else {
                    let angle = TAU * i as f32 / part.budget as f32;
                    [
                        part.anchor[0] + part.radius * angle.cos(),
                        part.anchor[1] + part.radius * angle.sin(),
                    ]
                };
                let Some(position) = self.outside_safe_zones(self.bounds.clamp(position)) else {
                    warn!(
                        "Zone {}: no room outside safe zones for a template {} slot near {:?}, dropping it",
                        self.id, part.template_id, position
                    );
                    continue;
                };
                slots.push(SpawnSlot {
                    position,
                    template_id: part.template_id,
                    respawn_delay_ms: part.respawn_ms,
                });
            }
        }
        slots
    }

    fn outside_safe_zones(&self, mut p: [f32; 2]) -> Option<[f32; 2]> {
        for _ in 0..=self.safe_zones.len() {
            let Some(zone) = self.safe_zones.iter().find(|r| r.contains(p)) else {
                return Some(p);
            };
            let from = p;
            p = zone
                .exits(from, SAFE_ZONE_MARGIN)
                .into_iter()
                .filter(|c| self.bounds.contains(*c))
                .min_by(|a, b| distance(from, *a).total_cmp(&distance(from, *b)))?;
        }
        (!self.in_safe_zone(p)).then_some(p)
    }
}

/// World file layout
#[derive(Debug, Deserialize)]
struct WorldFile {
    #[serde(default)]
    templates: Vec<CreatureTemplate>,
    #[serde(default)]
    zones: Vec<ZoneDefinition>,
}

/// Manages zone definitions and provides zone-related queries
#[derive(Debug, Default)]
pub struct ZoneManager {
    zones: HashMap<u32, ZoneDefinition>,
}

impl ZoneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in zones used when no world file is present
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.insert(ZoneDefinition {
            id: DEFAULT_ZONE_ID,
            name: "Shinsoo Fields".into(),
            bounds: Rect::new([-60.0, -60.0], [60.0, 60.0]),
            safe_zones: vec![Rect::new([-8.0, -8.0], [8.0, 8.0])],
            player_spawn: [0.0, 0.0],
            difficulty: 1.0,
            spawn_parts: vec![
                SpawnPart {
                    template_id: 1,
                    budget: 6,
                    respawn_ms: 30_000,
                    anchor: [22.0, 15.0],
                    radius: 6.0,
                },
                SpawnPart {
                    template_id: 2,
                    budget: 4,
                    respawn_ms: 45_000,
                    anchor: [-25.0, 20.0],
                    radius: 5.0,
                },
            ],
        });
        manager.insert(ZoneDefinition {
            id: 2,
            name: "Bone Hollow".into(),
            bounds: Rect::new([-40.0, -40.0], [40.0, 40.0]),
            safe_zones: vec![Rect::new([-40.0, -40.0], [-30.0, -30.0])],
            player_spawn: [-35.0, -35.0],
            difficulty: 1.5,
            spawn_parts: vec![SpawnPart {
                template_id: 3,
                budget: 8,
                respawn_ms: 40_000,
                anchor: [10.0, 10.0],
                radius: 8.0,
            }],
        });
        manager
    }

    pub fn insert(&mut self, zone: ZoneDefinition) {
        self.zones.insert(zone.id, zone);
    }

    pub fn get(&self, zone_id: u32) -> Option<&ZoneDefinition> {
        self.zones.get(&zone_id)
    }

    /// Composition for a zone, or None when the zone is not configured
    pub fn composition(&self, zone_id: u32) -> Option<Vec<SpawnBudget>> {
        self.zones
            .get(&zone_id)
            .map(|z| z.composition())
            .filter(|c| !c.is_empty())
    }

    pub fn zone_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.zones.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Load zones and creature templates from a world file. Either half falls
/// back to the built-in defaults when missing or empty.
pub fn load_world<P: AsRef<Path>>(path: P) -> (ZoneManager, CreatureTable) {
    let path = path.as_ref();

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read world file {:?}: {}", path, e);
            }
            info!("No world file at {:?}, using built-in zones and creatures", path);
            return (ZoneManager::with_defaults(), CreatureTable::with_defaults());
        }
    };

    let file: WorldFile = match serde_json::from_str(&content) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to parse world file {:?}: {}", path, e);
            return (ZoneManager::with_defaults(), CreatureTable::with_defaults());
        }
    };

    let templates = if file.templates.is_empty() {
        warn!("World file {:?} has no creature templates, using defaults", path);
        CreatureTable::with_defaults()
    } else {
        info!("Loaded {} creature templates from {:?}", file.templates.len(), path);
        CreatureTable::new(file.templates)
    };

    let zones = valid_zones(file.zones);
    let zones = if zones.is_empty() {
        warn!("World file {:?} has no usable zones, using defaults", path);
        ZoneManager::with_defaults()
    } else {
        zones
    };

    (zones, templates)
}

/// Keep the zones that pass [`ZoneDefinition::validate`]
fn valid_zones(defs: Vec<ZoneDefinition>) -> ZoneManager {
    let mut manager = ZoneManager::new();
    for zone in defs {
        if let Err(e) = zone.validate() {
            error!("Skipping zone {} ({}): {}", zone.id, zone.name, e);
            continue;
        }
        info!(
            "  Zone {}: {} ({} spawn parts, {} safe zones)",
            zone.id,
            zone.name,
            zone.spawn_parts.len(),
            zone.safe_zones.len()
        );
        manager.insert(zone);
    }
    manager
}
