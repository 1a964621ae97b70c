//! Offline kill and reward estimate.
//!
//! Instead of replaying ticks, an elapsed window is priced analytically from
//! the character's dps and the zone's spawn composition:
//!
//! 1. per part, `ttk = max(0.1, hp / dps)` and `kps = budget / ttk`
//! 2. the summed rate is capped by how fast slots refill,
//!    `totalBudget / avgRespawnSeconds`
//! 3. `totalKills = floor(effectiveKps * elapsed)`
//! 4. kills are split by each part's share of the uncapped rate, floored
//! 5. exp and average gold per kill are multiplied out per part
//! 6. loot is `floor(kills * rate)` per rule, with no randomness
//!
//! Everything here is pure: the same inputs always give the same estimate.

use log::warn;

use hunt_shared::{CreatureTable, RewardBatch};

use crate::world::{kill_exp, SpawnBudget};

/// Shortest time-to-kill considered, in seconds
pub const MIN_TTK_SECS: f64 = 0.1;

/// Floor on the average respawn time, in seconds
const MIN_AVG_RESPAWN_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct EstimateInput<'a> {
    pub elapsed_secs: f64,
    pub dps: f64,
    /// Zone experience multiplier
    pub difficulty: f64,
    pub composition: &'a [SpawnBudget],
}

/// Per spawn part breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct PartEstimate {
    /// Template actually used, which is the fallback's id when the configured
    /// one is unknown
    pub template_id: u32,
    pub kills_per_second: f64,
    pub kills: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub total_kps: f64,
    pub respawn_cap: f64,
    pub effective_kps: f64,
    pub total_kills: u64,
    /// Sum of the per-part kills; never more than `total_kills`
    pub kills: u64,
    pub batch: RewardBatch,
    /// Parts whose template had to be replaced by the fallback
    pub fallback_parts: u32,
    pub parts: Vec<PartEstimate>,
}

/// Kills per second one character sustains against `budget` creatures with
/// `hp` each
pub fn kills_per_second(hp: u32, budget: u32, dps: f64) -> f64 {
    if dps.is_nan() || dps <= 0.0 {
        return 0.0;
    }
    let ttk = (hp as f64 / dps).max(MIN_TTK_SECS);
    budget as f64 / ttk
}

pub fn estimate(input: &EstimateInput<'_>, templates: &CreatureTable) -> Estimate {
    let mut fallback_parts = 0;
    let mut resolved = Vec::with_capacity(input.composition.len());

    for part in input.composition {
        let (template, fell_back) = templates.get_or_fallback(part.template_id);
        if fell_back {
            warn!(
                "Unknown creature template {} in AFK composition, using fallback",
                part.template_id
            );
            fallback_parts += 1;
        }
        resolved.push((template, kills_per_second(template.base_hp, part.budget, input.dps)));
    }

    let total_kps: f64 = resolved.iter().map(|(_, kps)| kps).sum();
    let total_budget: u64 = input.composition.iter().map(|p| p.budget as u64).sum();
    let respawn_cap = if input.composition.is_empty() {
        0.0
    } else {
        let mean_ms = input
            .composition
            .iter()
            .map(|p| p.respawn_ms as f64)
            .sum::<f64>()
            / input.composition.len() as f64;
        total_budget as f64 / (mean_ms / 1000.0).max(MIN_AVG_RESPAWN_SECS)
    };
    let effective_kps = total_kps.min(respawn_cap);
    let total_kills = (effective_kps * input.elapsed_secs.max(0.0)).floor() as u64;

    let mut batch = RewardBatch::zero();
    let mut parts = Vec::with_capacity(resolved.len());
    let mut kills = 0;

    for (template, kps) in resolved {
        let share = if total_kps > 0.0 { kps / total_kps } else { 0.0 };
        let here = (total_kills as f64 * share).floor() as u64;

        batch.exp_delta = batch
            .exp_delta
            .saturating_add(here.saturating_mul(kill_exp(template.exp_base, input.difficulty)));
        batch.gold_delta = batch
            .gold_delta
            .saturating_add(here.saturating_mul(template.avg_gold()));
        for rule in &template.loot {
            let qty = (here as f64 * rule.rate.clamp(0.0, 1.0)).floor();
            batch.add_loot(rule.item_id, qty.min(u32::MAX as f64) as u32);
        }

        kills += here;
        parts.push(PartEstimate {
            template_id: template.id,
            kills_per_second: kps,
            kills: here,
        });
    }

    Estimate {
        total_kps,
        respawn_cap,
        effective_kps,
        total_kills,
        kills,
        batch,
        fallback_parts,
        parts,
    }
}
