//! Reward deltas flowing from combat or AFK settlement into the ledger.

use serde::{Deserialize, Serialize};

/// One loot line in a reward batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_id: u32,
    pub qty: u32,
}

/// Additive reward deltas. Rewards never subtract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBatch {
    pub exp_delta: u64,
    pub gold_delta: u64,
    pub loot: Vec<LootEntry>,
}

impl RewardBatch {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.exp_delta == 0 && self.gold_delta == 0 && self.loot.iter().all(|l| l.qty == 0)
    }

    /// Add loot, folding into an existing line for the same item
    pub fn add_loot(&mut self, item_id: u32, qty: u32) {
        if qty == 0 {
            return;
        }
        match self.loot.iter_mut().find(|l| l.item_id == item_id) {
            Some(entry) => entry.qty = entry.qty.saturating_add(qty),
            None => self.loot.push(LootEntry { item_id, qty }),
        }
    }

    pub fn merge(&mut self, other: &RewardBatch) {
        self.exp_delta = self.exp_delta.saturating_add(other.exp_delta);
        self.gold_delta = self.gold_delta.saturating_add(other.gold_delta);
        for entry in &other.loot {
            self.add_loot(entry.item_id, entry.qty);
        }
    }
}
