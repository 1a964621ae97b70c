//! Reward ledger.
//!
//! Both the live kill path and AFK settlement end here. Experience goes to a
//! [`LevelingService`], gold is added to the persisted total and every loot
//! line is upserted as a summed count. The three writes are independent: a
//! failure in one is logged, flagged on the receipt and does not undo or stop
//! the others. Persisted state is authoritative on the next read.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};

use hunt_shared::{roll_over, LevelProgress, RewardBatch};

use crate::error::UpstreamError;
use crate::persistence::CharacterStore;

/// The capability that turns an experience delta into a new level and exp
#[async_trait]
pub trait LevelingService: Send + Sync {
    async fn apply_exp(&self, character_id: i64, exp_delta: u64) -> Result<LevelProgress, UpstreamError>;
}

/// Read-modify-write leveling on top of any store
pub struct LocalLeveling {
    store: Arc<dyn CharacterStore>,
}

impl LocalLeveling {
    pub fn new(store: Arc<dyn CharacterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LevelingService for LocalLeveling {
    async fn apply_exp(&self, character_id: i64, exp_delta: u64) -> Result<LevelProgress, UpstreamError> {
        let (level, exp) = self.store.load_progress(character_id).await?;
        let progress = roll_over(level, exp, exp_delta);
        self.store
            .save_progress(character_id, progress.level, progress.exp)
            .await?;
        Ok(progress)
    }
}

/// What actually reached storage for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Set when the leveling service acknowledged the exp delta
    pub new_level: Option<u32>,
    pub new_exp: Option<u64>,
    pub levels_gained: u32,
    pub gold_total: Option<u64>,
    /// At least one write failed; persisted totals may trail the batch
    pub persisted_lag: bool,
}

pub struct RewardLedger {
    store: Arc<dyn CharacterStore>,
    leveling: Arc<dyn LevelingService>,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn CharacterStore>, leveling: Arc<dyn LevelingService>) -> Self {
        Self { store, leveling }
    }

    pub async fn apply(&self, character_id: i64, batch: &RewardBatch) -> LedgerReceipt {
        let mut receipt = LedgerReceipt::default();

        if batch.exp_delta > 0 {
            match self.leveling.apply_exp(character_id, batch.exp_delta).await {
                Ok(progress) => {
                    if progress.levels_gained > 0 {
                        info!(
                            "Character {} reached level {} (+{})",
                            character_id, progress.level, progress.levels_gained
                        );
                    }
                    receipt.new_level = Some(progress.level);
                    receipt.new_exp = Some(progress.exp);
                    receipt.levels_gained = progress.levels_gained;
                }
                Err(e) => {
                    warn!(
                        "Failed to apply {} exp to character {}: {}",
                        batch.exp_delta, character_id, e
                    );
                    receipt.persisted_lag = true;
                }
            }
        }

        if batch.gold_delta > 0 {
            match self.store.add_gold(character_id, batch.gold_delta).await {
                Ok(total) => receipt.gold_total = Some(total),
                Err(e) => {
                    error!(
                        "Failed to add {} gold to character {}: {}",
                        batch.gold_delta, character_id, e
                    );
                    receipt.persisted_lag = true;
                }
            }
        }

        for entry in batch.loot.iter().filter(|l| l.qty > 0) {
            if let Err(e) = self
                .store
                .upsert_loot(character_id, entry.item_id, entry.qty)
                .await
            {
                error!(
                    "Failed to add {}x item {} to character {}: {}",
                    entry.qty, entry.item_id, character_id, e
                );
                receipt.persisted_lag = true;
            }
        }

        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{CharacterRecord, MemoryStore};
    use hunt_shared::{BaseStats, CharacterClass, Equipment, LootEntry};

    struct OfflineLeveling;

    #[async_trait]
    impl LevelingService for OfflineLeveling {
        async fn apply_exp(&self, _character_id: i64, _exp_delta: u64) -> Result<LevelProgress, UpstreamError> {
            Err(UpstreamError::Unavailable("connection refused".into()))
        }
    }

    async fn store_with_character() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_character(CharacterRecord {
                id: 1,
                account_id: 1,
                name: "Ledger".into(),
                class: CharacterClass::Sura,
                zone_id: 1,
                level: 1,
                exp: 0,
                gold: 100,
                base_stats: BaseStats::default(),
                equipment: Equipment::default(),
                talents: Vec::new(),
            })
            .await;
        store
    }

    fn batch() -> RewardBatch {
        RewardBatch {
            exp_delta: 400,
            gold_delta: 25,
            loot: vec![LootEntry { item_id: 3, qty: 4 }, LootEntry { item_id: 1, qty: 0 }],
        }
    }

    #[tokio::test]
    async fn test_apply_rolls_levels_and_sums() {
        let store = store_with_character().await;
        let ledger = RewardLedger::new(store.clone(), Arc::new(LocalLeveling::new(store.clone())));

        let receipt = ledger.apply(1, &batch()).await;

        assert_eq!(receipt.new_level, Some(3));
        assert_eq!(receipt.new_exp, Some(18));
        assert_eq!(receipt.levels_gained, 2);
        assert_eq!(receipt.gold_total, Some(125));
        assert!(!receipt.persisted_lag);
        assert_eq!(store.loot_count(1, 3).await, 4);
        assert_eq!(store.loot_count(1, 1).await, 0);

        ledger.apply(1, &batch()).await;
        assert_eq!(store.loot_count(1, 3).await, 8);
    }

    #[tokio::test]
    async fn test_leveling_outage_still_pays_gold_and_loot() {
        let store = store_with_character().await;
        let ledger = RewardLedger::new(store.clone(), Arc::new(OfflineLeveling));

        let receipt = ledger.apply(1, &batch()).await;

        assert!(receipt.persisted_lag);
        assert_eq!(receipt.new_level, None);
        assert_eq!(receipt.gold_total, Some(125));
        assert_eq!(store.loot_count(1, 3).await, 4);
        assert_eq!(store.load_progress(1).await.expect("progress"), (1, 0));
    }

    #[tokio::test]
    async fn test_unknown_character_flags_lag() {
        let store = store_with_character().await;
        let ledger = RewardLedger::new(store.clone(), Arc::new(LocalLeveling::new(store.clone())));

        let receipt = ledger.apply(99, &batch()).await;

        assert!(receipt.persisted_lag);
        assert_eq!(receipt.gold_total, None);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let store = store_with_character().await;
        let ledger = RewardLedger::new(store.clone(), Arc::new(OfflineLeveling));

        let receipt = ledger.apply(1, &RewardBatch::zero()).await;

        assert_eq!(receipt, LedgerReceipt::default());
    }
}
