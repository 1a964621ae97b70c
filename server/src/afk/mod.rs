//! AFK catch-up.
//!
//! A character can start an AFK session in a zone and later settle it: the
//! window since the last snapshot is priced by the [`estimator`] and paid out
//! through the same [`RewardLedger`] live kills use.
//!
//! Settling first claims its window with a compare-and-swap on the stored
//! snapshot time, so two concurrent settles can never both pay for the same
//! stretch. The snapshot moves forward on every settle that gets that far,
//! including ones that pay nothing.

pub mod estimator;

pub use estimator::{estimate, Estimate, EstimateInput};

use std::sync::Arc;

use log::{debug, info, warn};

use hunt_shared::{AfkSettlement, CreatureTable};

use crate::clock::Clock;
use crate::config::AfkConfig;
use crate::error::AfkError;
use crate::ledger::RewardLedger;
use crate::persistence::{AfkSession, CharacterRecord, CharacterStore};
use crate::world::{SpawnBudget, ZoneManager};

pub struct AfkService {
    store: Arc<dyn CharacterStore>,
    ledger: Arc<RewardLedger>,
    zones: Arc<ZoneManager>,
    templates: Arc<CreatureTable>,
    clock: Arc<dyn Clock>,
    config: AfkConfig,
}

impl AfkService {
    pub fn new(
        store: Arc<dyn CharacterStore>,
        ledger: Arc<RewardLedger>,
        zones: Arc<ZoneManager>,
        templates: Arc<CreatureTable>,
        clock: Arc<dyn Clock>,
        config: AfkConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            zones,
            templates,
            clock,
            config,
        }
    }

    /// Resolve the caller and character, in that order
    async fn authorize(
        &self,
        account_id: Option<i64>,
        character_id: Option<i64>,
    ) -> Result<CharacterRecord, AfkError> {
        let account_id = account_id.ok_or(AfkError::Unauthenticated)?;
        let character_id = character_id
            .filter(|id| *id > 0)
            .ok_or(AfkError::BadRequest("missing characterId"))?;

        // A character that does not exist is reported like someone else's
        let record = self
            .store
            .load_character(character_id)
            .await?
            .ok_or(AfkError::Forbidden(character_id))?;
        if record.account_id != account_id {
            return Err(AfkError::Forbidden(character_id));
        }
        Ok(record)
    }

    /// Start (or restart) a session. Any unsettled time from a previous
    /// session is discarded.
    pub async fn begin(
        &self,
        account_id: Option<i64>,
        character_id: Option<i64>,
        zone_id: u32,
        auto: bool,
    ) -> Result<AfkSession, AfkError> {
        let record = self.authorize(account_id, character_id).await?;
        let now = self.clock.now_ms();

        let session = AfkSession {
            character_id: record.id,
            zone_id,
            auto,
            session_start_ms: now,
            last_snapshot_ms: now,
        };
        self.store.save_afk_session(session).await?;

        if self.zones.composition(zone_id).is_none() {
            warn!(
                "Character {} went AFK in zone {} which has no spawn configuration",
                record.id, zone_id
            );
        }
        info!("Character {} started AFK in zone {} (auto: {})", record.id, zone_id, auto);
        Ok(session)
    }

    pub async fn settle(
        &self,
        account_id: Option<i64>,
        character_id: Option<i64>,
    ) -> Result<AfkSettlement, AfkError> {
        let record = self.authorize(account_id, character_id).await?;
        let session = self
            .store
            .load_afk_session(record.id)
            .await?
            .ok_or(AfkError::NotFound(record.id))?;

        // Claim the window before doing any work
        let stamp = self.clock.now_ms().max(session.last_snapshot_ms);
        if !self
            .store
            .advance_snapshot(record.id, session.last_snapshot_ms, stamp)
            .await?
        {
            warn!(
                "Concurrent settle for character {} already claimed this window",
                record.id
            );
            return Ok(AfkSettlement {
                character_id: record.id,
                ..Default::default()
            });
        }

        let elapsed_secs = ((stamp - session.last_snapshot_ms) as f64 / 1000.0)
            .min(self.config.max_elapsed_secs);

        if !session.auto || elapsed_secs < self.config.min_elapsed_secs {
            debug!(
                "AFK settle for character {} below threshold ({:.1}s, auto: {})",
                record.id, elapsed_secs, session.auto
            );
            return Ok(AfkSettlement {
                character_id: record.id,
                elapsed_secs,
                ..Default::default()
            });
        }

        let (composition, difficulty) = self.composition_for(session.zone_id);
        let stats = record.derived_stats();
        let estimate = estimate(
            &EstimateInput {
                elapsed_secs,
                dps: stats.dps(),
                difficulty,
                composition: &composition,
            },
            &self.templates,
        );

        let mut settlement = AfkSettlement {
            character_id: record.id,
            elapsed_secs,
            kills: estimate.kills,
            exp: estimate.batch.exp_delta,
            gold: estimate.batch.gold_delta,
            loot: estimate.batch.loot.clone(),
            new_level: None,
            new_exp: None,
            fallback_parts: estimate.fallback_parts,
            persisted_lag: false,
        };

        if !estimate.batch.is_empty() {
            let receipt = self.ledger.apply(record.id, &estimate.batch).await;
            settlement.new_level = receipt.new_level;
            settlement.new_exp = receipt.new_exp;
            settlement.persisted_lag = receipt.persisted_lag;
        }

        info!(
            "Character {} settled {:.0}s AFK: {} kills, +{} exp, +{} gold, {} loot lines",
            record.id,
            elapsed_secs,
            settlement.kills,
            settlement.exp,
            settlement.gold,
            settlement.loot.len()
        );
        Ok(settlement)
    }

    /// End the session without settling
    pub async fn end(&self, account_id: Option<i64>, character_id: Option<i64>) -> Result<(), AfkError> {
        let record = self.authorize(account_id, character_id).await?;
        if !self.store.clear_afk_session(record.id).await? {
            return Err(AfkError::NotFound(record.id));
        }
        info!("Character {} ended AFK", record.id);
        Ok(())
    }

    /// Drop the session when its character leaves the session's zone.
    /// Returns whether a session was cleared.
    pub async fn on_zone_exit(&self, character_id: i64, new_zone_id: u32) -> Result<bool, AfkError> {
        match self.store.load_afk_session(character_id).await? {
            Some(session) if session.zone_id != new_zone_id => {
                self.store.clear_afk_session(character_id).await?;
                info!(
                    "Character {} left zone {}, AFK session cleared",
                    character_id, session.zone_id
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Zone composition and difficulty, or the configured single-template
    /// fallback when the zone has none
    fn composition_for(&self, zone_id: u32) -> (Vec<SpawnBudget>, f64) {
        let difficulty = self.zones.get(zone_id).map(|z| z.difficulty).unwrap_or(1.0);
        match self.zones.composition(zone_id) {
            Some(composition) => (composition, difficulty),
            None => {
                warn!(
                    "Zone {} has no spawn configuration, using fallback composition",
                    zone_id
                );
                (
                    vec![SpawnBudget {
                        template_id: self.config.fallback_template_id,
                        budget: self.config.fallback_budget,
                        respawn_ms: self.config.fallback_respawn_ms,
                    }],
                    difficulty,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::LocalLeveling;
    use crate::persistence::MemoryStore;
    use hunt_shared::{BaseStats, CharacterClass, Equipment};

    const START_MS: i64 = 1_700_000_000_000;

    async fn service() -> (AfkService, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_character(CharacterRecord {
                id: 5,
                account_id: 2,
                name: "Idler".into(),
                class: CharacterClass::Warrior,
                zone_id: 1,
                level: 1,
                exp: 0,
                gold: 0,
                base_stats: BaseStats {
                    strength: 5,
                    ..Default::default()
                },
                equipment: Equipment::default(),
                talents: Vec::new(),
            })
            .await;
        let clock = Arc::new(ManualClock::new(START_MS));
        let ledger = Arc::new(RewardLedger::new(
            store.clone(),
            Arc::new(LocalLeveling::new(store.clone())),
        ));
        let afk = AfkService::new(
            store.clone(),
            ledger,
            Arc::new(ZoneManager::with_defaults()),
            Arc::new(CreatureTable::with_defaults()),
            clock.clone(),
            AfkConfig::default(),
        );
        (afk, store, clock)
    }

    #[tokio::test]
    async fn test_begin_stamps_now() {
        let (afk, store, _clock) = service().await;

        let session = afk.begin(Some(2), Some(5), 1, true).await.expect("begin");

        assert_eq!(session.session_start_ms, START_MS);
        assert_eq!(session.last_snapshot_ms, START_MS);
        assert_eq!(store.load_afk_session(5).await.expect("load"), Some(session));
    }

    #[tokio::test]
    async fn test_settle_pays_and_advances_snapshot() {
        let (afk, store, clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");
        clock.advance_secs(600);

        let settlement = afk.settle(Some(2), Some(5)).await.expect("settle");

        assert_eq!(settlement.elapsed_secs, 600.0);
        assert!(settlement.kills > 0);
        assert!(settlement.exp > 0);
        assert!(!settlement.persisted_lag);
        let session = store.load_afk_session(5).await.expect("load").expect("session");
        assert_eq!(session.last_snapshot_ms, START_MS + 600_000);
        assert_eq!(session.session_start_ms, START_MS);
    }

    #[tokio::test]
    async fn test_short_window_still_moves_snapshot() {
        let (afk, store, clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");
        clock.advance_secs(30);

        let settlement = afk.settle(Some(2), Some(5)).await.expect("settle");

        assert_eq!(settlement.elapsed_secs, 30.0);
        assert_eq!(settlement.kills, 0);
        assert_eq!(settlement.exp, 0);
        let session = store.load_afk_session(5).await.expect("load").expect("session");
        assert_eq!(session.last_snapshot_ms, START_MS + 30_000);
    }

    #[tokio::test]
    async fn test_elapsed_is_capped() {
        let (afk, _store, clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");
        clock.advance_secs(30 * 24 * 3600);

        let settlement = afk.settle(Some(2), Some(5)).await.expect("settle");

        assert_eq!(settlement.elapsed_secs, AfkConfig::default().max_elapsed_secs);
    }

    #[tokio::test]
    async fn test_clock_going_backwards_settles_zero() {
        let (afk, store, clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");
        clock.set_ms(START_MS - 60_000);

        let settlement = afk.settle(Some(2), Some(5)).await.expect("settle");

        assert_eq!(settlement.elapsed_secs, 0.0);
        let session = store.load_afk_session(5).await.expect("load").expect("session");
        assert_eq!(session.last_snapshot_ms, START_MS);
    }

    #[tokio::test]
    async fn test_end_clears_and_then_reports_missing() {
        let (afk, _store, _clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");

        afk.end(Some(2), Some(5)).await.expect("end");

        assert!(matches!(afk.end(Some(2), Some(5)).await, Err(AfkError::NotFound(5))));
        assert!(matches!(afk.settle(Some(2), Some(5)).await, Err(AfkError::NotFound(5))));
    }

    #[tokio::test]
    async fn test_zone_exit_only_clears_other_zones() {
        let (afk, store, _clock) = service().await;
        afk.begin(Some(2), Some(5), 1, true).await.expect("begin");

        assert!(!afk.on_zone_exit(5, 1).await.expect("same zone"));
        assert!(store.load_afk_session(5).await.expect("load").is_some());

        assert!(afk.on_zone_exit(5, 2).await.expect("other zone"));
        assert!(store.load_afk_session(5).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_authorization_order() {
        let (afk, _store, _clock) = service().await;

        assert!(matches!(afk.begin(None, None, 1, true).await, Err(AfkError::Unauthenticated)));
        assert!(matches!(
            afk.begin(Some(2), None, 1, true).await,
            Err(AfkError::BadRequest(_))
        ));
        assert!(matches!(
            afk.begin(Some(2), Some(0), 1, true).await,
            Err(AfkError::BadRequest(_))
        ));
        assert!(matches!(
            afk.begin(Some(3), Some(5), 1, true).await,
            Err(AfkError::Forbidden(5))
        ));
        assert!(matches!(
            afk.begin(Some(2), Some(404), 1, true).await,
            Err(AfkError::Forbidden(404))
        ));
    }
}
