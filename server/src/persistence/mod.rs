//! Persistence layer for the hunt server.
//!
//! Everything the server reads or writes about a character goes through the
//! [`CharacterStore`] trait. Postgres ([`Database`], optionally fronted by the
//! Redis [`Cache`]) is the production backend; [`MemoryStore`] backs tests and
//! runs the server when Postgres is unreachable.
//!
//! The game loop never blocks on I/O: live kill rewards are handed to a
//! background task through a [`PersistenceHandle`].

mod cache;
mod database;
mod memory;

pub use cache::Cache;
pub use database::Database;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use hunt_shared::{resolve, BaseStats, CharacterClass, DerivedStats, Equipment, RewardBatch, Talent};

use crate::error::StoreError;
use crate::ledger::RewardLedger;

/// Everything needed to put a character into the world or estimate its dps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub class: CharacterClass,
    pub zone_id: u32,
    pub level: u32,
    pub exp: u64,
    pub gold: u64,
    pub base_stats: BaseStats,
    pub equipment: Equipment,
    pub talents: Vec<Talent>,
}

impl CharacterRecord {
    pub fn derived_stats(&self) -> DerivedStats {
        resolve(self.class, &self.base_stats, self.level, &self.equipment, &self.talents)
    }
}

/// Persisted AFK state for one character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkSession {
    pub character_id: i64,
    pub zone_id: u32,
    pub auto: bool,
    /// Unix ms
    pub session_start_ms: i64,
    /// End of the last settled window, unix ms. Never moves backwards.
    pub last_snapshot_ms: i64,
}

/// Character persistence
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn load_character(&self, character_id: i64) -> Result<Option<CharacterRecord>, StoreError>;

    /// Current `(level, exp)`
    async fn load_progress(&self, character_id: i64) -> Result<(u32, u64), StoreError>;

    async fn save_progress(&self, character_id: i64, level: u32, exp: u64) -> Result<(), StoreError>;

    /// Add to persisted gold, returning the new total
    async fn add_gold(&self, character_id: i64, amount: u64) -> Result<u64, StoreError>;

    /// Add `qty` of an item, creating the row if needed. Returns the new count.
    async fn upsert_loot(&self, character_id: i64, item_id: u32, qty: u32) -> Result<u64, StoreError>;

    async fn save_zone(&self, character_id: i64, zone_id: u32) -> Result<(), StoreError>;

    async fn load_afk_session(&self, character_id: i64) -> Result<Option<AfkSession>, StoreError>;

    /// Create or replace the character's session
    async fn save_afk_session(&self, session: AfkSession) -> Result<(), StoreError>;

    /// Move `last_snapshot_ms` from `expected_ms` to `new_ms`. Returns false,
    /// changing nothing, when the stored value is no longer `expected_ms`.
    async fn advance_snapshot(
        &self,
        character_id: i64,
        expected_ms: i64,
        new_ms: i64,
    ) -> Result<bool, StoreError>;

    /// Returns whether a session existed
    async fn clear_afk_session(&self, character_id: i64) -> Result<bool, StoreError>;
}

/// Commands sent to the persistence background task
#[derive(Debug)]
pub enum PersistenceCommand {
    /// Apply a live kill's reward through the ledger
    ApplyReward {
        character_id: i64,
        batch: RewardBatch,
    },
    /// Remember the zone a character is in
    SaveZone {
        character_id: i64,
        zone_id: u32,
    },
    /// Shutdown the persistence task
    Shutdown,
}

/// Handle for sending commands to the persistence task
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::Sender<PersistenceCommand>,
}

impl PersistenceHandle {
    /// Queue a reward (fire and forget - non-blocking)
    pub fn apply_reward(&self, character_id: i64, batch: RewardBatch) {
        if let Err(e) = self
            .sender
            .try_send(PersistenceCommand::ApplyReward { character_id, batch })
        {
            error!("Dropped reward for character {}: {}", character_id, e);
        }
    }

    pub fn save_zone(&self, character_id: i64, zone_id: u32) {
        let _ = self
            .sender
            .try_send(PersistenceCommand::SaveZone { character_id, zone_id });
    }

    /// Shutdown the persistence task
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PersistenceCommand::Shutdown).await;
    }
}

/// Store backends the server runs with
pub struct Backends {
    pub store: Arc<dyn CharacterStore>,
    /// Account login; None when Postgres is unreachable
    pub database: Option<Database>,
}

/// Connect to Postgres and Redis. Redis is optional; without Postgres the
/// server runs on an empty in-memory store and nobody can log in.
pub async fn connect(database_url: &str, redis_url: &str) -> Backends {
    let cache = match Cache::connect(redis_url).await {
        Ok(cache) => {
            info!("Connected to Redis");
            Some(cache)
        }
        Err(e) => {
            warn!("Failed to connect to Redis: {}", e);
            warn!("Character profiles will not be cached");
            None
        }
    };

    match Database::connect(database_url, cache).await {
        Ok(db) => {
            info!("Connected to PostgreSQL");
            Backends {
                store: Arc::new(db.clone()),
                database: Some(db),
            }
        }
        Err(e) => {
            error!("Failed to connect to PostgreSQL: {}", e);
            warn!("Running with an in-memory store - login is disabled");
            Backends {
                store: Arc::new(MemoryStore::new()),
                database: None,
            }
        }
    }
}

/// Spawn the background task and return a handle for sending commands
pub fn spawn_writer(store: Arc<dyn CharacterStore>, ledger: Arc<RewardLedger>) -> PersistenceHandle {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(persistence_task(store, ledger, rx));
    info!("Persistence background task started");
    PersistenceHandle { sender: tx }
}

/// Background task that handles all persistence operations
async fn persistence_task(
    store: Arc<dyn CharacterStore>,
    ledger: Arc<RewardLedger>,
    mut rx: mpsc::Receiver<PersistenceCommand>,
) {
    info!("Persistence task running");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            PersistenceCommand::ApplyReward { character_id, batch } => {
                let receipt = ledger.apply(character_id, &batch).await;
                if receipt.persisted_lag {
                    warn!("Live reward for character {} only partially persisted", character_id);
                }
            }

            PersistenceCommand::SaveZone { character_id, zone_id } => {
                if let Err(e) = store.save_zone(character_id, zone_id).await {
                    error!("Failed to save zone for character {}: {}", character_id, e);
                }
            }

            PersistenceCommand::Shutdown => {
                info!("Persistence task shutting down");
                break;
            }
        }
    }

    info!("Persistence task stopped");
}
