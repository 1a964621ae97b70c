//! In-process character store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AfkSession, CharacterRecord, CharacterStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    characters: HashMap<i64, CharacterRecord>,
    /// (character_id, item_id) -> quantity
    loot: HashMap<(i64, u32), u64>,
    afk_sessions: HashMap<i64, AfkSession>,
}

/// Map-backed [`CharacterStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_character(&self, record: CharacterRecord) {
        self.tables.lock().await.characters.insert(record.id, record);
    }

    pub async fn loot_count(&self, character_id: i64, item_id: u32) -> u64 {
        self.tables
            .lock()
            .await
            .loot
            .get(&(character_id, item_id))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn load_character(&self, character_id: i64) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self.tables.lock().await.characters.get(&character_id).cloned())
    }

    async fn load_progress(&self, character_id: i64) -> Result<(u32, u64), StoreError> {
        let tables = self.tables.lock().await;
        let record = tables
            .characters
            .get(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        Ok((record.level, record.exp))
    }

    async fn save_progress(&self, character_id: i64, level: u32, exp: u64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        record.level = level;
        record.exp = exp;
        Ok(())
    }

    async fn add_gold(&self, character_id: i64, amount: u64) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        record.gold = record.gold.saturating_add(amount);
        Ok(record.gold)
    }

    async fn upsert_loot(&self, character_id: i64, item_id: u32, qty: u32) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let count = tables.loot.entry((character_id, item_id)).or_insert(0);
        *count = count.saturating_add(qty as u64);
        Ok(*count)
    }

    async fn save_zone(&self, character_id: i64, zone_id: u32) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .characters
            .get_mut(&character_id)
            .ok_or(StoreError::CharacterNotFound(character_id))?;
        record.zone_id = zone_id;
        Ok(())
    }

    async fn load_afk_session(&self, character_id: i64) -> Result<Option<AfkSession>, StoreError> {
        Ok(self.tables.lock().await.afk_sessions.get(&character_id).copied())
    }

    async fn save_afk_session(&self, session: AfkSession) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .afk_sessions
            .insert(session.character_id, session);
        Ok(())
    }

    async fn advance_snapshot(
        &self,
        character_id: i64,
        expected_ms: i64,
        new_ms: i64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.afk_sessions.get_mut(&character_id) {
            Some(session) if session.last_snapshot_ms == expected_ms => {
                session.last_snapshot_ms = new_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_afk_session(&self, character_id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.afk_sessions.remove(&character_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunt_shared::{BaseStats, CharacterClass, Equipment};

    fn record(id: i64) -> CharacterRecord {
        CharacterRecord {
            id,
            account_id: 1,
            name: "Tester".into(),
            class: CharacterClass::Ninja,
            zone_id: 1,
            level: 1,
            exp: 0,
            gold: 10,
            base_stats: BaseStats::default(),
            equipment: Equipment::default(),
            talents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_loot_upsert_sums() {
        let store = MemoryStore::new();
        assert_eq!(store.upsert_loot(1, 3, 2).await.expect("upsert"), 2);
        assert_eq!(store.upsert_loot(1, 3, 5).await.expect("upsert"), 7);
        assert_eq!(store.loot_count(1, 3).await, 7);
        assert_eq!(store.loot_count(1, 4).await, 0);
    }

    #[tokio::test]
    async fn test_gold_is_additive() {
        let store = MemoryStore::new();
        store.insert_character(record(5)).await;

        assert_eq!(store.add_gold(5, 15).await.expect("gold"), 25);
        assert!(matches!(
            store.add_gold(6, 1).await,
            Err(StoreError::CharacterNotFound(6))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_swap_requires_expected_value() {
        let store = MemoryStore::new();
        store
            .save_afk_session(AfkSession {
                character_id: 5,
                zone_id: 1,
                auto: true,
                session_start_ms: 1_000,
                last_snapshot_ms: 1_000,
            })
            .await
            .expect("save");

        assert!(store.advance_snapshot(5, 1_000, 2_000).await.expect("cas"));
        assert!(!store.advance_snapshot(5, 1_000, 3_000).await.expect("cas"));
        let session = store.load_afk_session(5).await.expect("load").expect("session");
        assert_eq!(session.last_snapshot_ms, 2_000);

        assert!(store.clear_afk_session(5).await.expect("clear"));
        assert!(!store.advance_snapshot(5, 2_000, 4_000).await.expect("cas"));
    }
}
