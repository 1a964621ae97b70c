//! Redis cache of character profiles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use redis::{aio::ConnectionManager, AsyncCommands};

use super::CharacterRecord;
use crate::error::StoreError;

/// Cache key prefix
const CHARACTER_PREFIX: &str = "char:profile:";

/// TTL for cached data (1 hour)
const CACHE_TTL_SECONDS: u64 = 3600;

/// Counts profile writes in this process. A reader that fills the cache
/// after a DB read compares epochs around the fill and drops its entry when a
/// write landed in between.
#[derive(Debug, Clone, Default)]
pub struct WriteEpoch(Arc<AtomicU64>);

impl WriteEpoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Call before invalidating the cached profile
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unchanged_since(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

/// Redis cache wrapper
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    /// Connect to Redis
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(character_id: i64) -> String {
        format!("{}{}", CHARACTER_PREFIX, character_id)
    }

    pub async fn save_character(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(record.id), json, CACHE_TTL_SECONDS)
            .await?;
        Ok(())
    }

    /// A cached entry that no longer parses is treated as a miss
    pub async fn load_character(&self, character_id: i64) -> Result<Option<CharacterRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(Self::key(character_id)).await?;
        Ok(json.and_then(|j| serde_json::from_str(&j).ok()))
    }

    /// Drop a profile after its progress changed
    pub async fn invalidate(&self, character_id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(character_id)).await?;
        Ok(())
    }
}
