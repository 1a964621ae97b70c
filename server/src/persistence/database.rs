//! PostgreSQL database operations.
//!
//! Tables are described in `server/schema.sql`. Equipment, talents and base
//! stats are stored as JSON text columns on `characters`.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use async_trait::async_trait;
use log::warn;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use hunt_shared::{roll_over, CharacterClass, LevelProgress};

use super::cache::WriteEpoch;
use super::{AfkSession, Cache, CharacterRecord, CharacterStore};
use crate::error::{AuthError, StoreError, UpstreamError};
use crate::ledger::LevelingService;

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    cache: Option<Cache>,
    epoch: WriteEpoch,
}

fn to_i64(value: u64, column: &'static str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(column))
}

fn to_u64(value: i64, column: &'static str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange(column))
}

fn to_u32(value: i32, column: &'static str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::OutOfRange(column))
}

impl Database {
    /// Connect to the database
    pub async fn connect(url: &str, cache: Option<Cache>) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Ok(Self {
            pool,
            cache,
            epoch: WriteEpoch::default(),
        })
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Authenticate an account, returning its id
    pub async fn authenticate_account(&self, username: &str, password: &str) -> Result<i64, AuthError> {
        let row = sqlx::query("SELECT id, password_hash FROM accounts WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or(AuthError::InvalidCredentials)?;

        let account_id: i64 = row.get("id");
        let stored_hash: String = row.get("password_hash");

        let parsed_hash =
            PasswordHash::new(&stored_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        Ok(account_id)
    }

    /// Update last login timestamp
    pub async fn update_last_login(&self, account_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET last_login = NOW() WHERE id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Character Operations
    // =========================================================================

    fn record_from_row(row: &PgRow) -> Result<CharacterRecord, StoreError> {
        let class_val: i16 = row.get("class");
        let base_stats: String = row.get("base_stats");
        let equipment: String = row.get("equipment");
        let talents: String = row.get("talents");

        Ok(CharacterRecord {
            id: row.get("id"),
            account_id: row.get("account_id"),
            name: row.get("name"),
            class: CharacterClass::from_u8(class_val as u8).unwrap_or(CharacterClass::Warrior),
            zone_id: to_u32(row.get("zone_id"), "zone_id")?,
            level: to_u32(row.get("level"), "level")?,
            exp: to_u64(row.get("exp"), "exp")?,
            gold: to_u64(row.get("gold"), "gold")?,
            base_stats: serde_json::from_str(&base_stats)?,
            equipment: serde_json::from_str(&equipment)?,
            talents: serde_json::from_str(&talents)?,
        })
    }

    /// Drop a cached profile. Cache trouble never fails the write it follows.
    async fn invalidate(&self, character_id: i64) {
        self.epoch.bump();
        self.drop_cached(character_id).await;
    }

    async fn drop_cached(&self, character_id: i64) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(character_id).await {
                warn!("Failed to invalidate cached character {}: {}", character_id, e);
            }
        }
    }

    async fn fetch_character(&self, character_id: i64) -> Result<Option<CharacterRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, account_id, name, class, zone_id, level, exp, gold,
                    base_stats, equipment, talents
             FROM characters WHERE id = $1",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }
}

#[async_trait]
impl CharacterStore for Database {
    async fn load_character(&self, character_id: i64) -> Result<Option<CharacterRecord>, StoreError> {
        if let Some(cache) = &self.cache {
            match cache.load_character(character_id).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(e) => warn!("Failed to read cached character {}: {}", character_id, e),
            }
        }

        let epoch = self.epoch.current();
        let record = self.fetch_character(character_id).await?;

        if let (Some(cache), Some(record)) = (&self.cache, &record) {
            // Skip the fill when a write landed after the read
            if self.epoch.unchanged_since(epoch) {
                if let Err(e) = cache.save_character(record).await {
                    warn!("Failed to cache character {}: {}", character_id, e);
                }
                // A write that slipped in during the fill may have missed our entry
                if !self.epoch.unchanged_since(epoch) {
                    self.drop_cached(character_id).await;
                }
            }
        }
        Ok(record)
    }

    async fn load_progress(&self, character_id: i64) -> Result<(u32, u64), StoreError> {
        let row = sqlx::query("SELECT level, exp FROM characters WHERE id = $1")
            .bind(character_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::CharacterNotFound(character_id))?;

        Ok((to_u32(row.get("level"), "level")?, to_u64(row.get("exp"), "exp")?))
    }

    async fn save_progress(&self, character_id: i64, level: u32, exp: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE characters SET level = $2, exp = $3 WHERE id = $1")
            .bind(character_id)
            .bind(level as i32)
            .bind(to_i64(exp, "exp")?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CharacterNotFound(character_id));
        }
        self.invalidate(character_id).await;
        Ok(())
    }

    async fn add_gold(&self, character_id: i64, amount: u64) -> Result<u64, StoreError> {
        let total: Option<i64> =
            sqlx::query_scalar("UPDATE characters SET gold = gold + $2 WHERE id = $1 RETURNING gold")
                .bind(character_id)
                .bind(to_i64(amount, "gold")?)
                .fetch_optional(&self.pool)
                .await?;
        let total = total.ok_or(StoreError::CharacterNotFound(character_id))?;
        self.invalidate(character_id).await;
        to_u64(total, "gold")
    }

    async fn upsert_loot(&self, character_id: i64, item_id: u32, qty: u32) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "INSERT INTO character_loot (character_id, item_id, quantity)
             VALUES ($1, $2, $3)
             ON CONFLICT (character_id, item_id) DO UPDATE SET
                quantity = character_loot.quantity + EXCLUDED.quantity
             RETURNING quantity",
        )
        .bind(character_id)
        .bind(item_id as i32)
        .bind(qty as i64)
        .fetch_one(&self.pool)
        .await?;
        to_u64(count, "quantity")
    }

    async fn save_zone(&self, character_id: i64, zone_id: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE characters SET zone_id = $2 WHERE id = $1")
            .bind(character_id)
            .bind(zone_id as i32)
            .execute(&self.pool)
            .await?;
        self.invalidate(character_id).await;
        Ok(())
    }

    async fn load_afk_session(&self, character_id: i64) -> Result<Option<AfkSession>, StoreError> {
        let row = sqlx::query(
            "SELECT zone_id, auto, session_start_ms, last_snapshot_ms
             FROM afk_sessions WHERE character_id = $1",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<AfkSession, StoreError> {
            Ok(AfkSession {
                character_id,
                zone_id: to_u32(r.get("zone_id"), "zone_id")?,
                auto: r.get("auto"),
                session_start_ms: r.get("session_start_ms"),
                last_snapshot_ms: r.get("last_snapshot_ms"),
            })
        })
        .transpose()
    }

    async fn save_afk_session(&self, session: AfkSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO afk_sessions (character_id, zone_id, auto, session_start_ms, last_snapshot_ms)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (character_id) DO UPDATE SET
                zone_id = EXCLUDED.zone_id,
                auto = EXCLUDED.auto,
                session_start_ms = EXCLUDED.session_start_ms,
                last_snapshot_ms = EXCLUDED.last_snapshot_ms",
        )
        .bind(session.character_id)
        .bind(session.zone_id as i32)
        .bind(session.auto)
        .bind(session.session_start_ms)
        .bind(session.last_snapshot_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn advance_snapshot(
        &self,
        character_id: i64,
        expected_ms: i64,
        new_ms: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE afk_sessions SET last_snapshot_ms = $3
             WHERE character_id = $1 AND last_snapshot_ms = $2",
        )
        .bind(character_id)
        .bind(expected_ms)
        .bind(new_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_afk_session(&self, character_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM afk_sessions WHERE character_id = $1")
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Level rollover inside one transaction, holding the character row lock
#[async_trait]
impl LevelingService for Database {
    async fn apply_exp(&self, character_id: i64, exp_delta: u64) -> Result<LevelProgress, UpstreamError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let row = sqlx::query("SELECT level, exp FROM characters WHERE id = $1 FOR UPDATE")
            .bind(character_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(UpstreamError::Rejected(character_id))?;

        let level = to_u32(row.get("level"), "level")?;
        let exp = to_u64(row.get("exp"), "exp")?;
        let progress = roll_over(level, exp, exp_delta);

        sqlx::query("UPDATE characters SET level = $2, exp = $3 WHERE id = $1")
            .bind(character_id)
            .bind(progress.level as i32)
            .bind(to_i64(progress.exp, "exp")?)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        self.invalidate(character_id).await;
        Ok(progress)
    }
}
