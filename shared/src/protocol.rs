//! Network protocol definitions shared between client and server.

use serde::{Deserialize, Serialize};

use crate::rewards::LootEntry;
use crate::stats::{CharacterClass, DerivedStats};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 3;

/// Server tick rate in Hz
pub const SERVER_TICK_RATE: u32 = 20;

/// Default server port
pub const DEFAULT_PORT: u16 = 7777;

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Login with existing account
    Login {
        protocol_version: u32,
        username: String,
        password: String,
    },

    /// Enter the world with one of the account's characters
    SelectCharacter {
        character_id: i64,
    },

    /// Disconnect gracefully
    Disconnect,

    /// Player position update (sent frequently)
    PlayerUpdate {
        position: [f32; 2],
    },

    /// Attack a creature
    Attack {
        target_id: u64,
    },

    /// Toggle automatic attacks on the nearest creature in range
    SetAutoAttack {
        enabled: bool,
    },

    /// Move to another zone. Leaving a zone ends any AFK session.
    ChangeZone {
        zone_id: u32,
    },

    /// Start an AFK session in a zone
    BeginAfk {
        character_id: Option<i64>,
        zone_id: u32,
        auto: bool,
    },

    /// Settle rewards for time spent AFK since the last snapshot
    SettleAfk {
        character_id: Option<i64>,
    },

    /// End the AFK session without settling
    EndAfk {
        character_id: Option<i64>,
    },
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Login successful - client may now select a character
    LoginSuccess {
        account_id: i64,
    },

    /// Login failed
    LoginFailed {
        reason: String,
    },

    /// Character selected - enter game with resolved stats
    CharacterSelected {
        character_id: i64,
        name: String,
        class: CharacterClass,
        zone_id: u32,
        position: [f32; 2],
        level: u32,
        experience: u64,
        gold: u64,
        stats: DerivedStats,
    },

    /// World state update for the receiver's zone (sent every server tick)
    WorldState {
        tick: u64,
        players: Vec<PlayerState>,
        creatures: Vec<CreatureState>,
    },

    /// Damage was dealt
    DamageEvent {
        attacker_id: u64,
        target_id: u64,
        damage: u32,
        target_new_health: u32,
    },

    /// A creature died
    CreatureDeath {
        creature_id: u64,
        killer_id: Option<u64>,
    },

    /// A creature spawned
    CreatureSpawn {
        creature_id: u64,
        template_id: u32,
        position: [f32; 2],
        health: u32,
    },

    /// A player died
    PlayerDeath {
        player_id: u64,
        killer_id: u64,
    },

    /// Rewards granted to the receiving player by a live kill
    RewardGranted {
        exp: u64,
        gold: u64,
        loot: Vec<LootEntry>,
    },

    /// Zone change acknowledged
    ZoneChanged {
        zone_id: u32,
        position: [f32; 2],
    },

    /// AFK session started
    AfkStarted {
        character_id: i64,
        zone_id: u32,
        started_at_ms: i64,
    },

    /// AFK rewards settled
    AfkSettled(AfkSettlement),

    /// AFK session ended
    AfkEnded {
        character_id: i64,
    },

    /// A request was rejected
    RequestFailed {
        kind: ErrorKind,
        reason: String,
    },
}

// =============================================================================
// State Types
// =============================================================================

/// Player state for world updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u64,
    pub position: [f32; 2],
    pub health: u32,
    pub max_health: u32,
}

/// Behaviour state of a creature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CreatureMode {
    #[default]
    Idle,
    Patrol,
    Chase,
    Attack,
    Dead,
}

/// Creature state for world updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureState {
    pub id: u64,
    pub template_id: u32,
    pub position: [f32; 2],
    pub health: u32,
    pub max_health: u32,
    pub mode: CreatureMode,
    pub target_id: Option<u64>,
}

/// Settlement response for an AFK window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AfkSettlement {
    pub character_id: i64,
    pub elapsed_secs: f64,
    pub kills: u64,
    pub exp: u64,
    pub gold: u64,
    pub loot: Vec<LootEntry>,
    pub new_level: Option<u32>,
    pub new_exp: Option<u64>,
    /// Number of spawn parts that resolved to the fallback template
    pub fallback_parts: u32,
    /// Some write did not land; persisted totals may trail the reported batch
    pub persisted_lag: bool,
}

/// Status of a rejected request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    BadRequest,
    Internal,
}

// =============================================================================
// Serialization helpers
// =============================================================================

impl ClientMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_survives_the_wire() {
        let msg = ServerMessage::AfkSettled(AfkSettlement {
            character_id: 7,
            elapsed_secs: 120.0,
            kills: 240,
            exp: 1200,
            gold: 480,
            loot: vec![LootEntry { item_id: 3, qty: 120 }],
            new_level: Some(4),
            new_exp: Some(18),
            fallback_parts: 0,
            persisted_lag: false,
        });
        let bytes = msg.serialize().expect("serialize");

        match ServerMessage::deserialize(&bytes).expect("deserialize") {
            ServerMessage::AfkSettled(s) => {
                assert_eq!(s.kills, 240);
                assert_eq!(s.new_level, Some(4));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
