//! Error types for the server.

use hunt_shared::ErrorKind;
use thiserror::Error;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Character {0} not found")]
    CharacterNotFound(i64),

    #[error("Value out of range for column {0}")]
    OutOfRange(&'static str),
}

/// Login failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Password verification failed: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The leveling capability could not apply an experience delta
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Leveling service unavailable: {0}")]
    Unavailable(String),

    #[error("Leveling service rejected character {0}")]
    Rejected(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of an AFK request
#[derive(Debug, Error)]
pub enum AfkError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Character {0} does not belong to this account")]
    Forbidden(i64),

    #[error("No active AFK session for character {0}")]
    NotFound(i64),

    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AfkError {
    /// Status reported to the client
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

/// A live attack that was not carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("Attack is on cooldown until {ready_at_ms}ms")]
    OnCooldown { ready_at_ms: u64 },

    #[error("Target is out of range")]
    OutOfRange,

    #[error("Target is already dead")]
    TargetDead,

    #[error("Unknown target {0}")]
    UnknownTarget(u64),

    #[error("Unknown player {0}")]
    UnknownPlayer(u64),

    #[error("Dead players cannot attack")]
    AttackerDead,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_afk_errors_map_to_statuses() {
        assert_eq!(AfkError::Unauthenticated.kind(), ErrorKind::Unauthenticated);
        assert_eq!(AfkError::Forbidden(3).kind(), ErrorKind::Forbidden);
        assert_eq!(AfkError::NotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(AfkError::BadRequest("missing characterId").kind(), ErrorKind::BadRequest);
        assert_eq!(
            AfkError::Store(StoreError::CharacterNotFound(3)).kind(),
            ErrorKind::Internal
        );
    }
}
