//! Storage backends for Roomgate
//!
//! - Redis: revocation entries with per-key TTL
//! - Postgres: room, user and message documents
//! - Memory: both of the above in-process, for tests and single-node runs

mod memory;
mod postgres;
mod redis;

pub use self::memory::{MemoryRevocationStore, MemoryRoomStore};
pub use self::postgres::{PostgresConfig, PostgresRoomStore};
pub use self::redis::{RedisConfig, RedisRevocationStore};

use crate::rooms::{Member, Message, Room, User};
pub use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Prefix of every revocation key
pub const REVOCATION_KEY_PREFIX: &str = "blacklist:";

/// Value stored under a revocation key. Only presence matters.
pub const REVOCATION_SENTINEL: &str = "1";

/// Floor for a revocation entry's TTL
pub const MIN_REVOCATION_TTL: Duration = Duration::from_secs(60 * 60);

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Key under which a token's revocation entry lives
pub fn revocation_key(token: &str) -> String {
    format!("{}{}", REVOCATION_KEY_PREFIX, token)
}

/// TTL for a revocation entry: the token's remaining lifetime, never less than
/// [`MIN_REVOCATION_TTL`].
pub fn revocation_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
    remaining.max(MIN_REVOCATION_TTL)
}

/// Trait for the token revocation cache
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Point lookup. A confirmed miss is `Ok(false)`; a failed query is an error.
    async fn is_revoked(&self, token: &str) -> Result<bool, StorageError>;

    /// Record a token as revoked until its expiry (see [`revocation_ttl`])
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError>;
}

/// Trait for the room document store
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// All rooms
    async fn list_rooms(&self) -> Result<Vec<Room>, StorageError>;

    /// Number of rooms with exactly this name
    async fn count_rooms_named(&self, name: &str) -> Result<u64, StorageError>;

    /// Insert a new room
    async fn insert_room(&self, room: &Room) -> Result<(), StorageError>;

    /// Look up a user by ID
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StorageError>;

    /// Add a member to a room if not already present.
    /// Returns false when no room has this ID.
    async fn add_member(&self, room_id: Uuid, member: &Member) -> Result<bool, StorageError>;

    /// Messages posted to a room, oldest first
    async fn list_messages(&self, room_id: Uuid) -> Result<Vec<Message>, StorageError>;
}
