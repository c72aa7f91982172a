//! In-process storage backends

use crate::rooms::{Member, Message, Room, User};
use crate::storage::{revocation_key, revocation_ttl, RevocationStore, RoomStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Revocation entries held in a concurrent map.
///
/// Deadlines use the tokio clock. Expired entries read as absent and are
/// dropped on lookup or by [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, Instant>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left before the entry for `token` lapses, if it is still live
    pub fn ttl_remaining(&self, token: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(&revocation_key(token))
            .and_then(|deadline| deadline.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }

    /// Drop lapsed entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, deadline| *deadline > now);
        before - self.entries.len()
    }

    /// Number of entries, including lapsed ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn is_revoked(&self, token: &str) -> Result<bool, StorageError> {
        let key = revocation_key(token);
        let now = Instant::now();

        let live = match self.entries.get(&key) {
            Some(deadline) => *deadline > now,
            None => return Ok(false),
        };

        if !live {
            self.entries.remove_if(&key, |_, deadline| *deadline <= now);
        }

        Ok(live)
    }

    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        let ttl = revocation_ttl(expires_at, Utc::now());
        self.entries.insert(revocation_key(token), Instant::now() + ttl);

        debug!(ttl_secs = ttl.as_secs(), "Stored revocation entry");
        Ok(())
    }
}

/// Room documents held in memory
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: RwLock<Vec<Room>>,
    users: RwLock<HashMap<Uuid, User>>,
    messages: RwLock<Vec<Message>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user (users are normally created by the account service)
    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.id, user);
    }

    /// Append a message (messages are normally written by the chat service)
    pub fn add_message(&self, message: Message) {
        self.messages.write().push(message);
    }

    /// Fetch a room by ID
    pub fn room(&self, room_id: Uuid) -> Option<Room> {
        self.rooms.read().iter().find(|r| r.id == room_id).cloned()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn list_rooms(&self) -> Result<Vec<Room>, StorageError> {
        Ok(self.rooms.read().clone())
    }

    async fn count_rooms_named(&self, name: &str) -> Result<u64, StorageError> {
        Ok(self.rooms.read().iter().filter(|r| r.name == name).count() as u64)
    }

    async fn insert_room(&self, room: &Room) -> Result<(), StorageError> {
        self.rooms.write().push(room.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.users.read().get(&user_id).cloned())
    }

    async fn add_member(&self, room_id: Uuid, member: &Member) -> Result<bool, StorageError> {
        let mut rooms = self.rooms.write();
        match rooms.iter_mut().find(|r| r.id == room_id) {
            Some(room) => {
                room.add_member(member.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_messages(&self, room_id: Uuid) -> Result<Vec<Message>, StorageError> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}
