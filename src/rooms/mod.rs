//! Chat room documents
//!
//! Rooms, users and messages as they are kept by the document store. The
//! store itself sits behind [`RoomStore`](crate::storage::RoomStore).

use crate::auth::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room name must not be empty")]
    EmptyName,

    #[error("invalid room type '{0}': expected 'public' or 'private'")]
    InvalidKind(String),
}

/// Room visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Public,
    Private,
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKind::Public => write!(f, "public"),
            RoomKind::Private => write!(f, "private"),
        }
    }
}

impl FromStr for RoomKind {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(RoomKind::Public),
            "private" => Ok(RoomKind::Private),
            other => Err(RoomError::InvalidKind(other.to_string())),
        }
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Never leaves the server; a user read back from JSON is a member
    #[serde(skip)]
    pub role: Role,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            role,
            image_url: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Public projection stored in a room's member list
    pub fn to_member(&self) -> Member {
        Member {
            id: self.id,
            email: self.email.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// What other room members may see of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// A new room whose first member is its creator
    pub fn create(name: String, kind: RoomKind, creator: Member) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            members: vec![creator],
            created_at: Utc::now(),
        }
    }

    /// Add a member unless already present. Returns true if added.
    pub fn add_member(&mut self, member: Member) -> bool {
        if self.members.iter().any(|m| m == &member) {
            return false;
        }
        self.members.push(member);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Body of a create-room request
#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl NewRoom {
    pub fn validate(&self) -> Result<(String, RoomKind), RoomError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RoomError::EmptyName);
        }
        let kind = self.kind.parse()?;
        Ok((name.to_string(), kind))
    }
}
