//! Roomgate - session and authorization core for a multi-room chat service
//!
//! Issues short-lived access tokens and long-lived refresh tokens, checks
//! them on every protected request and revokes them ahead of expiry through
//! a shared revocation cache.

pub mod auth;
pub mod config;
pub mod rooms;
pub mod server;
pub mod storage;

pub use auth::{Claims, GateError, RequestIdentity, Role, SessionGate, SessionService, TokenCodec};
pub use config::{ConfigError, ServeArgs, ServerConfig};
pub use server::{AppState, RoomgateServer};
