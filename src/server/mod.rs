//! Roomgate HTTP surface
//!
//! Cookie-carried sessions, the gate middleware and the room routes.

pub mod handlers;
mod http;
pub mod middleware;

pub use http::{create_router, AppState, RoomgateServer};
pub use middleware::{Identity, RoleGuard, Subject, ACCESS_COOKIE, REFRESH_COOKIE};
