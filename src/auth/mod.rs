//! Authentication and authorization
//!
//! - `tokens`: HS256-signed access/refresh tokens
//! - `gate`: per-request authentication and role checks
//! - `context`: verified identity handed to handlers
//! - `session`: login, logout and refresh
//!
//! Revocation entries live in a [`RevocationStore`](crate::storage::RevocationStore).

mod claims;
mod context;
mod gate;
mod session;
mod tokens;

pub use claims::{Claims, Role, TokenKind};
pub use context::{ContextError, ContextKey, ContextValue, RequestIdentity};
pub use gate::{GateError, GateStage, SessionGate, DEFAULT_LOOKUP_TIMEOUT};
pub use session::{SessionError, SessionService};
pub use tokens::{
    TokenCodec, TokenError, TokenPair, ACCESS_TOKEN_TTL, MAX_TOKEN_TTL, REFRESH_TOKEN_TTL,
    SIGNING_ALGORITHM,
};
