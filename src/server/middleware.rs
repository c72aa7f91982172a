//! axum adapters for the session gates
//!
//! The access token travels in the `token` cookie. Each gate reads it,
//! runs the matching [`SessionGate`] check and stores the resulting
//! [`RequestIdentity`] in the request extensions before delegating.

use crate::auth::{GateError, GateStage, RequestIdentity, Role, SessionGate};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::debug;

/// Cookie carrying the access token
pub const ACCESS_COOKIE: &str = "token";

/// Cookie carrying the refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// JSON error body shared by every handler
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match &self {
            GateError::Unauthenticated => error_response(StatusCode::UNAUTHORIZED, "unauthenticated"),
            GateError::Revoked => error_response(StatusCode::UNAUTHORIZED, "token revoked"),
            GateError::InvalidCredential(_) => {
                error_response(StatusCode::UNAUTHORIZED, "invalid credential")
            }
            GateError::StoreUnavailable(_) => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
            }
            GateError::Forbidden { required, .. } => error_response(
                StatusCode::FORBIDDEN,
                format!("forbidden: {} only", required),
            ),
            GateError::Context(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

/// Attach a gate's identity to the request, merging with any identity an
/// earlier gate bound for the same request
fn bind_identity(request: &mut Request, identity: RequestIdentity) -> Result<(), GateError> {
    match request.extensions_mut().get_mut::<RequestIdentity>() {
        Some(existing) => existing.merge(identity)?,
        None => {
            request.extensions_mut().insert(identity);
        }
    }
    Ok(())
}

/// Authentication gate
pub async fn require_session(
    State(gate): State<SessionGate>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = jar.get(ACCESS_COOKIE).map(|c| c.value());
    let identity = gate.authenticate(token).await?;
    bind_identity(&mut request, identity)?;

    debug!(stage = %GateStage::Delegated, path = %request.uri().path(), "Delegating");
    Ok(next.run(request).await)
}

/// Gate state for [`require_role`]
#[derive(Clone)]
pub struct RoleGuard {
    gate: SessionGate,
    required: Role,
}

impl RoleGuard {
    pub fn new(gate: SessionGate, required: Role) -> Self {
        Self { gate, required }
    }
}

/// Authorization gate
pub async fn require_role(
    State(guard): State<RoleGuard>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = jar.get(ACCESS_COOKIE).map(|c| c.value());
    let identity = guard.gate.authorize(token, guard.required).await?;
    bind_identity(&mut request, identity)?;

    debug!(stage = %GateStage::Delegated, path = %request.uri().path(), "Delegating");
    Ok(next.run(request).await)
}

/// The identity bound by whichever gates ran on this route
#[derive(Debug, Clone)]
pub struct Identity(pub RequestIdentity);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .map(Identity)
            .ok_or(GateError::Unauthenticated)
    }
}

/// The verified subject; rejects when no gate bound one
#[derive(Debug, Clone)]
pub struct Subject(pub String);

impl<S> FromRequestParts<S> for Subject
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .and_then(|identity| identity.subject())
            .map(|subject| Subject(subject.to_string()))
            .ok_or(GateError::Unauthenticated)
    }
}
