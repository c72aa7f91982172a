//! HTTP handlers for sessions and rooms

use crate::auth::{GateError, SessionError, TokenPair};
use crate::rooms::{Message, NewRoom, Room, RoomError};
use crate::server::http::AppState;
use crate::server::middleware::{error_response, Identity, Subject, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::storage::StorageError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Handler-level failures
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RoomError> for ApiError {
    fn from(e: RoomError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        match self {
            SessionError::Gate(e) => e.into_response(),
            SessionError::WrongTokenKind { .. } => {
                error_response(StatusCode::UNAUTHORIZED, "invalid credential")
            }
            SessionError::Storage(e) => {
                error!(error = %e, "Revocation write failed");
                error_response(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
            }
            SessionError::Issue(e) => {
                error!(error = %e, "Token issue failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => error_response(StatusCode::CONFLICT, msg),
            ApiError::Gate(e) => e.into_response(),
            ApiError::Session(e) => e.into_response(),
            ApiError::Storage(e) => {
                error!(error = %e, "Room store call failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

/// Session cookie carrying `value` until `expires_at`
fn session_cookie(
    name: &'static str,
    value: String,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .expires(expires)
        .build()
}

/// Put a freshly issued pair into the jar
pub fn set_session_cookies(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        pair.access_expires_at,
        secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        pair.refresh_expires_at,
        secure,
    ))
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid {} id", what)))
}

/// The subject of a verified token is a user ID; anything else cannot act on rooms
fn subject_id(subject: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(subject).map_err(|_| {
        warn!(subject, "Token subject is not a user id");
        ApiError::Gate(GateError::Unauthenticated)
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, ApiError> {
    let rooms = state.rooms.list_rooms().await?;
    Ok(Json(rooms))
}

/// Create a room. Admin only; the creator becomes the first member.
pub async fn create_room(
    State(state): State<AppState>,
    Subject(subject): Subject,
    payload: Result<Json<NewRoom>, JsonRejection>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let Json(new_room) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (name, kind) = new_room.validate()?;

    if state.rooms.count_rooms_named(&name).await? > 0 {
        return Err(ApiError::Conflict(format!("room '{}' already exists", name)));
    }

    let creator = state
        .rooms
        .find_user(subject_id(&subject)?)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    let room = Room::create(name, kind, creator.to_member());
    state.rooms.insert_room(&room).await?;

    info!(room_id = %room.id, name = %room.name, kind = %room.kind, creator = %creator.id, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn join_room(
    State(state): State<AppState>,
    Subject(subject): Subject,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let room_id = parse_id(&room_id, "room")?;

    let user = state
        .rooms
        .find_user(subject_id(&subject)?)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    if !state.rooms.add_member(room_id, &user.to_member()).await? {
        return Err(ApiError::NotFound("Room not found"));
    }

    info!(%room_id, user_id = %user.id, "Joined room");
    Ok(Json(json!({ "message": "Joined room" })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room_id = parse_id(&room_id, "room")?;
    let messages = state.rooms.list_messages(room_id).await?;
    Ok(Json(messages))
}

/// Echo the identity the session gate bound
pub async fn whoami(Identity(identity): Identity) -> Json<Value> {
    Json(json!({
        "subject": identity.subject(),
        "role": identity.role(),
    }))
}

/// Rotate the refresh token and hand back a new pair
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<TokenPair>), ApiError> {
    let presented = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    let pair = state.sessions.refresh(presented.as_deref()).await?;

    let jar = set_session_cookies(jar, &pair, state.secure_cookies);
    Ok((jar, Json(pair)))
}

/// Revoke both session tokens and clear their cookies
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let access = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    state
        .sessions
        .logout(access.as_deref(), refresh.as_deref())
        .await?;

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((jar, Json(json!({ "message": "Logged out" }))))
}
