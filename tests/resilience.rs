//! Resilience tests for Roomgate
//!
//! These tests verify behavior when the revocation cache misbehaves:
//! - Lookups that error out
//! - Lookups that never answer
//! - Revocation entries lapsing after the token itself has expired

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use roomgate::auth::{
    Claims, GateError, Role, SessionError, SessionGate, SessionService, TokenCodec, TokenKind,
};
use roomgate::server::{create_router, AppState};
use roomgate::storage::{MemoryRevocationStore, MemoryRoomStore, RevocationStore, StorageError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TEST_SECRET: &[u8] = b"test-secret-for-resilience-tests";

/// Store whose every call fails
#[derive(Default)]
struct BrokenStore {
    calls: AtomicUsize,
}

#[async_trait]
impl RevocationStore for BrokenStore {
    async fn is_revoked(&self, _token: &str) -> Result<bool, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Cache("connection reset by peer".into()))
    }

    async fn revoke(&self, _token: &str, _expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Cache("connection reset by peer".into()))
    }
}

/// Store that never answers
struct HangingStore;

#[async_trait]
impl RevocationStore for HangingStore {
    async fn is_revoked(&self, _token: &str) -> Result<bool, StorageError> {
        std::future::pending().await
    }

    async fn revoke(&self, _token: &str, _expires_at: DateTime<Utc>) -> Result<(), StorageError> {
        std::future::pending().await
    }
}

fn sessions_with(store: Arc<dyn RevocationStore>) -> SessionService {
    let codec = Arc::new(TokenCodec::new(TEST_SECRET).unwrap());
    SessionService::new(
        SessionGate::new(codec, store).with_lookup_timeout(Duration::from_millis(500)),
    )
}

fn app_with(sessions: &SessionService) -> Router {
    create_router(AppState {
        sessions: sessions.clone(),
        rooms: Arc::new(MemoryRoomStore::new()),
        secure_cookies: false,
    })
}

fn request(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name":"lobby","type":"public"}"#))
        .unwrap()
}

/// A broken cache is "service unavailable", never "revoked" and never "allowed"
#[tokio::test]
async fn test_store_failure_is_unavailable() {
    let store = Arc::new(BrokenStore::default());
    let sessions = sessions_with(store.clone());
    let app = app_with(&sessions);
    let pair = sessions.login("a1", "a1@example.com", Role::Admin).unwrap();
    let cookie = format!("token={}", pair.access_token);

    let response = app.clone().oneshot(request("GET", "/auth/me", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.clone().oneshot(request("POST", "/rooms", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Fail fast: one lookup per request, no retries
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);

    // Public routes do not touch the cache
    let response = app.oneshot(request("GET", "/rooms", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}

/// A missing token is rejected before the cache is consulted
#[tokio::test]
async fn test_missing_token_skips_store() {
    let store = Arc::new(BrokenStore::default());
    let sessions = sessions_with(store.clone());

    let response = app_with(&sessions)
        .oneshot(request("GET", "/auth/me", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_store_times_out() {
    let sessions = sessions_with(Arc::new(HangingStore));
    let pair = sessions.login("u1", "u1@example.com", Role::Member).unwrap();

    let err = sessions
        .gate()
        .authenticate(Some(&pair.access_token))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GateError::StoreUnavailable(StorageError::Timeout(t)) if t == Duration::from_millis(500)
    ));

    let response = app_with(&sessions)
        .oneshot(request("GET", "/auth/me", &format!("token={}", pair.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_logout_fails_when_store_hangs() {
    let sessions = sessions_with(Arc::new(HangingStore));
    let pair = sessions.login("u1", "u1@example.com", Role::Member).unwrap();

    let err = sessions.logout(Some(&pair.access_token), None).await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::Timeout(_))));

    let response = app_with(&sessions)
        .oneshot(request("POST", "/auth/logout", &format!("token={}", pair.access_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// Once the revocation entry for an already-expired token lapses, expiry
/// still keeps the token out
#[tokio::test(start_paused = true)]
async fn test_lapsed_revocation_still_rejects_expired_token() {
    let store = Arc::new(MemoryRevocationStore::new());
    let sessions = sessions_with(store.clone());
    let gate = sessions.gate();

    let issued = Utc::now() - ChronoDuration::hours(2);
    let claims = Claims::new(
        "u1",
        "u1@example.com",
        Role::Member,
        TokenKind::Access,
        issued,
        issued + ChronoDuration::minutes(15),
    );
    let token = gate.codec().sign(&claims).unwrap();

    sessions.revoke(&token).await.unwrap();
    assert!(matches!(gate.authenticate(Some(&token)).await, Err(GateError::Revoked)));

    tokio::time::advance(Duration::from_secs(60 * 60 + 1)).await;
    assert!(!store.is_revoked(&token).await.unwrap());

    match gate.authenticate(Some(&token)).await {
        Err(GateError::InvalidCredential(e)) => assert!(e.is_expired()),
        other => panic!("expected expired credential, got {:?}", other),
    }
}

/// A live token's revocation outlasts the one-hour floor
#[tokio::test(start_paused = true)]
async fn test_revocation_lasts_until_expiry() {
    let store = Arc::new(MemoryRevocationStore::new());
    let sessions = sessions_with(store.clone());
    let pair = sessions.login("u1", "u1@example.com", Role::Member).unwrap();

    sessions.revoke(&pair.refresh_token).await.unwrap();

    tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
    assert!(matches!(
        sessions.gate().authenticate(Some(&pair.refresh_token)).await,
        Err(GateError::Revoked)
    ));
}

/// Cache recovering between requests is picked up without restart
#[tokio::test]
async fn test_gate_uses_store_per_request() {
    struct FlakyStore {
        healthy: std::sync::atomic::AtomicBool,
        inner: MemoryRevocationStore,
    }

    #[async_trait]
    impl RevocationStore for FlakyStore {
        async fn is_revoked(&self, token: &str) -> Result<bool, StorageError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(StorageError::Cache("down".into()));
            }
            self.inner.is_revoked(token).await
        }

        async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), StorageError> {
            self.inner.revoke(token, expires_at).await
        }
    }

    let store = Arc::new(FlakyStore {
        healthy: std::sync::atomic::AtomicBool::new(false),
        inner: MemoryRevocationStore::new(),
    });
    let sessions = sessions_with(store.clone());
    let pair = sessions.login("u1", "u1@example.com", Role::Member).unwrap();

    assert!(matches!(
        sessions.gate().authenticate(Some(&pair.access_token)).await,
        Err(GateError::StoreUnavailable(_))
    ));

    store.healthy.store(true, Ordering::SeqCst);
    let identity = sessions.gate().authenticate(Some(&pair.access_token)).await.unwrap();
    assert_eq!(identity.subject(), Some("u1"));
}
