//! Stress tests for concurrent sessions
//!
//! These tests verify gates and revocation under concurrent load and that
//! lookups don't degrade as the revocation cache grows.

use roomgate::auth::{GateError, Role, SessionGate, SessionService, TokenCodec};
use roomgate::storage::{MemoryRevocationStore, RevocationStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TEST_SECRET: &[u8] = b"test-secret-for-stress-tests";

fn sessions() -> (SessionService, Arc<MemoryRevocationStore>) {
    let store = Arc::new(MemoryRevocationStore::new());
    let codec = Arc::new(TokenCodec::new(TEST_SECRET).unwrap());
    (SessionService::new(SessionGate::new(codec, store.clone())), store)
}

/// Half the sessions are logged out while all of them are validated concurrently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_validate_and_revoke() {
    let (sessions, _) = sessions();

    let pairs: Vec<_> = (0..200)
        .map(|i| {
            sessions
                .login(&format!("user-{}", i), &format!("user-{}@example.com", i), Role::Member)
                .unwrap()
        })
        .collect();

    let mut handles = vec![];
    for (i, pair) in pairs.iter().enumerate() {
        let sessions = sessions.clone();
        let token = pair.access_token.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                sessions.logout(Some(&token), None).await.unwrap();
            } else {
                for _ in 0..10 {
                    sessions.gate().authenticate(Some(&token)).await.unwrap();
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    for (i, pair) in pairs.iter().enumerate() {
        let result = sessions.gate().authenticate(Some(&pair.access_token)).await;
        if i % 2 == 0 {
            assert!(matches!(result, Err(GateError::Revoked)), "session {} should be revoked", i);
        } else {
            let identity = result.unwrap();
            assert_eq!(identity.subject(), Some(format!("user-{}", i).as_str()));
        }
    }
}

/// Concurrent refreshes of the same token: some succeed, and the original is
/// dead once they have all finished
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_of_one_token() {
    let (sessions, _) = sessions();
    let pair = sessions.login("u1", "u1@example.com", Role::Member).unwrap();

    let mut handles = vec![];
    for _ in 0..20 {
        let sessions = sessions.clone();
        let token = pair.refresh_token.clone();
        handles.push(tokio::spawn(async move { sessions.refresh(Some(&token)).await.is_ok() }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }
    assert!(succeeded >= 1);

    assert!(sessions.refresh(Some(&pair.refresh_token)).await.is_err());
}

/// Lookup cost stays flat as the number of revoked tokens grows
#[tokio::test]
async fn test_revocation_lookup_not_linear() {
    let sizes = [1_000, 10_000, 100_000];
    let mut times = vec![];
    let expires_at = chrono::Utc::now() + chrono::Duration::minutes(15);

    for &size in &sizes {
        let store = MemoryRevocationStore::new();
        for i in 0..size {
            store.revoke(&format!("token-{}", i), expires_at).await.unwrap();
        }

        let iterations = 10_000;
        let start = Instant::now();
        for i in 0..iterations {
            let revoked = store.is_revoked(&format!("token-{}", i % size)).await.unwrap();
            assert!(revoked);
        }
        let elapsed = start.elapsed();
        let per_lookup_ns = elapsed.as_nanos() / iterations as u128;
        times.push((size, per_lookup_ns));

        println!(
            "Entries: {:>6}, Lookups: {}, Time: {:?}, Per lookup: {}ns",
            size, iterations, elapsed, per_lookup_ns
        );
    }

    let (_, smallest) = times[0];
    let (_, largest) = times[times.len() - 1];
    // 100x the entries; allow generous slack for cache effects
    assert!(
        largest < smallest.max(1) * 20,
        "lookup time grew from {}ns to {}ns",
        smallest,
        largest
    );
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired_at_scale() {
    let store = MemoryRevocationStore::new();
    let now = chrono::Utc::now();

    // Floor TTL entries
    for i in 0..5_000 {
        store.revoke(&format!("short-{}", i), now).await.unwrap();
    }
    // Week-long entries
    for i in 0..5_000 {
        store
            .revoke(&format!("long-{}", i), now + chrono::Duration::days(7))
            .await
            .unwrap();
    }
    assert_eq!(store.len(), 10_000);

    tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;

    assert_eq!(store.purge_expired(), 5_000);
    assert_eq!(store.len(), 5_000);
    assert!(store.is_revoked("long-42").await.unwrap());
    assert!(!store.is_revoked("short-42").await.unwrap());
}
