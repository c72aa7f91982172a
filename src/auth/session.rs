//! Login, logout and refresh entry points

use crate::auth::claims::{Role, TokenKind};
use crate::auth::gate::{fingerprint, GateError, SessionGate};
use crate::auth::tokens::{TokenError, TokenPair};
use crate::auth::tokens::TokenCodec;
use crate::storage::{MemoryRevocationStore, StorageError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("token issue failed: {0}")]
    Issue(#[from] TokenError),

    #[error("revocation store unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("expected a {expected} token, got a {actual} token")]
    WrongTokenKind { expected: TokenKind, actual: TokenKind },
}

/// Issues and ends sessions. Shares its codec and revocation cache with the gate.
#[derive(Clone)]
pub struct SessionService {
    gate: SessionGate,
}

impl SessionService {
    pub fn new(gate: SessionGate) -> Self {
        Self { gate }
    }

    /// Sessions backed by a process-local revocation cache, for tooling
    /// that only mints or inspects tokens
    pub fn offline(codec: TokenCodec) -> Self {
        Self::new(SessionGate::new(
            Arc::new(codec),
            Arc::new(MemoryRevocationStore::new()),
        ))
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Issue a token pair for an already-verified user
    pub fn login(&self, subject: &str, email: &str, role: Role) -> Result<TokenPair, SessionError> {
        let pair = self.gate.codec().issue(subject, email, role)?;
        info!(subject = subject, role = %role, "Issued session");
        Ok(pair)
    }

    /// Revoke a single token until its expiry.
    ///
    /// The expiry comes from the verified claims; a token that cannot be
    /// verified is revoked with the minimum TTL.
    pub async fn revoke(&self, token: &str) -> Result<DateTime<Utc>, SessionError> {
        let expires_at = match self.gate.codec().parse_and_verify(token) {
            Ok(claims) => claims.expires_at(),
            Err(e) => {
                debug!(token = %fingerprint(Some(token)), error = %e, "Revoking unverifiable token");
                Utc::now()
            }
        };

        self.gate
            .bounded(self.gate.revocations().revoke(token, expires_at))
            .await?;

        debug!(token = %fingerprint(Some(token)), %expires_at, "Revoked token");
        Ok(expires_at)
    }

    /// Revoke whichever of the access and refresh tokens were presented.
    /// Returns how many tokens were revoked.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<usize, SessionError> {
        let mut revoked = 0;
        for token in [access_token, refresh_token].into_iter().flatten() {
            if token.is_empty() {
                continue;
            }
            self.revoke(token).await?;
            revoked += 1;
        }

        info!(revoked, "Session logged out");
        Ok(revoked)
    }

    /// Exchange a refresh token for a fresh pair. The presented refresh token
    /// is revoked so it cannot be replayed.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenPair, SessionError> {
        let claims = self.gate.verify(refresh_token).await?;

        if claims.kind != TokenKind::Refresh {
            return Err(SessionError::WrongTokenKind {
                expected: TokenKind::Refresh,
                actual: claims.kind,
            });
        }

        if let Some(token) = refresh_token {
            self.gate
                .bounded(self.gate.revocations().revoke(token, claims.expires_at()))
                .await?;
        }

        let pair = self.gate.codec().issue(&claims.sub, &claims.email, claims.role)?;
        info!(subject = %claims.sub, role = %claims.role, "Refreshed session");
        Ok(pair)
    }
}
