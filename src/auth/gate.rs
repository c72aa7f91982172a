//! Authentication and authorization gates
//!
//! A gate walks one request through
//! `Start -> TokenExtracted -> RevocationChecked -> SignatureVerified -> ContextBound`
//! and either hands back the bound identity or rejects at the stage it
//! reached. Gates know nothing about the transport beyond the token string.
//!
//! Revocation lookups are fail-fast: one attempt, bounded by the lookup
//! timeout. A failed or timed-out lookup is `StoreUnavailable`, never
//! "not revoked". A token revoked while its own validation is in flight may
//! pass that one validation.

use crate::auth::claims::{Claims, Role};
use crate::auth::context::{ContextError, RequestIdentity};
use crate::auth::tokens::{TokenCodec, TokenError};
use crate::storage::{RevocationStore, StorageError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default bound on a revocation cache call
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Progress of a request through a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Start,
    TokenExtracted,
    RevocationChecked,
    SignatureVerified,
    ContextBound,
    Delegated,
}

impl fmt::Display for GateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateStage::Start => "start",
            GateStage::TokenExtracted => "token_extracted",
            GateStage::RevocationChecked => "revocation_checked",
            GateStage::SignatureVerified => "signature_verified",
            GateStage::ContextBound => "context_bound",
            GateStage::Delegated => "delegated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("token revoked")]
    Revoked,

    #[error("invalid credential: {0}")]
    InvalidCredential(#[source] TokenError),

    #[error("service unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    #[error("forbidden: requires role '{required}', token carries '{actual}'")]
    Forbidden { required: Role, actual: Role },

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl GateError {
    /// Last stage the request completed before being rejected
    pub fn stage(&self) -> GateStage {
        match self {
            GateError::Unauthenticated => GateStage::Start,
            GateError::Revoked | GateError::StoreUnavailable(_) => GateStage::TokenExtracted,
            GateError::InvalidCredential(_) => GateStage::RevocationChecked,
            GateError::Forbidden { .. } | GateError::Context(_) => GateStage::SignatureVerified,
        }
    }

    /// True for rejections that mean "log in again"
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            GateError::Unauthenticated | GateError::Revoked | GateError::InvalidCredential(_)
        )
    }
}

/// Checks presented tokens against the revocation cache and the codec
#[derive(Clone)]
pub struct SessionGate {
    codec: Arc<TokenCodec>,
    revocations: Arc<dyn RevocationStore>,
    lookup_timeout: Duration,
}

impl SessionGate {
    pub fn new(codec: Arc<TokenCodec>, revocations: Arc<dyn RevocationStore>) -> Self {
        Self {
            codec,
            revocations,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.revocations
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    /// Run a revocation cache call under the lookup timeout
    pub(crate) async fn bounded<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.lookup_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.lookup_timeout)),
        }
    }

    /// Verify a presented token and return its claims.
    ///
    /// Access and refresh tokens both pass: a refresh token is a valid
    /// credential for `authenticate` and `authorize` too. The token kind is
    /// only enforced by [`SessionService::refresh`](crate::auth::SessionService::refresh).
    pub async fn verify(&self, token: Option<&str>) -> Result<Claims, GateError> {
        let result = self.verify_inner(token).await;
        if let Err(e) = &result {
            log_rejection(e, token);
        }
        result
    }

    async fn verify_inner(&self, token: Option<&str>) -> Result<Claims, GateError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(GateError::Unauthenticated),
        };

        let revoked = self
            .bounded(self.revocations.is_revoked(token))
            .await
            .map_err(GateError::StoreUnavailable)?;
        if revoked {
            return Err(GateError::Revoked);
        }

        self.codec
            .parse_and_verify(token)
            .map_err(GateError::InvalidCredential)
    }

    /// Authentication gate: binds the subject
    pub async fn authenticate(&self, token: Option<&str>) -> Result<RequestIdentity, GateError> {
        let claims = self.verify(token).await?;

        let mut identity = RequestIdentity::new();
        identity.bind_subject(claims.sub)?;

        debug!(stage = %GateStage::ContextBound, "Session authenticated");
        Ok(identity)
    }

    /// Authorization gate: verifies independently, requires `required`,
    /// binds subject and role
    pub async fn authorize(
        &self,
        token: Option<&str>,
        required: Role,
    ) -> Result<RequestIdentity, GateError> {
        let claims = self.verify(token).await?;

        if claims.role != required {
            let err = GateError::Forbidden {
                required,
                actual: claims.role,
            };
            log_rejection(&err, token);
            return Err(err);
        }

        let mut identity = RequestIdentity::new();
        identity.bind_subject(claims.sub)?;
        identity.bind_role(claims.role)?;

        debug!(stage = %GateStage::ContextBound, role = %required, "Session authorized");
        Ok(identity)
    }
}

/// Last few characters of a token, enough to correlate log lines
pub(crate) fn fingerprint(token: Option<&str>) -> String {
    match token {
        Some(t) if !t.is_empty() => {
            let skip = t.chars().count().saturating_sub(8);
            format!("...{}", t.chars().skip(skip).collect::<String>())
        }
        _ => "<none>".to_string(),
    }
}

fn log_rejection(err: &GateError, token: Option<&str>) {
    let stage = err.stage();
    let token = fingerprint(token);

    match err {
        GateError::Unauthenticated => {
            debug!(%stage, "Rejected request without credential");
        }
        GateError::Revoked => {
            warn!(%stage, %token, "Rejected revoked token");
        }
        GateError::InvalidCredential(e) if e.is_expired() => {
            debug!(%stage, %token, "Rejected expired token");
        }
        GateError::InvalidCredential(e) => {
            warn!(%stage, %token, error = %e, "Rejected invalid token");
        }
        GateError::StoreUnavailable(e) => {
            error!(%stage, %token, error = %e, "Revocation lookup failed");
        }
        GateError::Forbidden { required, actual } => {
            warn!(%stage, %token, %required, %actual, "Rejected token lacking role");
        }
        GateError::Context(e) => {
            error!(%stage, error = %e, "Identity binding failed");
        }
    }
}
