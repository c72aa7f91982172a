//! Token signing and verification
//!
//! Tokens are compact JWS strings: `header.payload.signature`, each segment
//! base64url without padding. Only HS256 is accepted; the signature covers
//! the two encoded segments joined by a dot.

use crate::auth::claims::{Claims, Role, TokenKind};
use crate::config::ConfigError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The only signing algorithm this codec produces or accepts
pub const SIGNING_ALGORITHM: &str = "HS256";

/// Default lifetime of an access token
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Default lifetime of a refresh token
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest lifetime a configured token may have
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token encode error: {0}")]
    Encode(String),
}

impl TokenError {
    /// Expired tokens are rejected like invalid ones but reported separately
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// The two tokens handed out on login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Issues and verifies signed session tokens with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec. An empty secret is a startup error.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Self {
            secret,
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
        })
    }

    /// Override the access/refresh lifetimes
    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access/refresh pair for a subject
    pub fn issue(&self, subject: &str, email: &str, role: Role) -> Result<TokenPair, TokenError> {
        self.issue_at(subject, email, role, Utc::now())
    }

    /// Issue a pair as if the current time were `now`
    pub fn issue_at(
        &self,
        subject: &str,
        email: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let access_expires_at = expiry_after(now, self.access_ttl)?;
        let refresh_expires_at = expiry_after(now, self.refresh_ttl)?;

        let access = Claims::new(subject, email, role, TokenKind::Access, now, access_expires_at);
        let refresh = Claims::new(subject, email, role, TokenKind::Refresh, now, refresh_expires_at);

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Sign an arbitrary claim set
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header {
            alg: SIGNING_ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::Encode(e.to_string()))?;
        let payload_json =
            serde_json::to_vec(claims).map_err(|e| TokenError::Encode(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );

        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Parse a token, verify its signature and check it has not expired
    pub fn parse_and_verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Same as [`parse_and_verify`](Self::parse_and_verify) against a fixed clock
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, got {}",
                parts.len()
            )));
        }

        let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| TokenError::Malformed(format!("header: {}", e)))?;
        let header: Header = serde_json::from_slice(&header_json)
            .map_err(|e| TokenError::Malformed(format!("header: {}", e)))?;

        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;

        // Signature is checked over the encoded segments before the payload is trusted
        let mut mac = self.mac();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::Malformed(format!("payload: {}", e)))?;
        let claims: Claims = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::Malformed(format!("payload: {}", e)))?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, TokenError> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| TokenError::Encode(format!("token lifetime {:?} is out of range", ttl)))
}
