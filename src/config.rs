//! Process configuration
//!
//! Everything is read once at startup, from `serve` flags or their
//! environment fallbacks. A missing signing secret or revocation cache
//! address is fatal; nothing here is re-read per request.

use crate::auth::{
    TokenCodec, ACCESS_TOKEN_TTL, DEFAULT_LOOKUP_TIMEOUT, MAX_TOKEN_TTL, REFRESH_TOKEN_TTL,
};
use crate::storage::RedisConfig;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET is not set or empty")]
    MissingSecret,

    #[error("REDIS_URL is not set")]
    MissingRevocationStore,

    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Settings for `roomgate serve`
#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Token signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Revocation cache address (`host:port` or `redis://` URL)
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Address to bind to
    #[arg(short, long, env = "ROOMGATE_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Room store URL; rooms are kept in memory when unset
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ROOMGATE_ACCESS_TTL_SECS", default_value_t = ACCESS_TOKEN_TTL.as_secs())]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "ROOMGATE_REFRESH_TTL_SECS", default_value_t = REFRESH_TOKEN_TTL.as_secs())]
    pub refresh_ttl_secs: u64,

    /// Upper bound on a single revocation cache call, in milliseconds
    #[arg(
        long,
        env = "ROOMGATE_REVOCATION_TIMEOUT_MS",
        default_value_t = DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64
    )]
    pub revocation_timeout_ms: u64,

    /// Mark session cookies `Secure`
    #[arg(
        long,
        env = "ROOMGATE_SECURE_COOKIES",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub secure_cookies: bool,
}

/// Server settings
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub token_secret: Vec<u8>,
    pub redis: RedisConfig,
    /// Room store; in-memory when unset
    pub database_url: Option<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Upper bound on a single revocation cache call
    pub revocation_timeout: Duration,
    /// Mark session cookies `Secure`
    pub secure_cookies: bool,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("token_secret", &"[REDACTED]")
            .field("redis", &self.redis)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("revocation_timeout", &self.revocation_timeout)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

impl ServerConfig {
    /// Validate parsed `serve` settings
    pub fn from_args(args: ServeArgs) -> Result<Self, ConfigError> {
        let present = |v: Option<String>| v.filter(|v| !v.trim().is_empty());

        let token_secret = present(args.secret)
            .ok_or(ConfigError::MissingSecret)?
            .into_bytes();

        let redis = present(args.redis_url)
            .map(|addr| RedisConfig::from_address(&addr))
            .ok_or(ConfigError::MissingRevocationStore)?;

        let access_ttl = token_lifetime("ROOMGATE_ACCESS_TTL_SECS", args.access_ttl_secs)?;
        let refresh_ttl = token_lifetime("ROOMGATE_REFRESH_TTL_SECS", args.refresh_ttl_secs)?;

        if args.revocation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "ROOMGATE_REVOCATION_TIMEOUT_MS",
                value: args.revocation_timeout_ms.to_string(),
            });
        }

        Ok(Self {
            bind_addr: args.bind,
            token_secret,
            redis,
            database_url: present(args.database_url),
            access_ttl,
            refresh_ttl,
            revocation_timeout: Duration::from_millis(args.revocation_timeout_ms),
            secure_cookies: args.secure_cookies,
        })
    }

    /// Build the token codec these settings describe
    pub fn token_codec(&self) -> Result<TokenCodec, ConfigError> {
        Ok(TokenCodec::new(self.token_secret.clone())?
            .with_lifetimes(self.access_ttl, self.refresh_ttl))
    }
}

/// Token lifetimes must be at least a second and at most [`MAX_TOKEN_TTL`]
fn token_lifetime(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 || secs > MAX_TOKEN_TTL.as_secs() {
        return Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn args(flags: &[&str]) -> Result<ServeArgs, clap::Error> {
        let argv = std::iter::once("roomgate").chain(flags.iter().copied());
        TestCli::try_parse_from(argv).map(|cli| cli.serve)
    }

    fn config(flags: &[&str]) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_args(args(flags).unwrap())
    }

    const REQUIRED: [&str; 4] = ["--secret", "s3cret", "--redis-url", "redis:6379"];

    fn with_required<'a>(extra: &[&'a str]) -> Vec<&'a str> {
        REQUIRED.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn test_minimal_config() {
        let config = config(&REQUIRED).unwrap();

        assert_eq!(config.token_secret, b"s3cret");
        assert_eq!(config.redis.url, "redis://redis:6379");
        assert_eq!(config.access_ttl, ACCESS_TOKEN_TTL);
        assert_eq!(config.refresh_ttl, REFRESH_TOKEN_TTL);
        assert_eq!(config.revocation_timeout, DEFAULT_LOOKUP_TIMEOUT);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let result = config(&["--secret", "", "--redis-url", "redis:6379"]);
        assert_eq!(result.unwrap_err(), ConfigError::MissingSecret);

        let result = config(&["--secret", "  ", "--redis-url", "redis:6379"]);
        assert_eq!(result.unwrap_err(), ConfigError::MissingSecret);
    }

    #[test]
    fn test_missing_redis_is_fatal() {
        let result = config(&["--secret", "s3cret", "--redis-url", ""]);
        assert_eq!(result.unwrap_err(), ConfigError::MissingRevocationStore);
    }

    #[test]
    fn test_overrides() {
        let config = config(&with_required(&[
            "--database-url",
            "postgres://chat@db/mychat",
            "--bind",
            "127.0.0.1:8080",
            "--access-ttl-secs",
            "60",
            "--refresh-ttl-secs",
            "3600",
            "--revocation-timeout-ms",
            "250",
            "--secure-cookies",
            "yes",
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_url.as_deref(), Some("postgres://chat@db/mychat"));
        assert_eq!(config.access_ttl, Duration::from_secs(60));
        assert_eq!(config.refresh_ttl, Duration::from_secs(3600));
        assert_eq!(config.revocation_timeout, Duration::from_millis(250));
        assert!(config.secure_cookies);

        let codec = config.token_codec().unwrap();
        assert_eq!(codec.access_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_unparseable_values_rejected() {
        for extra in [
            ["--bind", "not-an-addr"],
            ["--refresh-ttl-secs", "soon"],
            ["--revocation-timeout-ms", "-5"],
            ["--secure-cookies", "maybe"],
        ] {
            assert!(args(&with_required(&extra)).is_err(), "{:?} should not parse", extra);
        }
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for (flag, value, name) in [
            ("--access-ttl-secs", "0", "ROOMGATE_ACCESS_TTL_SECS"),
            ("--refresh-ttl-secs", "10000000000000", "ROOMGATE_REFRESH_TTL_SECS"),
            ("--revocation-timeout-ms", "0", "ROOMGATE_REVOCATION_TIMEOUT_MS"),
        ] {
            match config(&with_required(&[flag, value])) {
                Err(ConfigError::Invalid { name: got, value: v }) => {
                    assert_eq!(got, name);
                    assert_eq!(v, value);
                }
                other => panic!("expected invalid {}, got {:?}", name, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_longest_lifetime_still_issues() {
        let max = MAX_TOKEN_TTL.as_secs().to_string();
        let config = config(&with_required(&["--refresh-ttl-secs", max.as_str()])).unwrap();

        let pair = config
            .token_codec()
            .unwrap()
            .issue("u1", "u1@example.com", Role::Member)
            .unwrap();
        assert!(pair.refresh_expires_at > pair.access_expires_at);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = config(&REQUIRED).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
