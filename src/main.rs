//! Roomgate CLI entry point

mod cli;

use crate::cli::{Cli, Commands, SecretArgs};
use anyhow::{Context, Result};
use clap::Parser;
use roomgate::auth::{Role, SessionGate, SessionService, TokenCodec};
use roomgate::config::{ServeArgs, ServerConfig};
use roomgate::server::{AppState, RoomgateServer};
use roomgate::storage::{
    MemoryRoomStore, PostgresConfig, PostgresRoomStore, RedisConfig, RedisRevocationStore,
    RoomStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Serve { args } => serve(args).await,
        Commands::Issue { secret, subject, email, role } => issue(&secret, &subject, &email, role),
        Commands::Revoke { secret, redis_url, token } => {
            revoke(&secret, redis_url.as_deref(), &token).await
        }
        Commands::Inspect { secret, token } => inspect(&secret, &token),
    }
}

/// Codec for the offline token commands
fn codec(secret: &SecretArgs) -> Result<TokenCodec> {
    TokenCodec::new(secret.secret.clone().unwrap_or_default()).context("Token signing secret")
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::from_args(args).context("Invalid configuration")?;

    let codec = Arc::new(config.token_codec()?);

    let revocations = RedisRevocationStore::connect(&config.redis)
        .await
        .context("Failed to connect to revocation cache")?;

    let rooms: Arc<dyn RoomStore> = match &config.database_url {
        Some(url) => {
            let db_config = PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?;
            Arc::new(
                PostgresRoomStore::new(db_config)
                    .await
                    .context("Failed to open room store")?,
            )
        }
        None => {
            warn!("DATABASE_URL not set, rooms are kept in memory and lost on restart");
            Arc::new(MemoryRoomStore::new())
        }
    };

    let gate = SessionGate::new(codec, Arc::new(revocations))
        .with_lookup_timeout(config.revocation_timeout);

    let state = AppState {
        sessions: SessionService::new(gate),
        rooms,
        secure_cookies: config.secure_cookies,
    };

    info!(
        addr = %config.bind_addr,
        access_ttl = ?config.access_ttl,
        refresh_ttl = ?config.refresh_ttl,
        "Roomgate starting"
    );

    RoomgateServer::new(config.bind_addr, state).run().await
}

fn issue(secret: &SecretArgs, subject: &str, email: &str, role: Role) -> Result<()> {
    let pair = SessionService::offline(codec(secret)?).login(subject, email, role)?;

    println!("{}", serde_json::to_string_pretty(&pair)?);
    Ok(())
}

async fn revoke(secret: &SecretArgs, redis_url: Option<&str>, token: &str) -> Result<()> {
    let address = redis_url.context("REDIS_URL not set")?;

    let store = RedisRevocationStore::connect(&RedisConfig::from_address(address))
        .await
        .context("Failed to connect to revocation cache")?;

    let sessions =
        SessionService::new(SessionGate::new(Arc::new(codec(secret)?), Arc::new(store)));
    let expires_at = sessions.revoke(token).await?;

    println!("Token revoked (expires {})", expires_at.to_rfc3339());
    Ok(())
}

fn inspect(secret: &SecretArgs, token: &str) -> Result<()> {
    match codec(secret)?.parse_and_verify(token) {
        Ok(claims) => {
            println!("{}", serde_json::to_string_pretty(&claims)?);
            println!("Issued:  {}", claims.issued_at().to_rfc3339());
            println!("Expires: {}", claims.expires_at().to_rfc3339());
            Ok(())
        }
        Err(e) => anyhow::bail!("Token rejected: {}", e),
    }
}
