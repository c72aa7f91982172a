//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use roomgate::auth::Role;
use roomgate::config::ServeArgs;

#[derive(Parser)]
#[command(name = "roomgate")]
#[command(about = "Session and authorization service for chat rooms", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Signing secret for the offline token commands
#[derive(Args)]
pub struct SecretArgs {
    /// Token signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service
    ///
    /// Every flag falls back to its environment variable (JWT_SECRET,
    /// REDIS_URL, DATABASE_URL, ROOMGATE_*).
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Issue an access/refresh token pair
    ///
    /// Examples:
    ///   roomgate issue --subject 6f1c... --email alice@example.com --role admin
    Issue {
        #[command(flatten)]
        secret: SecretArgs,

        /// User ID the tokens are issued to
        #[arg(long)]
        subject: String,

        /// User email
        #[arg(long)]
        email: String,

        /// Role: admin or member
        #[arg(long, default_value = "member", value_parser = parse_role)]
        role: Role,
    },

    /// Revoke a token until it expires
    Revoke {
        #[command(flatten)]
        secret: SecretArgs,

        /// Revocation cache address (`host:port` or `redis://` URL)
        #[arg(long, env = "REDIS_URL")]
        redis_url: Option<String>,

        /// The token to revoke
        token: String,
    },

    /// Verify a token and print its claims
    Inspect {
        #[command(flatten)]
        secret: SecretArgs,

        /// The token to inspect
        token: String,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}
