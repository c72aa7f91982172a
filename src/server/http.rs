//! HTTP server: router assembly and the serve loop

use crate::auth::{Role, SessionService};
use crate::server::handlers;
use crate::server::middleware::{require_role, require_session, RoleGuard};
use crate::storage::RoomStore;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub rooms: Arc<dyn RoomStore>,
    pub secure_cookies: bool,
}

/// Build the HTTP router.
///
/// Gates are attached per route: `/rooms` listing and message history are
/// public, joining needs a session, creating a room needs the admin role.
pub fn create_router(state: AppState) -> Router {
    let gate = state.sessions.gate().clone();
    let session = from_fn_with_state(gate.clone(), require_session);
    let admin = from_fn_with_state(RoleGuard::new(gate, Role::Admin), require_role);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/rooms",
            get(handlers::list_rooms).merge(post(handlers::create_room).route_layer(admin)),
        )
        .route(
            "/rooms/{id}/join",
            post(handlers::join_room).route_layer(session.clone()),
        )
        .route("/rooms/{id}/messages", get(handlers::list_messages))
        .route("/auth/me", get(handlers::whoami).route_layer(session))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .with_state(state)
}

/// The HTTP service
pub struct RoomgateServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl RoomgateServer {
    pub fn new(bind_addr: SocketAddr, state: AppState) -> Self {
        Self { bind_addr, state }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        let app = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Roomgate listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Roomgate stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
