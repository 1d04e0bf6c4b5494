//! JSON API for the permit workflow.
//!
//! Exposes the species catalog, the filing-to-closure lifecycle, and the
//! stateless compensation calculator over HTTP. Designed for the citizen
//! portal frontend and for scripted intake.

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::store::Store;

/// All handlers share one store behind an async mutex; SQLite writes are
/// serialized anyway, so a single connection is enough here.
pub type SharedStore = Arc<Mutex<Store>>;

pub fn create_router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/species", get(routes::list_species))
        .route("/api/species/{name}", get(routes::get_species))
        .route(
            "/api/permits",
            get(routes::list_permits).post(routes::file_permit),
        )
        .route("/api/permits/{id}", get(routes::get_permit))
        .route("/api/permits/{id}/visit", post(routes::record_visit))
        .route("/api/permits/{id}/decision", post(routes::record_decision))
        .route("/api/permits/{id}/close", post(routes::close_permit))
        .route("/api/permits/{id}/documents", post(routes::attach_documents))
        .route("/api/compensation", post(routes::compute_compensation))
        .with_state(store)
}

/// Bind and serve until ctrl-c.
pub async fn serve(store: Store, addr: SocketAddr) -> Result<()> {
    let app = create_router(Arc::new(Mutex::new(store)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
