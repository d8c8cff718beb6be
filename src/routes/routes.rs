//! Routes for the remoteStorage surface.
//!
//! ## Structure
//! - **Storage endpoints** (the protocol surface)
//!   - `GET    /storage/{*path}` — document body or folder listing
//!   - `HEAD   /storage/{*path}` — headers only
//!   - `PUT    /storage/{*path}` — store a document
//!   - `DELETE /storage/{*path}` — remove a document
//!
//! - **Service endpoints**
//!   - `GET /usage/{user}` — human-readable tree size (display only)
//!   - `GET /healthz`, `GET /readyz`
//!
//! The wildcard `{*path}` carries the whole storage address, trailing
//! slash included — that slash is what distinguishes folder requests from
//! document requests.

use axum::{Router, routing::get};

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        storage_handlers::{delete_storage, get_storage, get_usage, head_storage, put_storage},
    },
    services::storage::RemoteStorage,
};

/// Build and return the router for the full HTTP surface.
///
/// The router carries shared state (`RemoteStorage`) to all handlers.
pub fn routes() -> Router<RemoteStorage> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // display-only usage endpoint
        .route("/usage/{user}", get(get_usage))
        // the protocol surface
        .route(
            "/storage/{*path}",
            get(get_storage)
                .head(head_storage)
                .put(put_storage)
                .delete(delete_storage),
        )
}
