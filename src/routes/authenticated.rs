use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Endpoints that only need a verified `Principal`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /api/secret/user-permissions
        // Username plus current Secret/Supervisor membership, for client-side view selection.
        .route("/api/secret/user-permissions", get(handlers::who_am_i))
}
