use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Secret Router Module
///
/// Read-only views for members of the `Secret` group. Every handler here extracts
/// `Authorized<SecretTier>`; Supervisor membership alone is not enough.
pub fn secret_routes() -> Router<AppState> {
    Router::new()
        // GET /api/secret
        // Flat list of every secret message. No by-id lookup at this tier.
        .route("/api/secret", get(handlers::list_secrets))
        // GET /api/tasks
        // Every task, so members can follow progress without being able to change it.
        .route("/api/tasks", get(handlers::list_tasks))
        // GET /api/tasks/{id}
        .route("/api/tasks/{id}", get(handlers::get_task))
}
