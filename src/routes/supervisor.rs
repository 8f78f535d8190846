use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Supervisor Router Module
///
/// Full lifecycle over both collections for members of the `Supervisor` group. These
/// views share the underlying stores with the Secret tier; only the gate differs.
pub fn supervisor_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /api/tasks/supervisor
        .route(
            "/api/tasks/supervisor",
            get(handlers::supervisor_list_tasks).post(handlers::supervisor_create_task),
        )
        // GET/PUT/PATCH/DELETE /api/tasks/supervisor/{id}
        // PUT and PATCH both perform a partial merge.
        .route(
            "/api/tasks/supervisor/{id}",
            get(handlers::supervisor_get_task)
                .put(handlers::supervisor_update_task)
                .patch(handlers::supervisor_update_task)
                .delete(handlers::supervisor_delete_task),
        )
        // GET/POST /api/secret/supervisor
        .route(
            "/api/secret/supervisor",
            get(handlers::supervisor_list_secrets).post(handlers::supervisor_create_secret),
        )
        // GET/PUT/PATCH/DELETE /api/secret/supervisor/{id}
        .route(
            "/api/secret/supervisor/{id}",
            get(handlers::supervisor_get_secret)
                .put(handlers::supervisor_update_secret)
                .patch(handlers::supervisor_update_secret)
                .delete(handlers::supervisor_delete_secret),
        )
}
