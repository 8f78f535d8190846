use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use tower::{Layer, ServiceBuilder};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod policy;
pub mod repository;

// Routing split by required access (public, authenticated, secret, supervisor).
pub mod routes;
use routes::{authenticated, public, secret, supervisor};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use memory::{InMemoryDirectory, InMemoryStore};
pub use repository::{DirectoryState, PostgresRepository, SecretStore, TaskStore};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and schema into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::who_am_i,
        handlers::list_tasks, handlers::get_task,
        handlers::supervisor_list_tasks, handlers::supervisor_create_task,
        handlers::supervisor_get_task, handlers::supervisor_update_task,
        handlers::supervisor_delete_task,
        handlers::list_secrets,
        handlers::supervisor_list_secrets, handlers::supervisor_create_secret,
        handlers::supervisor_get_secret, handlers::supervisor_update_secret,
        handlers::supervisor_delete_secret,
    ),
    components(
        schemas(
            models::Task, models::SecretLevelData, models::CreateTaskRequest,
            models::UpdateTaskRequest, models::CreateSecretRequest, models::UpdateSecretRequest,
            models::UserPermissions, error::ErrorBody, error::ValidationErrors,
        )
    ),
    tags(
        (name = "secure-tasker", description = "Role-gated task and secret message API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Immutable bundle of every service a request may need. Cloning is cheap (each field
/// is an `Arc` or small config), and no field holds per-request state.
#[derive(Clone)]
pub struct AppState {
    /// Task collection, shared by the Secret and Supervisor tiers.
    pub tasks: TaskStore,
    /// Secret message collection, shared by both tiers.
    pub secrets: SecretStore,
    /// Identity directory consulted by the principal resolver on every request.
    pub directory: DirectoryState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for TaskStore {
    fn from_ref(app_state: &AppState) -> TaskStore {
        app_state.tasks.clone()
    }
}

impl FromRef<AppState> for SecretStore {
    fn from_ref(app_state: &AppState) -> SecretStore {
        app_state.secrets.clone()
    }
}

impl FromRef<AppState> for DirectoryState {
    fn from_ref(app_state: &AppState) -> DirectoryState {
        app_state.directory.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route group, the Swagger UI and the observability layers.
/// Access control is enforced per handler by its extractor, not by layers, so every
/// route group can be merged flat.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .merge(secret::secret_routes())
        .merge(supervisor::supervisor_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Unique id for every request, echoed back to the client.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// create_app
///
/// The router wrapped so that `/api/tasks/` and `/api/tasks` reach the same handler.
/// Path normalization has to run before routing, hence outside the `Router`.
pub fn create_app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(create_router(state))
}

/// trace_span_logger
///
/// Opens the per-request span with method, URI and the `x-request-id` so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
