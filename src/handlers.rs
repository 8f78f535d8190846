use crate::{
    AppState,
    auth::{Authorized, Principal},
    error::{ApiError, ErrorBody},
    models::{
        CreateSecretRequest, CreateTaskRequest, SecretLevelData, Task, UpdateSecretRequest,
        UpdateTaskRequest, UserPermissions,
    },
    policy::{Capability, SecretTier, SupervisorTier},
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

// --- Identity ---

/// who_am_i
///
/// [Authenticated Route] Reports the caller's username and current group-derived access,
/// so a client can decide which views to show. Requires authentication only.
#[utoipa::path(
    get,
    path = "/api/secret/user-permissions",
    responses(
        (status = 200, description = "Caller identity", body = UserPermissions),
        (status = 401, description = "No valid credential", body = ErrorBody)
    )
)]
pub async fn who_am_i(principal: Principal) -> Json<UserPermissions> {
    Json(UserPermissions {
        has_secret_access: principal.has(Capability::SecretMember),
        is_supervisor: principal.has(Capability::Supervisor),
        username: principal.username,
    })
}

// --- Tasks: general tier ---

/// list_tasks
///
/// [Secret Route] Read-only feed of every task for Secret-group members.
#[utoipa::path(
    get,
    path = "/api/tasks",
    responses(
        (status = 200, description = "All tasks", body = [Task]),
        (status = 401, description = "No valid credential", body = ErrorBody),
        (status = 403, description = "Not in the Secret group", body = ErrorBody)
    )
)]
pub async fn list_tasks(
    _access: Authorized<SecretTier>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_all().await?))
}

/// get_task
///
/// [Secret Route] Single task by id. Read-only.
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Found", body = Task),
        (status = 404, description = "No such task", body = ErrorBody)
    )
)]
pub async fn get_task(
    _access: Authorized<SecretTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get(id).await?))
}

// --- Tasks: supervisor tier ---

/// supervisor_list_tasks
///
/// [Supervisor Route] Same collection as `list_tasks`, behind the Supervisor gate.
#[utoipa::path(
    get,
    path = "/api/tasks/supervisor",
    responses(
        (status = 200, description = "All tasks", body = [Task]),
        (status = 403, description = "Not in the Supervisor group", body = ErrorBody)
    )
)]
pub async fn supervisor_list_tasks(
    _access: Authorized<SupervisorTier>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_all().await?))
}

/// supervisor_create_task
///
/// [Supervisor Route] Creates a task. `title` and `description` are validated before the
/// store is touched; failures come back as per-field messages.
#[utoipa::path(
    post,
    path = "/api/tasks/supervisor",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Created", body = Task),
        (status = 400, description = "Invalid fields", body = ErrorBody)
    )
)]
pub async fn supervisor_create_task(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(payload) = payload?;
    let new_task = payload.validate()?;
    let task = state.tasks.create(new_task).await?;
    tracing::info!(task_id = task.id, by = %principal.username, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// supervisor_get_task
///
/// [Supervisor Route] Single task by id.
#[utoipa::path(
    get,
    path = "/api/tasks/supervisor/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Found", body = Task),
        (status = 404, description = "No such task", body = ErrorBody)
    )
)]
pub async fn supervisor_get_task(
    _access: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get(id).await?))
}

/// supervisor_update_task
///
/// [Supervisor Route] Partial update (PUT and PATCH alike): only keys present in the body
/// are merged, typically `completed`, `date_completed` and `user_completed`.
/// `id` and `created_at` cannot be changed. A missing id is reported as `404` before
/// the body is looked at.
#[utoipa::path(
    put,
    path = "/api/tasks/supervisor/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 202, description = "Merged", body = Task),
        (status = 400, description = "Invalid fields", body = ErrorBody),
        (status = 404, description = "No such task", body = ErrorBody)
    )
)]
pub async fn supervisor_update_task(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    patch: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    state.tasks.get(id).await?;
    let Json(patch) = patch?;
    let patch = patch.validate()?;
    let task = state.tasks.update(id, patch).await?;
    tracing::info!(task_id = id, by = %principal.username, "task updated");
    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// supervisor_delete_task
///
/// [Supervisor Route] Removes a task. No body on success.
#[utoipa::path(
    delete,
    path = "/api/tasks/supervisor/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such task", body = ErrorBody)
    )
)]
pub async fn supervisor_delete_task(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tasks.delete(id).await?;
    tracing::info!(task_id = id, by = %principal.username, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Secret messages: general tier ---

/// list_secrets
///
/// [Secret Route] Flat feed of every secret message. There is deliberately no by-id
/// lookup at this tier.
#[utoipa::path(
    get,
    path = "/api/secret",
    responses(
        (status = 200, description = "All secret messages", body = [SecretLevelData]),
        (status = 401, description = "No valid credential", body = ErrorBody),
        (status = 403, description = "Not in the Secret group", body = ErrorBody)
    )
)]
pub async fn list_secrets(
    _access: Authorized<SecretTier>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SecretLevelData>>, ApiError> {
    Ok(Json(state.secrets.list_all().await?))
}

// --- Secret messages: supervisor tier ---

/// supervisor_list_secrets
///
/// [Supervisor Route] Same collection as `list_secrets`, behind the Supervisor gate.
#[utoipa::path(
    get,
    path = "/api/secret/supervisor",
    responses(
        (status = 200, description = "All secret messages", body = [SecretLevelData]),
        (status = 403, description = "Not in the Supervisor group", body = ErrorBody)
    )
)]
pub async fn supervisor_list_secrets(
    _access: Authorized<SupervisorTier>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SecretLevelData>>, ApiError> {
    Ok(Json(state.secrets.list_all().await?))
}

/// supervisor_create_secret
///
/// [Supervisor Route] Creates a secret message. A missing or blank `message` is
/// rejected before the store is touched.
#[utoipa::path(
    post,
    path = "/api/secret/supervisor",
    request_body = CreateSecretRequest,
    responses(
        (status = 201, description = "Created", body = SecretLevelData),
        (status = 400, description = "Invalid fields", body = ErrorBody)
    )
)]
pub async fn supervisor_create_secret(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    payload: Result<Json<CreateSecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SecretLevelData>), ApiError> {
    let Json(payload) = payload?;
    let new_secret = payload.validate()?;
    let secret = state.secrets.create(new_secret).await?;
    tracing::info!(secret_id = secret.id, by = %principal.username, "secret created");
    Ok((StatusCode::CREATED, Json(secret)))
}

/// supervisor_get_secret
///
/// [Supervisor Route] Single secret message by id.
#[utoipa::path(
    get,
    path = "/api/secret/supervisor/{id}",
    params(("id" = i64, Path, description = "Secret message ID")),
    responses(
        (status = 200, description = "Found", body = SecretLevelData),
        (status = 404, description = "No such message", body = ErrorBody)
    )
)]
pub async fn supervisor_get_secret(
    _access: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SecretLevelData>, ApiError> {
    Ok(Json(state.secrets.get(id).await?))
}

/// supervisor_update_secret
///
/// [Supervisor Route] Partial update of a message; an omitted `message` leaves it as is.
/// A missing id is reported as `404` before the body is looked at.
#[utoipa::path(
    put,
    path = "/api/secret/supervisor/{id}",
    params(("id" = i64, Path, description = "Secret message ID")),
    request_body = UpdateSecretRequest,
    responses(
        (status = 202, description = "Merged", body = SecretLevelData),
        (status = 400, description = "Invalid fields", body = ErrorBody),
        (status = 404, description = "No such message", body = ErrorBody)
    )
)]
pub async fn supervisor_update_secret(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    patch: Result<Json<UpdateSecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SecretLevelData>), ApiError> {
    state.secrets.get(id).await?;
    let Json(patch) = patch?;
    let patch = patch.validate()?;
    let secret = state.secrets.update(id, patch).await?;
    tracing::info!(secret_id = id, by = %principal.username, "secret updated");
    Ok((StatusCode::ACCEPTED, Json(secret)))
}

/// supervisor_delete_secret
///
/// [Supervisor Route] Removes a secret message. No body on success.
#[utoipa::path(
    delete,
    path = "/api/secret/supervisor/{id}",
    params(("id" = i64, Path, description = "Secret message ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such message", body = ErrorBody)
    )
)]
pub async fn supervisor_delete_secret(
    Authorized { principal, .. }: Authorized<SupervisorTier>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.secrets.delete(id).await?;
    tracing::info!(secret_id = id, by = %principal.username, "secret deleted");
    Ok(StatusCode::NO_CONTENT)
}
