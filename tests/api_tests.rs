mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode, header},
};
use common::{
    REGULAR_USER, SECRET_SUPERVISOR_USER, SECRET_USER, SUPERVISOR_USER, TestContext, json_body,
    request, send, token_for,
};
use secure_tasker::{
    AppState, create_app,
    config::Env,
    error::ErrorBody,
    models::{NewTask, SecretLevelData, Task, UpdateTaskRequest, UserPermissions},
    repository::{ResourceStore, StoreError},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceExt;

// --- Failing store for backend error mapping ---

struct FailingTaskStore;

#[async_trait]
impl ResourceStore<Task> for FailingTaskStore {
    async fn create(&self, _new: NewTask) -> Result<Task, StoreError> {
        Err(StoreError::Backend(sqlx::Error::PoolTimedOut))
    }
    async fn get(&self, _id: i64) -> Result<Task, StoreError> {
        Err(StoreError::Backend(sqlx::Error::PoolTimedOut))
    }
    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        Err(StoreError::Backend(sqlx::Error::PoolTimedOut))
    }
    async fn update(&self, _id: i64, _patch: UpdateTaskRequest) -> Result<Task, StoreError> {
        Err(StoreError::Backend(sqlx::Error::PoolTimedOut))
    }
    async fn delete(&self, _id: i64) -> Result<(), StoreError> {
        Err(StoreError::Backend(sqlx::Error::PoolTimedOut))
    }
}

fn new_task_body(n: u32) -> serde_json::Value {
    json!({
        "title": format!("Test task {n}"),
        "description": format!("This is the description for test task {n}."),
    })
}

// --- Public and identity routes ---

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(&ctx.router(), request(Method::GET, "/health", None, None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(Method::GET, "/api-docs/openapi.json", None, None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = json_body(response).await;
    assert!(doc["paths"]["/api/tasks/supervisor/{id}"].is_object());
}

#[tokio::test]
async fn test_user_permissions_for_each_role() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let cases = [
        (REGULAR_USER, "regular_user", false, false),
        (SECRET_USER, "secret_user", true, false),
        (SUPERVISOR_USER, "supervisor_user", false, true),
        (SECRET_SUPERVISOR_USER, "lead_user", true, true),
    ];

    for (user, username, secret, supervisor) in cases {
        let response = send(
            &router,
            request(Method::GET, "/api/secret/user-permissions", Some(user), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let perms: UserPermissions = json_body(response).await;
        assert_eq!(perms.username, username);
        assert_eq!(perms.has_secret_access, secret);
        assert_eq!(perms.is_supervisor, supervisor);
    }
}

#[tokio::test]
async fn test_unauthenticated_request_gets_401_with_challenge() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(Method::GET, "/api/secret/user-permissions", None, None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.code, "unauthenticated");
}

// --- Task lifecycle across tiers ---

#[tokio::test]
async fn test_supervisor_created_task_is_visible_to_secret_members_only() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(new_task_body(1)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Task = json_body(response).await;
    assert!(!created.completed);

    let uri = format!("/api/tasks/{}", created.id);

    let response = send(&router, request(Method::GET, &uri, Some(SECRET_USER), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Task = json_body(response).await;
    assert_eq!(fetched, created);

    let response = send(&router, request(Method::GET, &uri, Some(REGULAR_USER), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.code, "forbidden");

    let response = send(&router, request(Method::GET, &uri, None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_supervisor_membership_alone_is_forbidden_on_secret_tier() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    for uri in ["/api/tasks", "/api/secret"] {
        let response = send(&router, request(Method::GET, uri, Some(SUPERVISOR_USER), None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn test_secret_member_cannot_reach_supervisor_tier() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SECRET_USER),
            Some(new_task_body(1)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(ctx.tasks.is_empty().await);

    let response = send(
        &router,
        request(Method::GET, "/api/secret/supervisor", Some(SECRET_USER), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_general_tier_has_no_write_routes() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(
            Method::POST,
            "/api/tasks",
            Some(SECRET_SUPERVISOR_USER),
            Some(new_task_body(1)),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(ctx.tasks.is_empty().await);
}

#[tokio::test]
async fn test_empty_collections_list_as_empty_arrays() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    for (uri, user) in [
        ("/api/tasks", SECRET_USER),
        ("/api/secret", SECRET_USER),
        ("/api/tasks/supervisor", SUPERVISOR_USER),
        ("/api/secret/supervisor", SUPERVISOR_USER),
    ] {
        let response = send(&router, request(Method::GET, uri, Some(user), None)).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let items: Vec<serde_json::Value> = json_body(response).await;
        assert!(items.is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn test_patch_completes_task_and_ignores_immutable_keys() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(new_task_body(2)),
        ),
    )
    .await;
    let created: Task = json_body(response).await;

    let response = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/tasks/supervisor/{}", created.id),
            Some(SUPERVISOR_USER),
            Some(json!({
                "id": created.id + 50,
                "created_at": "2000-01-01T00:00:00Z",
                "completed": true,
                "date_completed": "2025-06-01T12:00:00Z",
                "user_completed": "supervisor_user",
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let updated: Task = json_body(response).await;
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.title, created.title);
    assert!(updated.completed);
    assert_eq!(updated.user_completed.as_deref(), Some("supervisor_user"));
    assert!(updated.date_completed.is_some());
}

#[tokio::test]
async fn test_put_is_a_partial_merge_and_null_clears() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(new_task_body(3)),
        ),
    )
    .await;
    let created: Task = json_body(response).await;
    let uri = format!("/api/tasks/supervisor/{}", created.id);

    send(
        &router,
        request(
            Method::PUT,
            &uri,
            Some(SUPERVISOR_USER),
            Some(json!({ "user_completed": "supervisor_user" })),
        ),
    )
    .await;

    let response = send(
        &router,
        request(
            Method::PUT,
            &uri,
            Some(SUPERVISOR_USER),
            Some(json!({ "user_completed": null })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let updated: Task = json_body(response).await;
    assert_eq!(updated.user_completed, None);
    assert_eq!(updated.description, created.description);
}

#[tokio::test]
async fn test_create_task_validation_failure_returns_field_messages() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "title": "x".repeat(201) })),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.code, "validation_failed");
    let fields = body.fields.unwrap();
    assert_eq!(
        fields.get("title"),
        Some(&["Ensure this field has no more than 200 characters.".to_string()][..])
    );
    assert_eq!(
        fields.get("description"),
        Some(&["This field is required.".to_string()][..])
    );
    assert!(ctx.tasks.is_empty().await);
}

#[tokio::test]
async fn test_malformed_create_body_is_rejected_as_json_error() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "title": 5, "description": "d" })),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = json_body(response).await;
    assert_eq!(err.code, "malformed_body");
    assert!(ctx.tasks.is_empty().await);
}

#[tokio::test]
async fn test_missing_task_is_404_for_every_verb() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
        let body = (method == Method::PUT || method == Method::PATCH).then(|| json!({}));
        let response = send(
            &router,
            request(method.clone(), "/api/tasks/supervisor/9999", Some(SUPERVISOR_USER), body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
        let err: ErrorBody = json_body(response).await;
        assert_eq!(err.code, "not_found");
    }
}

#[tokio::test]
async fn test_update_of_missing_id_is_404_whatever_the_body() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let cases = [
        ("/api/tasks/supervisor/9999", json!({ "title": "" })),
        ("/api/tasks/supervisor/9999", json!({ "completed": "yes" })),
        ("/api/secret/supervisor/9999", json!({ "message": " " })),
        ("/api/secret/supervisor/9999", json!({ "message": 7 })),
    ];

    for (uri, body) in cases {
        for method in [Method::PUT, Method::PATCH] {
            let response = send(
                &router,
                request(method.clone(), uri, Some(SUPERVISOR_USER), Some(body.clone())),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri} {body}");
            let err: ErrorBody = json_body(response).await;
            assert_eq!(err.code, "not_found");
        }
    }
}

#[tokio::test]
async fn test_wrongly_typed_patch_on_existing_task_is_malformed_body() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(new_task_body(5)),
        ),
    )
    .await;
    let created: Task = json_body(response).await;

    let response = send(
        &router,
        request(
            Method::PATCH,
            &format!("/api/tasks/supervisor/{}", created.id),
            Some(SUPERVISOR_USER),
            Some(json!({ "completed": "yes" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorBody = json_body(response).await;
    assert_eq!(err.code, "malformed_body");

    let stored: Task = ctx.tasks.get(created.id).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn test_text_fields_are_stored_trimmed() {
    let ctx = TestContext::new(Env::Production).await;
    let response = send(
        &ctx.router(),
        request(
            Method::POST,
            "/api/tasks/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "title": " new title ", "description": " d " })),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Task = json_body(response).await;
    assert_eq!(created.title, "new title");
    assert_eq!(created.description, "d");
}

// --- Secret message lifecycle ---

#[tokio::test]
async fn test_created_secret_appears_in_general_list() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/secret/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "message": "Top Secret Message 1" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: SecretLevelData = json_body(response).await;

    let response = send(&router, request(Method::GET, "/api/secret", Some(SECRET_USER), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Vec<SecretLevelData> = json_body(response).await;
    assert_eq!(listed, vec![created]);
}

#[tokio::test]
async fn test_deleted_secret_is_gone() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/secret/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "message": "Top Secret Message 1" })),
        ),
    )
    .await;
    let created: SecretLevelData = json_body(response).await;
    let uri = format!("/api/secret/supervisor/{}", created.id);

    let response = send(&router, request(Method::DELETE, &uri, Some(SUPERVISOR_USER), None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&router, request(Method::GET, &uri, Some(SUPERVISOR_USER), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_secret_update_rejects_blank_message() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(
        &router,
        request(
            Method::POST,
            "/api/secret/supervisor",
            Some(SUPERVISOR_USER),
            Some(json!({ "message": "Top Secret Message 1" })),
        ),
    )
    .await;
    let created: SecretLevelData = json_body(response).await;

    let response = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/secret/supervisor/{}", created.id),
            Some(SUPERVISOR_USER),
            Some(json!({ "message": "  " })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// --- Membership changes and environment ---

#[tokio::test]
async fn test_removing_group_takes_effect_on_next_request() {
    let ctx = TestContext::new(Env::Production).await;
    let router = ctx.router();

    let response = send(&router, request(Method::GET, "/api/secret", Some(SECRET_USER), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    ctx.directory.remove_from_group(SECRET_USER, "Secret").await;

    let response = send(&router, request(Method::GET, "/api/secret", Some(SECRET_USER), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deactivated_user_is_unauthenticated() {
    let ctx = TestContext::new(Env::Production).await;
    ctx.directory.set_active(SECRET_USER, false).await;

    let response = send(
        &ctx.router(),
        request(Method::GET, "/api/secret", Some(SECRET_USER), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_header_bypass_through_router() {
    let ctx = TestContext::new(Env::Local).await;
    let req = axum::http::Request::builder()
        .uri("/api/secret")
        .header("x-user-id", SECRET_USER.to_string())
        .body(Body::empty())
        .unwrap();

    let response = send(&ctx.router(), req).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_trailing_slash_reaches_same_handler() {
    let ctx = TestContext::new(Env::Production).await;
    let app = create_app(ctx.state.clone());

    let response = app
        .oneshot(request(Method::GET, "/api/tasks/", Some(SECRET_USER), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_backend_failure_maps_to_500_without_leaking_detail() {
    let ctx = TestContext::new(Env::Production).await;
    let state = AppState {
        tasks: Arc::new(FailingTaskStore),
        ..ctx.state.clone()
    };
    let router = secure_tasker::create_router(state);

    let response = send(&router, request(Method::GET, "/api/tasks", Some(SECRET_USER), None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.code, "store_failure");
    assert_eq!(body.detail, "Internal server error.");

    // The gate still runs first.
    let response = send(&router, request(Method::GET, "/api/tasks", Some(REGULAR_USER), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// --- Live server ---

#[tokio::test]
async fn test_live_server_round_trip() {
    let ctx = TestContext::new(Env::Production).await;
    let app = create_app(ctx.state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let address = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        axum::serve(listener, axum::ServiceExt::<Request>::into_make_service(app))
            .await
            .unwrap();
    });

    let client = reqwest::Client::new();

    let response = client
        .get(format!("{address}/health"))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{address}/api/secret/user-permissions/"))
        .bearer_auth(token_for(SUPERVISOR_USER))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let perms: UserPermissions = response.json().await.unwrap();
    assert!(perms.is_supervisor);
    assert!(!perms.has_secret_access);
}
