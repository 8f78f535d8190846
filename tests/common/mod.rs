#![allow(dead_code)]

use std::{sync::Arc, time::SystemTime};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use secure_tasker::{
    AppState, InMemoryDirectory, InMemoryStore,
    auth::Claims,
    config::{AppConfig, Env},
    models::{SecretLevelData, Task},
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

pub const REGULAR_USER: i64 = 1;
pub const SECRET_USER: i64 = 2;
pub const SUPERVISOR_USER: i64 = 3;
pub const SECRET_SUPERVISOR_USER: i64 = 4;

/// Handles to the in-memory services behind an `AppState`, so tests can seed data and
/// edit group membership while requests are in flight.
pub struct TestContext {
    pub directory: Arc<InMemoryDirectory>,
    pub tasks: Arc<InMemoryStore<Task>>,
    pub secrets: Arc<InMemoryStore<SecretLevelData>>,
    pub state: AppState,
}

impl TestContext {
    pub async fn new(env: Env) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_user(REGULAR_USER, "regular_user", Vec::<String>::new()).await;
        directory.add_user(SECRET_USER, "secret_user", ["Secret"]).await;
        directory.add_user(SUPERVISOR_USER, "supervisor_user", ["Supervisor"]).await;
        directory
            .add_user(SECRET_SUPERVISOR_USER, "lead_user", ["Secret", "Supervisor"])
            .await;

        let tasks = Arc::new(InMemoryStore::<Task>::new());
        let secrets = Arc::new(InMemoryStore::<SecretLevelData>::new());

        let config = AppConfig {
            env,
            jwt_secret: TEST_JWT_SECRET.to_string(),
            ..AppConfig::default()
        };

        let state = AppState {
            tasks: tasks.clone(),
            secrets: secrets.clone(),
            directory: directory.clone(),
            config,
        };

        Self {
            directory,
            tasks,
            secrets,
            state,
        }
    }

    pub fn router(&self) -> Router {
        secure_tasker::create_router(self.state.clone())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Signs a token for `user_id` that expires `ttl_secs` from now (negative = already expired).
pub fn token_with(user_id: i64, ttl_secs: i64, secret: &str) -> String {
    token_with_subject(&user_id.to_string(), ttl_secs, secret)
}

pub fn token_with_subject(subject: &str, ttl_secs: i64, secret: &str) -> String {
    let now = now_secs() as i64;
    let claims = Claims {
        sub: subject.to_string(),
        iat: now as usize,
        exp: (now + ttl_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn token_for(user_id: i64) -> String {
    token_with(user_id, 3600, TEST_JWT_SECRET)
}

pub fn request(method: Method, uri: &str, user: Option<i64>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id)));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
