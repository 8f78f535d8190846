use std::{process::ExitCode, sync::Arc};

use axum::{extract::Request, ServiceExt};
use secure_tasker::{
    AppState,
    config::{AppConfig, Env},
    create_app,
    repository::{DirectoryState, PostgresRepository, SecretStore, TaskStore},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, installs logging, connects and migrates Postgres, then serves
/// HTTP until the process is stopped.
#[tokio::main]
async fn main() -> ExitCode {
    // Loads .env before configuration is read.
    dotenv::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not installed yet.
            eprintln!("FATAL: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "secure_tasker=debug,tower_http=info,axum=trace".into());

    // Pretty output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    if config.env == Env::Local {
        tracing::warn!("x-user-id header authentication is enabled (local mode)");
    }

    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to Postgres; check DATABASE_URL");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "failed to apply database migrations");
        return ExitCode::FAILURE;
    }

    // One repository backs both collections and the directory.
    let repo = Arc::new(PostgresRepository::new(pool));
    let tasks: TaskStore = repo.clone();
    let secrets: SecretStore = repo.clone();
    let directory: DirectoryState = repo;

    let bind_addr = config.bind_addr.clone();
    let app = create_app(AppState {
        tasks,
        secrets,
        directory,
        config,
    });

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %bind_addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await {
        tracing::error!(error = %e, "server terminated");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
