use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    auth::Principal,
    models::{NewSecret, NewTask, SecretLevelData, Task, UpdateSecretRequest, UpdateTaskRequest},
};

/// StoreError
///
/// Failure of a persistence operation. `NotFound` is reported only when the target id
/// does not exist; everything else the backend raises is `Backend`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Resource
///
/// A record type held in one flat collection keyed by a server-assigned integer id.
/// `New` is the validated insert payload and `Patch` the partial-update payload.
pub trait Resource: Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    type New: Send + 'static;
    type Patch: Send + 'static;

    fn id(&self) -> i64;

    /// Builds the stored record for a fresh insert.
    fn from_new(id: i64, created_at: DateTime<Utc>, new: Self::New) -> Self;

    /// Merges the fields present in `patch`. Never touches `id` or creation metadata.
    fn apply(&mut self, patch: Self::Patch);
}

impl Resource for Task {
    const COLLECTION: &'static str = "tasks";
    type New = NewTask;
    type Patch = UpdateTaskRequest;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_new(id: i64, created_at: DateTime<Utc>, new: NewTask) -> Self {
        Task {
            id,
            title: new.title,
            description: new.description,
            completed: false,
            created_at,
            date_completed: None,
            user_completed: None,
        }
    }

    fn apply(&mut self, patch: UpdateTaskRequest) {
        patch.title.apply_to(&mut self.title);
        patch.description.apply_to(&mut self.description);
        patch.completed.apply_to(&mut self.completed);
        patch.date_completed.apply_to(&mut self.date_completed);
        patch.user_completed.apply_to(&mut self.user_completed);
    }
}

impl Resource for SecretLevelData {
    const COLLECTION: &'static str = "secret_level_data";
    type New = NewSecret;
    type Patch = UpdateSecretRequest;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_new(id: i64, _created_at: DateTime<Utc>, new: NewSecret) -> Self {
        SecretLevelData {
            id,
            message: new.message,
        }
    }

    fn apply(&mut self, patch: UpdateSecretRequest) {
        patch.message.apply_to(&mut self.message);
    }
}

/// ResourceStore
///
/// Capability-neutral CRUD over one collection. Authorization happens before any of
/// these methods is reached; the store never sees a principal.
///
/// **Send + Sync + async_trait** let the trait object (`Arc<dyn ResourceStore<R>>`) be
/// shared across Axum's request tasks.
#[async_trait]
pub trait ResourceStore<R: Resource>: Send + Sync {
    async fn create(&self, new: R::New) -> Result<R, StoreError>;
    async fn get(&self, id: i64) -> Result<R, StoreError>;
    // Creation order; an empty collection is an empty Vec.
    async fn list_all(&self) -> Result<Vec<R>, StoreError>;
    async fn update(&self, id: i64, patch: R::Patch) -> Result<R, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// UserDirectory
///
/// Source of usernames and group memberships for the principal resolver. Queried on
/// every authenticated request.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when the user does not exist or is inactive.
    async fn find_principal(&self, user_id: i64) -> Result<Option<Principal>, StoreError>;
}

pub type TaskStore = Arc<dyn ResourceStore<Task>>;
pub type SecretStore = Arc<dyn ResourceStore<SecretLevelData>>;
pub type DirectoryState = Arc<dyn UserDirectory>;

/// PostgresRepository
///
/// Backs both collections and the user directory with one PostgreSQL pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore<Task> for PostgresRepository {
    async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = sqlx::query_as::<_, Task>(
            r#"INSERT INTO tasks (title, description)
               VALUES ($1, $2)
               RETURNING id, title, description, completed, created_at, date_completed, user_completed"#,
        )
        .bind(new.title)
        .bind(new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get(&self, id: i64) -> Result<Task, StoreError> {
        sqlx::query_as::<_, Task>(
            r#"SELECT id, title, description, completed, created_at, date_completed, user_completed
               FROM tasks WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(
            r#"SELECT id, title, description, completed, created_at, date_completed, user_completed
               FROM tasks ORDER BY id ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// update
    ///
    /// Locks the row, merges the patch with `Resource::apply` and writes the result in
    /// one transaction. If the request is dropped mid-way the transaction rolls back.
    async fn update(&self, id: i64, patch: UpdateTaskRequest) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut task = sqlx::query_as::<_, Task>(
            r#"SELECT id, title, description, completed, created_at, date_completed, user_completed
               FROM tasks WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        task.apply(patch);

        let updated = sqlx::query_as::<_, Task>(
            r#"UPDATE tasks
               SET title = $2, description = $3, completed = $4,
                   date_completed = $5, user_completed = $6
               WHERE id = $1
               RETURNING id, title, description, completed, created_at, date_completed, user_completed"#,
        )
        .bind(task.id)
        .bind(task.title)
        .bind(task.description)
        .bind(task.completed)
        .bind(task.date_completed)
        .bind(task.user_completed)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore<SecretLevelData> for PostgresRepository {
    async fn create(&self, new: NewSecret) -> Result<SecretLevelData, StoreError> {
        let secret = sqlx::query_as::<_, SecretLevelData>(
            "INSERT INTO secret_level_data (message) VALUES ($1) RETURNING id, message",
        )
        .bind(new.message)
        .fetch_one(&self.pool)
        .await?;
        Ok(secret)
    }

    async fn get(&self, id: i64) -> Result<SecretLevelData, StoreError> {
        sqlx::query_as::<_, SecretLevelData>(
            "SELECT id, message FROM secret_level_data WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<SecretLevelData>, StoreError> {
        let secrets = sqlx::query_as::<_, SecretLevelData>(
            "SELECT id, message FROM secret_level_data ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(secrets)
    }

    async fn update(
        &self,
        id: i64,
        patch: UpdateSecretRequest,
    ) -> Result<SecretLevelData, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut secret = sqlx::query_as::<_, SecretLevelData>(
            "SELECT id, message FROM secret_level_data WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        secret.apply(patch);

        let updated = sqlx::query_as::<_, SecretLevelData>(
            "UPDATE secret_level_data SET message = $2 WHERE id = $1 RETURNING id, message",
        )
        .bind(secret.id)
        .bind(secret.message)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM secret_level_data WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresRepository {
    /// find_principal
    ///
    /// Loads the username and every group name of an active user in one query.
    async fn find_principal(&self, user_id: i64) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, (String, Vec<String>)>(
            r#"
            SELECT u.username::text,
                   COALESCE(array_agg(g.name::text) FILTER (WHERE g.name IS NOT NULL), '{}'::text[])
            FROM users u
            LEFT JOIN user_groups ug ON ug.user_id = u.id
            LEFT JOIN groups g ON g.id = ug.group_id
            WHERE u.id = $1 AND u.is_active
            GROUP BY u.id, u.username
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(username, groups)| Principal::new(user_id, username, groups)))
    }
}
