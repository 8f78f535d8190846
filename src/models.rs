use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ValidationErrors;

/// Maximum length of `Task.title` and `Task.user_completed` (VARCHAR(200) columns).
pub const MAX_TITLE_LEN: usize = 200;

// --- Partial Update Wrapper ---

/// Field
///
/// One mutable attribute of a partial update. `Omitted` means the key was absent from
/// the request body and the stored value must be left alone; `Set` carries the new value.
/// Nullable attributes use `Field<Option<T>>`, so an explicit JSON `null` becomes
/// `Set(None)` and clears the column, which is different from leaving the key out.
///
/// Struct fields of this type must be annotated with `#[serde(default)]` so that a
/// missing key deserializes to `Omitted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Omitted,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Omitted
    }
}

impl<T> Field<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, Field::Omitted)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Field::Set(value) => Some(value),
            Field::Omitted => None,
        }
    }

    /// Writes the carried value into `target`; `Omitted` leaves `target` untouched.
    pub fn apply_to(self, target: &mut T) {
        if let Field::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Set(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Field::Set)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Set(value) => value.serialize(serializer),
            Field::Omitted => serializer.serialize_none(),
        }
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// Task
///
/// A work item from the `tasks` table. `id` and `created_at` are assigned by the
/// database on insert and are never written again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub date_completed: Option<DateTime<Utc>>,
    pub user_completed: Option<String>,
}

/// SecretLevelData
///
/// A single message from the `secret_level_data` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct SecretLevelData {
    pub id: i64,
    pub message: String,
}

// --- Store Inputs (validated) ---

/// Validated field set for inserting a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
}

/// Validated field set for inserting a secret message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecret {
    pub message: String,
}

// --- Request Payloads (Input Schemas) ---

/// CreateTaskRequest
///
/// Input payload for `POST /api/tasks/supervisor`. Both fields are optional at the
/// serde level so that a missing key is reported as a per-field validation message
/// instead of an opaque deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateTaskRequest {
    #[schema(example = "Test task 1")]
    pub title: Option<String>,
    #[schema(example = "This is the description for test task 1.")]
    pub description: Option<String>,
}

impl CreateTaskRequest {
    pub fn validate(self) -> Result<NewTask, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let title = required_text(&mut errors, "title", self.title, Some(MAX_TITLE_LEN));
        let description = required_text(&mut errors, "description", self.description, None);

        match (title, description) {
            (Some(title), Some(description)) if errors.is_empty() => {
                Ok(NewTask { title, description })
            }
            _ => Err(errors),
        }
    }
}

/// UpdateTaskRequest
///
/// Partial update payload for `PUT`/`PATCH /api/tasks/supervisor/{id}`. Only keys that
/// are present in the body are merged; `id` and `created_at` are not accepted and are
/// dropped if a client sends them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | undefined")]
    pub title: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | undefined")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<bool>)]
    #[ts(type = "boolean | undefined")]
    pub completed: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    #[ts(type = "string | null | undefined")]
    pub date_completed: Field<Option<DateTime<Utc>>>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | null | undefined")]
    pub user_completed: Field<Option<String>>,
}

impl UpdateTaskRequest {
    /// Checks the supplied fields and returns the patch with its text trimmed.
    pub fn validate(mut self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Field::Set(title) = &mut self.title {
            trim_in_place(title);
            non_blank(&mut errors, "title", title, Some(MAX_TITLE_LEN));
        }
        if let Field::Set(description) = &mut self.description {
            trim_in_place(description);
            non_blank(&mut errors, "description", description, None);
        }
        if let Field::Set(Some(user)) = &mut self.user_completed {
            trim_in_place(user);
            max_len(&mut errors, "user_completed", user, MAX_TITLE_LEN);
        }
        errors.into_result(self)
    }
}

/// CreateSecretRequest
///
/// Input payload for `POST /api/secret/supervisor`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateSecretRequest {
    #[schema(example = "new message")]
    pub message: Option<String>,
}

impl CreateSecretRequest {
    pub fn validate(self) -> Result<NewSecret, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match required_text(&mut errors, "message", self.message, None) {
            Some(message) => Ok(NewSecret { message }),
            None => Err(errors),
        }
    }
}

/// UpdateSecretRequest
///
/// Partial update payload for `PUT`/`PATCH /api/secret/supervisor/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateSecretRequest {
    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    #[schema(value_type = Option<String>)]
    #[ts(type = "string | undefined")]
    pub message: Field<String>,
}

impl UpdateSecretRequest {
    pub fn validate(mut self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Field::Set(message) = &mut self.message {
            trim_in_place(message);
            non_blank(&mut errors, "message", message, None);
        }
        errors.into_result(self)
    }
}

// --- Output Schemas ---

/// UserPermissions
///
/// Output of `GET /api/secret/user-permissions`. Client tooling uses it to pick which
/// views to render; it is never consulted for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserPermissions {
    pub username: String,
    pub has_secret_access: bool,
    pub is_supervisor: bool,
}

// --- Validation helpers ---

fn required_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<String>,
    limit: Option<usize>,
) -> Option<String> {
    match value {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(mut value) => {
            trim_in_place(&mut value);
            let before = errors.len();
            non_blank(errors, field, &value, limit);
            (errors.len() == before).then_some(value)
        }
    }
}

// Surrounding whitespace is never stored.
fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn non_blank(errors: &mut ValidationErrors, field: &'static str, value: &str, limit: Option<usize>) {
    if value.is_empty() {
        errors.add(field, "This field may not be blank.");
        return;
    }
    if let Some(limit) = limit {
        max_len(errors, field, value, limit);
    }
}

fn max_len(errors: &mut ValidationErrors, field: &'static str, value: &str, limit: usize) {
    if value.chars().count() > limit {
        errors.add(
            field,
            format!("Ensure this field has no more than {limit} characters."),
        );
    }
}
