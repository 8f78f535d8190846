use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::repository::StoreError;

/// ValidationErrors
///
/// Per-field validation messages, keyed by the request field name. Serialized as a
/// plain JSON object (`{"title": ["This field may not be blank."]}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of messages across all fields.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// `Ok(value)` when no message was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// ApiError
///
/// Every way a request can fail once it reaches a handler or extractor. The variants
/// stay distinguishable all the way to the client through the status code and `code`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthenticated,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("Not found.")]
    NotFound,
    #[error("Validation failed.")]
    Validation(ValidationErrors),
    /// The body could not be read as the expected JSON; `status` is 400 or 422.
    #[error("{detail}")]
    MalformedBody { status: StatusCode, detail: String },
    #[error("store failure: {0}")]
    Store(String),
}

/// ErrorBody
///
/// JSON body returned for every `ApiError`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable kind: `unauthenticated`, `forbidden`, `not_found`,
    /// `validation_failed`, `malformed_body` or `store_failure`.
    pub code: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MalformedBody { status, .. } => *status,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound => "not_found",
            ApiError::Validation(_) => "validation_failed",
            ApiError::MalformedBody { .. } => "malformed_body",
            ApiError::Store(_) => "store_failure",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Backend(e) => {
                tracing::error!(error = ?e, "store backend failure");
                ApiError::Store(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();

        let body = match self {
            ApiError::Validation(fields) => ErrorBody {
                code,
                detail: "Validation failed.".to_string(),
                fields: Some(fields),
            },
            // The backend message stays in the logs.
            ApiError::Store(_) => ErrorBody {
                code,
                detail: "Internal server error.".to_string(),
                fields: None,
            },
            other => ErrorBody {
                code,
                detail: other.to_string(),
                fields: None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
