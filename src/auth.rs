use std::{collections::HashSet, marker::PhantomData};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    policy::{AccessTier, Capability, Decision, authorize},
    repository::DirectoryState,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload expected inside the HS256 bearer token minted by the external issuer.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the decimal id of the user in the directory.
    pub sub: String,
    /// Expiration time (seconds since the epoch). Always validated.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// Principal
///
/// The verified identity behind a request, rebuilt from the directory on every request
/// so that group changes apply immediately. A request without a valid credential has
/// no `Principal` at all, which is a different state from a principal with no groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub groups: HashSet<String>,
}

impl Principal {
    pub fn new<G>(id: i64, username: impl Into<String>, groups: G) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            id,
            username: username.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether one of this principal's groups grants `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.groups.contains(capability.group_name())
    }
}

/// resolve_principal
///
/// Turns the request credential into a `Principal`, or `None` when there is no usable
/// credential:
/// 1. `Env::Local` only: an `x-user-id` header naming an active user.
/// 2. `Authorization: Bearer <jwt>` with a valid signature and unexpired `exp`, whose
///    subject names an active user.
///
/// Only a directory backend failure is an error; every credential problem yields `None`.
pub async fn resolve_principal<S>(parts: &Parts, state: &S) -> Result<Option<Principal>, ApiError>
where
    S: Send + Sync,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let directory = DirectoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    if config.env == Env::Local {
        if let Some(user_id) = local_bypass_user(parts) {
            if let Some(principal) = directory.find_principal(user_id).await? {
                return Ok(Some(principal));
            }
        }
    }

    let Some(user_id) = bearer_subject(parts, &config.jwt_secret) else {
        return Ok(None);
    };

    let principal = directory.find_principal(user_id).await?;
    if principal.is_none() {
        tracing::debug!(user_id, "token subject is unknown or inactive");
    }
    Ok(principal)
}

fn local_bypass_user(parts: &Parts) -> Option<i64> {
    parts
        .headers
        .get(LOCAL_USER_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn bearer_subject(parts: &Parts, secret: &str) -> Option<i64> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => data,
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                _ => tracing::debug!(error = %e, "rejected invalid token"),
            }
            return None;
        }
    };

    token_data.claims.sub.parse().ok()
}

/// Principal Extractor
///
/// Admits any authenticated caller and rejects with `401` otherwise. Used by endpoints
/// that need an identity but no capability.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_principal(parts, state)
            .await?
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Authorized
///
/// Extractor proving the caller holds every capability of tier `T`. Authentication is
/// checked before membership, so an anonymous caller always gets `401` and never `403`.
pub struct Authorized<T: AccessTier> {
    pub principal: Principal,
    tier: PhantomData<T>,
}

impl<T: AccessTier> Authorized<T> {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            tier: PhantomData,
        }
    }
}

impl<S, T> FromRequestParts<S> for Authorized<T>
where
    S: Send + Sync,
    T: AccessTier,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = resolve_principal(parts, state).await?;

        let decision = authorize(principal.as_ref(), T::REQUIRED);
        if let (Decision::Forbidden, Some(p)) = (decision, principal.as_ref()) {
            tracing::info!(username = %p.username, tier = T::NAME, "access denied");
        }
        decision.into_result()?;

        principal
            .map(Authorized::new)
            .ok_or(ApiError::Unauthenticated)
    }
}
