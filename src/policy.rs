//! Authorization policy.
//!
//! Group membership is the only source of capability. Each capability maps to one
//! exact group name and there is no hierarchy between them: a `Supervisor` who is
//! not also in `Secret` is refused on Secret-tier endpoints.

use crate::{auth::Principal, error::ApiError};

/// A right an endpoint can demand of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SecretMember,
    Supervisor,
}

impl Capability {
    /// Name of the group that grants this capability. Matched case-sensitively.
    pub const fn group_name(self) -> &'static str {
        match self {
            Capability::SecretMember => "Secret",
            Capability::Supervisor => "Supervisor",
        }
    }
}

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Unauthenticated,
    Forbidden,
}

impl Decision {
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Unauthenticated => Err(ApiError::Unauthenticated),
            Decision::Forbidden => Err(ApiError::Forbidden),
        }
    }
}

/// authorize
///
/// Authentication is checked first: an absent principal is `Unauthenticated` whatever
/// `required` contains. Otherwise every capability in `required` must be granted by
/// one of the principal's groups (logical AND). An empty `required` set admits any
/// authenticated caller.
pub fn authorize(principal: Option<&Principal>, required: &[Capability]) -> Decision {
    let Some(principal) = principal else {
        return Decision::Unauthenticated;
    };

    if required.iter().all(|capability| principal.has(*capability)) {
        Decision::Allowed
    } else {
        Decision::Forbidden
    }
}

/// AccessTier
///
/// Declares the exact capability set an endpoint group requires. Used as the type
/// parameter of the [`Authorized`](crate::auth::Authorized) extractor so that each
/// handler states its requirement in its signature.
pub trait AccessTier: Send + Sync + 'static {
    const NAME: &'static str;
    const REQUIRED: &'static [Capability];
}

/// General tier: any member of the Secret group.
#[derive(Debug, Clone, Copy)]
pub struct SecretTier;

impl AccessTier for SecretTier {
    const NAME: &'static str = "secret";
    const REQUIRED: &'static [Capability] = &[Capability::SecretMember];
}

/// Elevated tier: members of the Supervisor group.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTier;

impl AccessTier for SupervisorTier {
    const NAME: &'static str = "supervisor";
    const REQUIRED: &'static [Capability] = &[Capability::Supervisor];
}
