/// Router Module Index
///
/// Routes are grouped by the access they demand, so the capability a path requires is
/// visible from where it is mounted. The gate itself lives in each handler signature
/// (`Principal` or `Authorized<Tier>` extractors), so a route cannot be mounted
/// without one.

/// Routes open to anyone (health check).
pub mod public;

/// Routes that need an identity but no group membership.
pub mod authenticated;

/// General tier: Secret-group members, read-only.
pub mod secret;

/// Elevated tier: Supervisor-group members, full lifecycle.
pub mod supervisor;
