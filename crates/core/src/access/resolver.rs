//! Admin identity loading and accessible-set resolution.
//!
//! The resolver is a filter layered over row-level security, not a
//! replacement for it. Role flags are re-read on every resolution so a
//! promotion or demotion takes effect on the next request.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use meridian_shared::types::UserId;

use super::error::AccessError;
use super::types::{AccessScope, Admin, RoleFlags, RoleTier, UserRoles};

/// Read access to `users` role flags and `user_assignments` edges.
///
/// Implemented by the db crate.
pub trait AccessDirectory: Send + Sync {
    /// Role flags of a single user, `None` if no `users` row exists.
    fn find_roles(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<RoleFlags>, AccessError>> + Send;

    /// Users assigned to any of the given managers.
    fn assigned_user_ids(
        &self,
        manager_ids: &[UserId],
    ) -> impl Future<Output = Result<Vec<UserId>, AccessError>> + Send;

    /// Current role flags for each of the given users that exists.
    fn roles_of(
        &self,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<Vec<UserRoles>, AccessError>> + Send;
}

/// Role a candidate must currently hold to stay in an accessible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateRequirement {
    /// `is_manager && !is_superiormanager`.
    SubordinateManager,
    /// All three role flags false.
    PlainUser,
}

impl CandidateRequirement {
    /// Whether the given flags satisfy this requirement.
    #[must_use]
    pub const fn is_met_by(self, roles: RoleFlags) -> bool {
        match self {
            Self::SubordinateManager => roles.is_subordinate_manager(),
            Self::PlainUser => roles.is_plain_user(),
        }
    }
}

/// Keeps only candidates whose current flags meet `requirement`.
///
/// Records for ids that were not candidates are ignored, and a candidate
/// without a record is dropped.
#[must_use]
pub fn verify_candidates(
    candidates: &BTreeSet<UserId>,
    records: &[UserRoles],
    requirement: CandidateRequirement,
) -> BTreeSet<UserId> {
    records
        .iter()
        .filter(|r| candidates.contains(&r.id) && requirement.is_met_by(r.roles))
        .map(|r| r.id)
        .collect()
}

/// Loads the caller's identity from the verified token subject.
///
/// # Errors
///
/// Returns `AccessError::Directory` if the lookup fails.
pub async fn load_admin<D: AccessDirectory>(
    directory: &D,
    user_id: UserId,
) -> Result<Option<Admin>, AccessError> {
    let roles = directory.find_roles(user_id).await?;
    Ok(roles.map(|roles| Admin::new(user_id, roles)))
}

/// Resolves the set of users an admin may act upon.
///
/// Never fails: a directory error or an empty step narrows the scope to
/// the admin alone, and the narrowing is logged.
pub async fn resolve<D: AccessDirectory>(directory: &D, admin: &Admin) -> AccessScope {
    match admin.tier() {
        RoleTier::FullAdmin => AccessScope::All,
        RoleTier::SuperiorManager => narrow_on_failure(admin, superior_scope(directory, admin.id).await),
        RoleTier::Manager => narrow_on_failure(admin, manager_scope(directory, admin.id).await),
        RoleTier::None => {
            debug!(admin_id = %admin.id, "No recognized admin role");
            AccessScope::Nothing
        }
    }
}

/// Outcome of a hierarchical lookup before narrowing.
enum Lookup {
    Found(BTreeSet<UserId>),
    Empty(&'static str),
}

fn narrow_on_failure(admin: &Admin, lookup: Result<Lookup, AccessError>) -> AccessScope {
    match lookup {
        Ok(Lookup::Found(mut ids)) => {
            ids.insert(admin.id);
            AccessScope::Only(ids)
        }
        Ok(Lookup::Empty(step)) => {
            warn!(admin_id = %admin.id, step, "Access narrowed to self: step yielded no users");
            AccessScope::only_self(admin.id)
        }
        Err(e) => {
            warn!(admin_id = %admin.id, error = %e, "Access narrowed to self: directory lookup failed");
            AccessScope::only_self(admin.id)
        }
    }
}

async fn verified_assignees<D: AccessDirectory>(
    directory: &D,
    manager_ids: &[UserId],
    requirement: CandidateRequirement,
) -> Result<(BTreeSet<UserId>, BTreeSet<UserId>), AccessError> {
    let candidates: BTreeSet<UserId> = directory
        .assigned_user_ids(manager_ids)
        .await?
        .into_iter()
        .collect();
    if candidates.is_empty() {
        return Ok((candidates, BTreeSet::new()));
    }

    let ids: Vec<UserId> = candidates.iter().copied().collect();
    let records = directory.roles_of(&ids).await?;
    let verified = verify_candidates(&candidates, &records, requirement);
    Ok((candidates, verified))
}

async fn superior_scope<D: AccessDirectory>(
    directory: &D,
    admin_id: UserId,
) -> Result<Lookup, AccessError> {
    let (candidates, managers) =
        verified_assignees(directory, &[admin_id], CandidateRequirement::SubordinateManager).await?;
    if candidates.is_empty() {
        return Ok(Lookup::Empty("assigned managers"));
    }
    if managers.is_empty() {
        return Ok(Lookup::Empty("verified managers"));
    }

    let manager_ids: Vec<UserId> = managers.iter().copied().collect();
    let (candidates, users) =
        verified_assignees(directory, &manager_ids, CandidateRequirement::PlainUser).await?;
    if candidates.is_empty() {
        return Ok(Lookup::Empty("users of managers"));
    }
    if users.is_empty() {
        return Ok(Lookup::Empty("verified users"));
    }

    debug!(%admin_id, managers = managers.len(), users = users.len(), "Resolved superior manager scope");
    Ok(Lookup::Found(managers.into_iter().chain(users).collect()))
}

async fn manager_scope<D: AccessDirectory>(
    directory: &D,
    admin_id: UserId,
) -> Result<Lookup, AccessError> {
    let (candidates, users) =
        verified_assignees(directory, &[admin_id], CandidateRequirement::PlainUser).await?;
    if candidates.is_empty() {
        return Ok(Lookup::Empty("assigned users"));
    }
    if users.is_empty() {
        return Ok(Lookup::Empty("verified users"));
    }

    debug!(%admin_id, users = users.len(), "Resolved manager scope");
    Ok(Lookup::Found(users))
}

/// Loads identities and resolves scopes against a shared directory.
pub struct AccessResolver<D: AccessDirectory> {
    directory: Arc<D>,
}

impl<D: AccessDirectory> Clone for AccessResolver<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<D: AccessDirectory> AccessResolver<D> {
    /// Create a new resolver.
    #[must_use]
    pub const fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// See [`load_admin`].
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Directory` if the lookup fails.
    pub async fn load_admin(&self, user_id: UserId) -> Result<Option<Admin>, AccessError> {
        load_admin(self.directory.as_ref(), user_id).await
    }

    /// See [`resolve`].
    pub async fn resolve(&self, admin: &Admin) -> AccessScope {
        resolve(self.directory.as_ref(), admin).await
    }

    /// Loads the caller and resolves their scope in one step.
    ///
    /// # Errors
    ///
    /// Returns `AccessError::Directory` if the identity lookup fails.
    pub async fn resolve_for(
        &self,
        user_id: UserId,
    ) -> Result<Option<(Admin, AccessScope)>, AccessError> {
        let Some(admin) = self.load_admin(user_id).await? else {
            return Ok(None);
        };
        let scope = self.resolve(&admin).await;
        Ok(Some((admin, scope)))
    }
}
