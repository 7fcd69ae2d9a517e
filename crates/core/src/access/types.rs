//! Role and scope types for hierarchical access control.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use meridian_shared::types::UserId;

use super::error::AccessError;

/// Role flags stored on every `users` row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    /// Admin flag.
    pub is_admin: bool,
    /// Manager flag.
    pub is_manager: bool,
    /// Superior manager flag.
    pub is_superiormanager: bool,
}

impl RoleFlags {
    /// A plain client: every role flag is false.
    #[must_use]
    pub const fn is_plain_user(self) -> bool {
        !self.is_admin && !self.is_manager && !self.is_superiormanager
    }

    /// A manager that may sit under a superior manager.
    #[must_use]
    pub const fn is_subordinate_manager(self) -> bool {
        self.is_manager && !self.is_superiormanager
    }

    /// Which tier these flags resolve to. Rules are evaluated in order.
    #[must_use]
    pub const fn tier(self) -> RoleTier {
        if self.is_admin && !self.is_superiormanager && !self.is_manager {
            RoleTier::FullAdmin
        } else if self.is_admin && self.is_superiormanager {
            RoleTier::SuperiorManager
        } else if self.is_manager {
            RoleTier::Manager
        } else {
            RoleTier::None
        }
    }
}

/// Role tier of an admin-side caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTier {
    /// Unrestricted access to every user.
    FullAdmin,
    /// Manages managers and, transitively, their users.
    SuperiorManager,
    /// Manages a direct set of users.
    Manager,
    /// No admin-side role.
    None,
}

/// Verified identity of the caller, loaded fresh from `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    /// User ID.
    pub id: UserId,
    /// Role flags as currently stored.
    #[serde(flatten)]
    pub roles: RoleFlags,
}

impl Admin {
    /// Creates an admin record.
    #[must_use]
    pub const fn new(id: UserId, roles: RoleFlags) -> Self {
        Self { id, roles }
    }

    /// Role tier of this admin.
    #[must_use]
    pub const fn tier(&self) -> RoleTier {
        self.roles.tier()
    }
}

/// Role flags of an arbitrary user, as returned by a directory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRoles {
    /// User ID.
    pub id: UserId,
    /// Role flags.
    pub roles: RoleFlags,
}

/// Directed assignment edge: `manager_id` may act on `assigned_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Manager (or superior manager) side of the edge.
    pub manager_id: UserId,
    /// User the manager may act on.
    pub assigned_user_id: UserId,
}

/// The set of users a caller may act upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_ids", rename_all = "snake_case")]
pub enum AccessScope {
    /// No filter: every user.
    All,
    /// Exactly these users.
    Only(BTreeSet<UserId>),
    /// No users at all.
    Nothing,
}

impl AccessScope {
    /// Scope containing only the caller.
    #[must_use]
    pub fn only_self(id: UserId) -> Self {
        Self::Only(BTreeSet::from([id]))
    }

    /// Whether the caller may act on `target`.
    #[must_use]
    pub fn permits(&self, target: UserId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&target),
            Self::Nothing => false,
        }
    }

    /// Guard run immediately before any write that targets a user.
    pub fn ensure_permits(&self, target: UserId) -> Result<(), AccessError> {
        if self.permits(target) {
            Ok(())
        } else {
            Err(AccessError::Denied(target))
        }
    }

    /// Explicit id list, `None` for the unfiltered scope.
    #[must_use]
    pub fn ids(&self) -> Option<Vec<UserId>> {
        match self {
            Self::All => None,
            Self::Only(ids) => Some(ids.iter().copied().collect()),
            Self::Nothing => Some(Vec::new()),
        }
    }

    /// Whether the scope is unfiltered.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const fn flags(is_admin: bool, is_manager: bool, is_superiormanager: bool) -> RoleFlags {
        RoleFlags {
            is_admin,
            is_manager,
            is_superiormanager,
        }
    }

    #[rstest]
    #[case(flags(true, false, false), RoleTier::FullAdmin)]
    #[case(flags(true, false, true), RoleTier::SuperiorManager)]
    #[case(flags(true, true, true), RoleTier::SuperiorManager)]
    #[case(flags(true, true, false), RoleTier::Manager)]
    #[case(flags(false, true, false), RoleTier::Manager)]
    #[case(flags(false, true, true), RoleTier::Manager)]
    #[case(flags(false, false, true), RoleTier::None)]
    #[case(flags(false, false, false), RoleTier::None)]
    fn test_tier_rules(#[case] roles: RoleFlags, #[case] expected: RoleTier) {
        assert_eq!(roles.tier(), expected);
    }

    #[test]
    fn test_scope_permits() {
        let a = UserId::new();
        let b = UserId::new();

        assert!(AccessScope::All.permits(a));
        assert!(!AccessScope::Nothing.permits(a));
        assert!(AccessScope::only_self(a).permits(a));
        assert!(!AccessScope::only_self(a).permits(b));
    }

    #[test]
    fn test_ensure_permits_denies_outside_scope() {
        let a = UserId::new();
        let b = UserId::new();
        let err = AccessScope::only_self(a).ensure_permits(b).unwrap_err();
        assert!(matches!(err, AccessError::Denied(id) if id == b));
    }

    #[test]
    fn test_scope_ids() {
        let a = UserId::new();
        assert_eq!(AccessScope::All.ids(), None);
        assert_eq!(AccessScope::Nothing.ids(), Some(vec![]));
        assert_eq!(AccessScope::only_self(a).ids(), Some(vec![a]));
    }

    #[test]
    fn test_admin_serializes_flat() {
        let admin = Admin::new(UserId::new(), flags(true, false, false));
        let json = serde_json::to_value(admin).unwrap();
        assert_eq!(json["is_admin"], true);
        assert_eq!(json["is_manager"], false);
    }
}
