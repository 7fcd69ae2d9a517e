//! Hierarchical access control for admin-side callers.
//!
//! # Modules
//!
//! - `types` - Role flags, tiers and the `AccessScope` set
//! - `resolver` - Identity loading and scope resolution over an `AccessDirectory`
//! - `error` - Access error types

pub mod error;
pub mod resolver;
pub mod types;


pub use error::AccessError;
pub use resolver::{
    AccessDirectory, AccessResolver, CandidateRequirement, load_admin, resolve, verify_candidates,
};
pub use types::{AccessScope, Admin, Assignment, RoleFlags, RoleTier, UserRoles};
