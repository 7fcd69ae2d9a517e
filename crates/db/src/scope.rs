//! Applies an `AccessScope` to admin-facing queries.

use sea_orm::{ColumnTrait, QueryFilter};
use uuid::Uuid;

use meridian_core::access::AccessScope;

/// Id no row can have; filtering on it yields an empty result.
pub const NO_ACCESS_SENTINEL: Uuid = Uuid::nil();

/// Restricts a query to rows whose `column` holds an accessible user id.
pub trait ScopedSelect: QueryFilter + Sized {
    /// `All` adds no condition, `Only` adds `column IN (..)`, `Nothing`
    /// adds `column = <nil uuid>`.
    #[must_use]
    fn scoped<C: ColumnTrait>(self, column: C, scope: &AccessScope) -> Self {
        match scope {
            AccessScope::All => self,
            AccessScope::Only(ids) => self.filter(column.is_in(ids.iter().map(|id| id.into_inner()))),
            AccessScope::Nothing => self.filter(column.eq(NO_ACCESS_SENTINEL)),
        }
    }
}

impl<Q: QueryFilter + Sized> ScopedSelect for Q {}
