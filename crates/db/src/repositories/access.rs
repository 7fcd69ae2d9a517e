//! `AccessDirectory` over the `users` and `user_assignments` tables.

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use meridian_core::access::{AccessDirectory, AccessError, RoleFlags, UserRoles};
use meridian_shared::types::UserId;

use crate::entities::{user_assignments, users};

fn directory_err(err: DbErr) -> AccessError {
    AccessError::Directory(err.to_string())
}

fn uuids(ids: &[UserId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.into_inner()).collect()
}

const fn roles(m: &users::Model) -> RoleFlags {
    RoleFlags {
        is_admin: m.is_admin,
        is_manager: m.is_manager,
        is_superiormanager: m.is_superiormanager,
    }
}

/// Reads role flags and assignment edges for the access resolver.
#[derive(Debug, Clone)]
pub struct AccessRepository {
    db: Arc<DatabaseConnection>,
}

impl AccessRepository {
    /// Creates a new access repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl AccessDirectory for AccessRepository {
    async fn find_roles(&self, user_id: UserId) -> Result<Option<RoleFlags>, AccessError> {
        let user = users::Entity::find_by_id(user_id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(directory_err)?;
        Ok(user.as_ref().map(roles))
    }

    async fn assigned_user_ids(&self, manager_ids: &[UserId]) -> Result<Vec<UserId>, AccessError> {
        if manager_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = user_assignments::Entity::find()
            .select_only()
            .column(user_assignments::Column::AssignedUserId)
            .filter(user_assignments::Column::ManagerId.is_in(uuids(manager_ids)))
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(directory_err)?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn roles_of(&self, user_ids: &[UserId]) -> Result<Vec<UserRoles>, AccessError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = users::Entity::find()
            .filter(users::Column::Id.is_in(uuids(user_ids)))
            .all(self.db.as_ref())
            .await
            .map_err(directory_err)?;
        Ok(rows
            .iter()
            .map(|m| UserRoles {
                id: UserId::from_uuid(m.id),
                roles: roles(m),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use meridian_core::access::{AccessResolver, AccessScope};
    use sea_orm::prelude::DateTimeWithTimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn user(id: Uuid, is_admin: bool, is_manager: bool, is_superiormanager: bool) -> users::Model {
        let now: DateTimeWithTimeZone = Utc::now().into();
        users::Model {
            id,
            email: format!("{id}@example.com"),
            full_name: None,
            is_admin,
            is_manager,
            is_superiormanager,
            kyc_status: "not_submitted".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn assigned(id: Uuid) -> BTreeMap<String, sea_orm::Value> {
        BTreeMap::from([("assigned_user_id".to_string(), id.into())])
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_the_database() {
        // No results queued: any query would error.
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = AccessRepository::new(Arc::new(db));
        assert!(repo.assigned_user_ids(&[]).await.unwrap().is_empty());
        assert!(repo.roles_of(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manager_with_one_assignment_resolves_to_self_and_user() {
        let manager = Uuid::now_v7();
        let client = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user(manager, false, true, false)]])
            .append_query_results([vec![assigned(client)]])
            .append_query_results([vec![user(client, false, false, false)]])
            .into_connection();

        let resolver = AccessResolver::new(Arc::new(AccessRepository::new(Arc::new(db))));
        let (admin, scope) = resolver
            .resolve_for(UserId::from_uuid(manager))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(admin.id, UserId::from_uuid(manager));
        assert_eq!(
            scope,
            AccessScope::Only([manager, client].into_iter().map(UserId::from_uuid).collect())
        );
    }

    #[tokio::test]
    async fn test_query_error_surfaces_as_directory_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection reset".into())])
            .into_connection();
        let repo = AccessRepository::new(Arc::new(db));
        assert!(matches!(
            repo.find_roles(UserId::new()).await,
            Err(AccessError::Directory(_))
        ));
    }
}
