//! `SeaORM` Entity for user_assignments table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Directed edge from a manager to a user they may act on.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "user_assignments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub manager_id: Uuid,
    pub assigned_user_id: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ManagerId",
        to = "super::users::Column::Id"
    )]
    Manager,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::AssignedUserId",
        to = "super::users::Column::Id"
    )]
    AssignedUser,
}

impl ActiveModelBehavior for ActiveModel {}
