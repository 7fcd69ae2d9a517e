//! `SeaORM` Entity for users table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Same id as the hosted auth user.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub is_manager: bool,
    pub is_superiormanager: bool,
    pub kyc_status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::kyc_verifications::Entity")]
    KycVerifications,
    #[sea_orm(has_many = "super::transfers::Entity")]
    Transfers,
    #[sea_orm(has_many = "super::taxes::Entity")]
    Taxes,
}

impl Related<super::kyc_verifications::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KycVerifications.def()
    }
}

impl Related<super::transfers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transfers.def()
    }
}

impl Related<super::taxes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Taxes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
