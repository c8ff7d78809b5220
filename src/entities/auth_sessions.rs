use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_sessions")]
pub struct Model {
    /// Random bearer token (64-char hex string)
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,

    #[sea_orm(indexed)]
    pub account_id: String,

    pub created_at: String,

    pub expires_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
