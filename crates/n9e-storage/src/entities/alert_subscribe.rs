use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_subscribe")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub disabled: i32,
    pub group_id: i64,
    pub prod: String,
    pub cate: String,
    pub datasource_ids: String,
    pub rule_id: i64,
    pub severities: String,
    pub for_duration: i64,
    pub tags: String,
    pub redefine_severity: i32,
    pub new_severity: i32,
    pub redefine_channels: i32,
    pub new_channels: String,
    pub user_group_ids: String,
    pub redefine_webhooks: i32,
    pub webhooks: String,
    pub create_at: i64,
    pub create_by: String,
    pub update_at: i64,
    pub update_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
