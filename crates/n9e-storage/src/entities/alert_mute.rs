use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_mute")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub group_id: i64,
    pub note: String,
    pub cate: String,
    pub prod: String,
    pub datasource_ids: String,
    pub tags: String,
    pub cause: String,
    pub btime: i64,
    pub etime: i64,
    pub disabled: i32,
    pub mute_time_type: i32,
    pub periodic_mutes: String,
    pub severities: String,
    pub create_at: i64,
    pub create_by: String,
    pub update_at: i64,
    pub update_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
