use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub group_id: i64,
    pub cate: String,
    pub datasource_ids: String,
    pub cluster: String,
    pub name: String,
    pub note: String,
    pub prod: String,
    pub severity: i32,
    pub disabled: i32,
    pub prom_for_duration: i64,
    pub prom_eval_interval: i64,
    pub rule_config: String,
    pub notify_recovered: i32,
    pub notify_channels: String,
    pub notify_groups: String,
    pub notify_repeat_step: i64,
    pub notify_max_number: i64,
    pub recover_duration: i64,
    pub inhibit: i32,
    pub callbacks: String,
    pub runbook_url: String,
    pub append_tags: String,
    pub annotations: String,
    pub create_at: i64,
    pub update_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
