use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_his_event")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub is_recovered: i32,
    pub cate: String,
    pub cluster: String,
    pub datasource_id: i64,
    pub group_id: i64,
    pub group_name: String,
    pub hash: String,
    pub rule_id: i64,
    pub rule_name: String,
    pub rule_note: String,
    pub rule_prod: String,
    pub rule_config: String,
    pub severity: i32,
    pub prom_for_duration: i64,
    pub prom_eval_interval: i64,
    pub callbacks: String,
    pub runbook_url: String,
    pub notify_recovered: i32,
    pub notify_channels: String,
    pub notify_groups: String,
    pub notify_repeat_step: i64,
    pub notify_max_number: i64,
    pub notify_cur_number: i64,
    pub recover_duration: i64,
    pub target_ident: String,
    pub target_note: String,
    pub first_trigger_time: i64,
    pub trigger_time: i64,
    pub trigger_value: String,
    pub annotations: String,
    pub tags: String,
    pub status: i32,
    pub claimant: String,
    pub sub_rule_id: i64,
    pub last_eval_time: i64,
    pub last_sent_time: i64,
    pub recover_time: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
