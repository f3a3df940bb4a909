use chrono::Utc;
use n9e_common::codec::{join_fields, parse_ids, split_fields};
use n9e_common::error::ValidationError;
use n9e_common::filter::{compile_all, TagFilterSpec};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

use crate::entities::alert_subscribe::{self, Column, Entity};
use crate::error::Result;
use crate::store::mute::decode_json_or_default;
use crate::store::Store;

/// A subscription as stored in `alert_subscribe`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRow {
    pub id: i64,
    pub name: String,
    pub disabled: bool,
    pub group_id: i64,
    pub prod: String,
    pub cate: String,
    pub datasource_ids: Vec<i64>,
    /// 0 subscribes to every rule.
    pub rule_id: i64,
    pub severities: Vec<i32>,
    /// Seconds an event must have been firing before it is forwarded.
    pub for_duration: i64,
    pub tags: Vec<TagFilterSpec>,
    pub redefine_severity: bool,
    pub new_severity: i32,
    pub redefine_channels: bool,
    pub new_channels: Vec<String>,
    /// Space separated user group ids, e.g. `"7 8"`.
    pub user_group_ids: String,
    pub redefine_webhooks: bool,
    pub webhooks: Vec<String>,
    pub create_at: i64,
    pub create_by: String,
    pub update_at: i64,
    pub update_by: String,
}

impl SubscribeRow {
    pub fn verify(&self) -> std::result::Result<(), ValidationError> {
        if self.rule_id == 0 && self.tags.is_empty() {
            return Err(ValidationError::new(
                "rule_id",
                "either rule_id or tags must be set",
            ));
        }
        parse_ids("user_group_ids", &self.user_group_ids)?;
        if self.redefine_severity && !(1..=3).contains(&self.new_severity) {
            return Err(ValidationError::new(
                "new_severity",
                format!("severity {} out of range", self.new_severity),
            ));
        }
        compile_all(&self.tags)?;
        Ok(())
    }

    /// Group ids from `user_group_ids` as the notify-group strings events
    /// carry.
    pub fn user_groups(&self) -> Vec<String> {
        split_fields(&self.user_group_ids)
    }
}

fn to_row(m: alert_subscribe::Model) -> Result<SubscribeRow> {
    Ok(SubscribeRow {
        id: m.id,
        name: m.name,
        disabled: m.disabled == 1,
        group_id: m.group_id,
        prod: m.prod,
        cate: m.cate,
        datasource_ids: decode_json_or_default(&m.datasource_ids)?,
        rule_id: m.rule_id,
        severities: decode_json_or_default(&m.severities)?,
        for_duration: m.for_duration,
        tags: decode_json_or_default(&m.tags)?,
        redefine_severity: m.redefine_severity == 1,
        new_severity: m.new_severity,
        redefine_channels: m.redefine_channels == 1,
        new_channels: split_fields(&m.new_channels),
        user_group_ids: m.user_group_ids,
        redefine_webhooks: m.redefine_webhooks == 1,
        webhooks: decode_json_or_default(&m.webhooks)?,
        create_at: m.create_at,
        create_by: m.create_by,
        update_at: m.update_at,
        update_by: m.update_by,
    })
}

impl Store {
    pub async fn insert_subscription(&self, row: &SubscribeRow) -> Result<SubscribeRow> {
        row.verify()?;
        let now = Utc::now().timestamp();
        let am = alert_subscribe::ActiveModel {
            id: NotSet,
            name: Set(row.name.clone()),
            disabled: Set(i32::from(row.disabled)),
            group_id: Set(row.group_id),
            prod: Set(row.prod.clone()),
            cate: Set(row.cate.clone()),
            datasource_ids: Set(serde_json::to_string(&row.datasource_ids)?),
            rule_id: Set(row.rule_id),
            severities: Set(serde_json::to_string(&row.severities)?),
            for_duration: Set(row.for_duration),
            tags: Set(serde_json::to_string(&row.tags)?),
            redefine_severity: Set(i32::from(row.redefine_severity)),
            new_severity: Set(row.new_severity),
            redefine_channels: Set(i32::from(row.redefine_channels)),
            new_channels: Set(join_fields(&row.new_channels)),
            user_group_ids: Set(join_fields(&split_fields(&row.user_group_ids))),
            redefine_webhooks: Set(i32::from(row.redefine_webhooks)),
            webhooks: Set(serde_json::to_string(&row.webhooks)?),
            create_at: Set(now),
            create_by: Set(row.create_by.clone()),
            update_at: Set(now),
            update_by: Set(row.update_by.clone()),
        };
        let model = am.insert(self.db()).await?;
        tracing::info!(sub_id = model.id, rule_id = model.rule_id, "Subscription created");
        to_row(model)
    }

    pub async fn get_subscription(&self, id: i64) -> Result<Option<SubscribeRow>> {
        match Entity::find_by_id(id).one(self.db()).await? {
            Some(m) => Ok(Some(to_row(m)?)),
            None => Ok(None),
        }
    }

    /// Enabled subscriptions. Undecodable rows are skipped with a warning.
    pub async fn list_enabled_subscriptions(&self) -> Result<Vec<SubscribeRow>> {
        let models = Entity::find()
            .filter(Column::Disabled.eq(0))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        let mut rows = Vec::with_capacity(models.len());
        for m in models {
            let id = m.id;
            match to_row(m) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    tracing::warn!(sub_id = id, error = %e, "Skipping undecodable subscription")
                }
            }
        }
        Ok(rows)
    }

    pub async fn delete_subscription(&self, id: i64) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
