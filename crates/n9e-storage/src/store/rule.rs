use chrono::Utc;
use n9e_common::codec::{join_fields, split_fields};
use n9e_common::types::AlertRule;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    QueryFilter, QueryOrder,
};

use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::Result;
use crate::store::mute::decode_json_or_default;
use crate::store::Store;

fn to_rule(m: alert_rule::Model) -> Result<AlertRule> {
    Ok(AlertRule {
        id: m.id,
        group_id: m.group_id,
        cate: m.cate,
        datasource_ids: decode_json_or_default(&m.datasource_ids)?,
        cluster: m.cluster,
        name: m.name,
        note: m.note,
        prod: m.prod,
        severity: m.severity,
        disabled: m.disabled == 1,
        prom_for_duration: m.prom_for_duration,
        prom_eval_interval: m.prom_eval_interval,
        notify_recovered: m.notify_recovered == 1,
        notify_channels: split_fields(&m.notify_channels),
        notify_groups: split_fields(&m.notify_groups),
        notify_repeat_step: m.notify_repeat_step,
        notify_max_number: m.notify_max_number,
        recover_duration: m.recover_duration,
        inhibit: m.inhibit == 1,
        callbacks: split_fields(&m.callbacks),
        runbook_url: m.runbook_url,
        append_tags: split_fields(&m.append_tags),
        annotations: decode_json_or_default(&m.annotations)?,
        rule_config: decode_json_or_default(&m.rule_config)?,
    })
}

impl Store {
    /// Inserts a rule. Rules are owned by an external system; this is for
    /// seeding and tests.
    pub async fn insert_alert_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        let now = Utc::now().timestamp();
        let am = alert_rule::ActiveModel {
            id: if rule.id > 0 { Set(rule.id) } else { NotSet },
            group_id: Set(rule.group_id),
            cate: Set(rule.cate.clone()),
            datasource_ids: Set(serde_json::to_string(&rule.datasource_ids)?),
            cluster: Set(rule.cluster.clone()),
            name: Set(rule.name.clone()),
            note: Set(rule.note.clone()),
            prod: Set(rule.prod.clone()),
            severity: Set(rule.severity),
            disabled: Set(i32::from(rule.disabled)),
            prom_for_duration: Set(rule.prom_for_duration),
            prom_eval_interval: Set(rule.prom_eval_interval),
            rule_config: Set(serde_json::to_string(&rule.rule_config)?),
            notify_recovered: Set(i32::from(rule.notify_recovered)),
            notify_channels: Set(join_fields(&rule.notify_channels)),
            notify_groups: Set(join_fields(&rule.notify_groups)),
            notify_repeat_step: Set(rule.notify_repeat_step),
            notify_max_number: Set(rule.notify_max_number),
            recover_duration: Set(rule.recover_duration),
            inhibit: Set(i32::from(rule.inhibit)),
            callbacks: Set(join_fields(&rule.callbacks)),
            runbook_url: Set(rule.runbook_url.clone()),
            append_tags: Set(join_fields(&rule.append_tags)),
            annotations: Set(serde_json::to_string(&rule.annotations)?),
            create_at: Set(now),
            update_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        to_rule(model)
    }

    pub async fn get_alert_rule(&self, id: i64) -> Result<Option<AlertRule>> {
        match Entity::find_by_id(id).one(self.db()).await? {
            Some(m) => Ok(Some(to_rule(m)?)),
            None => Ok(None),
        }
    }

    /// All rules that are not disabled.
    pub async fn list_active_alert_rules(&self) -> Result<Vec<AlertRule>> {
        let models = Entity::find()
            .filter(Column::Disabled.eq(0))
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        let mut rules = Vec::with_capacity(models.len());
        for m in models {
            let id = m.id;
            match to_rule(m) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!(rule_id = id, error = %e, "Skipping undecodable rule"),
            }
        }
        Ok(rules)
    }
}
