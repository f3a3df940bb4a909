use n9e_common::types::{NotificationRecord, NotifyStatus};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use crate::entities::notification_record::{self, Column, Entity};
use crate::error::Result;
use crate::store::Store;

/// Filter for notification record queries.
#[derive(Debug, Clone, Default)]
pub struct NotificationRecordFilter {
    pub event_id: Option<i64>,
    pub sub_id: Option<i64>,
    pub channel: Option<String>,
    pub status: Option<NotifyStatus>,
}

fn to_record(m: notification_record::Model) -> NotificationRecord {
    NotificationRecord {
        id: m.id,
        event_id: m.event_id,
        sub_rule_id: m.sub_id,
        channel: m.channel,
        target: m.target,
        // unknown codes only come from foreign writers; treat them as failures
        status: NotifyStatus::from_code(m.status).unwrap_or(NotifyStatus::Failure),
        details: m.details,
        created_at: m.created_at,
    }
}

impl Store {
    /// Inserts one notification record and returns its id.
    pub async fn insert_notification_record(&self, record: &NotificationRecord) -> Result<i64> {
        let am = notification_record::ActiveModel {
            id: NotSet,
            event_id: Set(record.event_id),
            sub_id: Set(record.sub_rule_id),
            channel: Set(record.channel.clone()),
            status: Set(record.status.code()),
            target: Set(record.target.clone()),
            details: Set(record.details.clone()),
            created_at: Set(record.created_at),
        };
        let model = am.insert(self.db()).await?;
        Ok(model.id)
    }

    pub async fn list_notification_records(
        &self,
        filter: &NotificationRecordFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<NotificationRecord>> {
        let rows = filtered(filter)
            .order_by(Column::Id, Order::Asc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_record).collect())
    }

    pub async fn count_notification_records(&self, filter: &NotificationRecordFilter) -> Result<u64> {
        Ok(filtered(filter).count(self.db()).await?)
    }
}

fn filtered(filter: &NotificationRecordFilter) -> sea_orm::Select<Entity> {
    let mut q = Entity::find();
    if let Some(event_id) = filter.event_id {
        q = q.filter(Column::EventId.eq(event_id));
    }
    if let Some(sub_id) = filter.sub_id {
        q = q.filter(Column::SubId.eq(sub_id));
    }
    if let Some(channel) = &filter.channel {
        q = q.filter(Column::Channel.eq(channel.as_str()));
    }
    if let Some(status) = filter.status {
        q = q.filter(Column::Status.eq(status.code()));
    }
    q
}
