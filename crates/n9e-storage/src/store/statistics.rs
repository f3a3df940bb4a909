use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;

use crate::entities::{alert_cur_event, alert_his_event};
use crate::error::Result;
use crate::store::Store;

/// Event counters for the dashboard header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStatistics {
    /// Current events.
    pub total: u64,
    /// Current events that started more than 24 hours ago.
    pub total_24_ago: u64,
    /// Fires recorded since local midnight.
    pub total_today: u64,
    /// Fires recorded since local Monday 00:00.
    pub total_week: u64,
}

/// Start of the calendar day containing `now`, in `now`'s zone.
pub fn day_start<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    local_midnight(now, 0)
}

/// Monday 00:00 of the week containing `now`, in `now`'s zone.
pub fn week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    local_midnight(now, i64::from(now.weekday().num_days_from_monday()))
}

fn local_midnight<Tz: TimeZone>(now: &DateTime<Tz>, days_back: i64) -> i64 {
    let date = now.date_naive() - Duration::days(days_back);
    let naive = date.and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp(),
        // midnight skipped by a DST jump; fall back to the elapsed seconds
        None => {
            let elapsed = i64::from(now.time().num_seconds_from_midnight());
            now.timestamp() - elapsed - days_back * 86_400
        }
    }
}

impl Store {
    /// Day and week boundaries are taken in `now`'s time zone.
    pub async fn statistics<Tz>(&self, now: DateTime<Tz>) -> Result<EventStatistics>
    where
        Tz: TimeZone,
        Tz::Offset: Send + Sync,
    {
        let ts = now.timestamp();
        let today = day_start(&now);
        let week = week_start(&now);

        let total = alert_cur_event::Entity::find().count(self.db()).await?;

        let total_24_ago = alert_cur_event::Entity::find()
            .filter(alert_cur_event::Column::TriggerTime.lt(ts - 86_400))
            .count(self.db())
            .await?;

        let total_today = alert_his_event::Entity::find()
            .filter(alert_his_event::Column::TriggerTime.gte(today))
            .filter(alert_his_event::Column::IsRecovered.eq(0))
            .count(self.db())
            .await?;

        let total_week = alert_his_event::Entity::find()
            .filter(alert_his_event::Column::TriggerTime.gte(week))
            .filter(alert_his_event::Column::IsRecovered.eq(0))
            .count(self.db())
            .await?;

        Ok(EventStatistics {
            total,
            total_24_ago,
            total_today,
            total_week,
        })
    }
}
