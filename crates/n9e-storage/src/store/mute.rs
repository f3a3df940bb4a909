use chrono::{NaiveTime, Utc, Weekday};
use n9e_common::error::ValidationError;
use n9e_common::filter::{compile_all, TagFilterSpec};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, EntityTrait, Order,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

use crate::entities::alert_mute::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

/// Absolute mutes are swept this many seconds after `etime`.
pub const EXPIRED_MUTE_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuteTimeType {
    /// `btime <= t < etime`.
    #[default]
    TimeRange,
    /// Weekly schedule from `periodic_mutes`.
    Periodic,
}

impl MuteTimeType {
    pub fn code(self) -> i32 {
        match self {
            MuteTimeType::TimeRange => 0,
            MuteTimeType::Periodic => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MuteTimeType::TimeRange),
            1 => Some(MuteTimeType::Periodic),
            _ => None,
        }
    }
}

/// One entry of the `periodic_mutes` JSON column.
///
/// `enable_stime` and `enable_etime` may each hold several space separated
/// `HH:MM` values, paired by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicMute {
    pub enable_stime: String,
    pub enable_etime: String,
    /// Space separated weekday numbers, 0 = Sunday.
    pub enable_days_of_week: String,
}

impl PeriodicMute {
    pub fn new(stime: &str, etime: &str, days: &str) -> Self {
        Self {
            enable_stime: stime.to_string(),
            enable_etime: etime.to_string(),
            enable_days_of_week: days.to_string(),
        }
    }
}

/// A parsed periodic window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// `start == end` or `00:00`..`23:59`.
    pub whole_day: bool,
    /// Indexed by days from Sunday.
    pub days: [bool; 7],
}

impl PeriodicWindow {
    /// Window admits a local time-of-day on a local weekday.
    pub fn admits(&self, tod: NaiveTime, weekday: Weekday) -> bool {
        if !self.days[weekday.num_days_from_sunday() as usize] {
            return false;
        }
        self.whole_day || (self.start <= tod && tod < self.end)
    }
}

fn parse_hhmm(raw: &str) -> std::result::Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| {
        ValidationError::new("periodic_mutes", format!("'{raw}' is not HH:MM"))
    })
}

fn parse_days(raw: &str) -> std::result::Result<[bool; 7], ValidationError> {
    let mut days = [false; 7];
    for token in raw.split_whitespace() {
        match token.parse::<usize>() {
            Ok(d) if d < 7 => days[d] = true,
            _ => {
                return Err(ValidationError::new(
                    "periodic_mutes",
                    format!("'{token}' is not a weekday (0-6)"),
                ))
            }
        }
    }
    if !days.iter().any(|d| *d) {
        return Err(ValidationError::new(
            "periodic_mutes",
            "enable_days_of_week is blank",
        ));
    }
    Ok(days)
}

fn parse_periodic(entry: &PeriodicMute) -> std::result::Result<Vec<PeriodicWindow>, ValidationError> {
    let starts: Vec<&str> = entry.enable_stime.split_whitespace().collect();
    let ends: Vec<&str> = entry.enable_etime.split_whitespace().collect();
    if starts.is_empty() || starts.len() != ends.len() {
        return Err(ValidationError::new(
            "periodic_mutes",
            "enable_stime and enable_etime must pair up",
        ));
    }
    let days = parse_days(&entry.enable_days_of_week)?;

    let midnight = NaiveTime::MIN;
    let last_minute = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(midnight);

    starts
        .iter()
        .zip(ends.iter())
        .map(|(s, e)| {
            let start = parse_hhmm(s)?;
            let end = parse_hhmm(e)?;
            let whole_day = start == end || (start == midnight && end == last_minute);
            if !whole_day && start > end {
                return Err(ValidationError::new(
                    "periodic_mutes",
                    format!("window {s}-{e} wraps past midnight"),
                ));
            }
            Ok(PeriodicWindow {
                start,
                end,
                whole_day,
                days,
            })
        })
        .collect()
}

/// A mute as stored in `alert_mute`, with JSON columns decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MuteRow {
    pub id: i64,
    pub group_id: i64,
    pub note: String,
    pub cate: String,
    pub prod: String,
    /// Empty or containing 0 means every datasource.
    pub datasource_ids: Vec<i64>,
    pub tags: Vec<TagFilterSpec>,
    pub cause: String,
    pub btime: i64,
    pub etime: i64,
    pub disabled: bool,
    pub mute_time_type: MuteTimeType,
    pub periodic_mutes: Vec<PeriodicMute>,
    /// Empty means every severity.
    pub severities: Vec<i32>,
    pub create_at: i64,
    pub create_by: String,
    pub update_at: i64,
    pub update_by: String,
}

impl MuteRow {
    pub fn verify(&self) -> std::result::Result<(), ValidationError> {
        match self.mute_time_type {
            MuteTimeType::TimeRange => {
                if self.etime <= self.btime {
                    return Err(ValidationError::new("etime", "etime must be after btime"));
                }
            }
            MuteTimeType::Periodic => {
                self.periodic_windows()?;
            }
        }
        compile_all(&self.tags)?;
        Ok(())
    }

    pub fn periodic_windows(&self) -> std::result::Result<Vec<PeriodicWindow>, ValidationError> {
        if self.periodic_mutes.is_empty() {
            return Err(ValidationError::new("periodic_mutes", "periodic mute has no windows"));
        }
        let mut windows = Vec::new();
        for entry in &self.periodic_mutes {
            windows.extend(parse_periodic(entry)?);
        }
        Ok(windows)
    }
}

fn to_row(m: alert_mute::Model) -> Result<MuteRow> {
    let mute_time_type = MuteTimeType::from_code(m.mute_time_type).ok_or_else(|| {
        ValidationError::new(
            "mute_time_type",
            format!("unknown mute_time_type {}", m.mute_time_type),
        )
    })?;
    Ok(MuteRow {
        id: m.id,
        group_id: m.group_id,
        note: m.note,
        cate: m.cate,
        prod: m.prod,
        datasource_ids: decode_json_or_default(&m.datasource_ids)?,
        tags: decode_json_or_default(&m.tags)?,
        cause: m.cause,
        btime: m.btime,
        etime: m.etime,
        disabled: m.disabled == 1,
        mute_time_type,
        periodic_mutes: decode_json_or_default(&m.periodic_mutes)?,
        severities: decode_json_or_default(&m.severities)?,
        create_at: m.create_at,
        create_by: m.create_by,
        update_at: m.update_at,
        update_by: m.update_by,
    })
}

pub(crate) fn decode_json_or_default<T>(raw: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(raw)?)
}

impl Store {
    /// Validates and inserts a mute. Regex filters and periodic windows
    /// must parse.
    pub async fn insert_mute(&self, row: &MuteRow) -> Result<MuteRow> {
        row.verify()?;
        let now = Utc::now().timestamp();
        let am = alert_mute::ActiveModel {
            id: NotSet,
            group_id: Set(row.group_id),
            note: Set(row.note.clone()),
            cate: Set(row.cate.clone()),
            prod: Set(row.prod.clone()),
            datasource_ids: Set(serde_json::to_string(&row.datasource_ids)?),
            tags: Set(serde_json::to_string(&row.tags)?),
            cause: Set(row.cause.clone()),
            btime: Set(row.btime),
            etime: Set(row.etime),
            disabled: Set(i32::from(row.disabled)),
            mute_time_type: Set(row.mute_time_type.code()),
            periodic_mutes: Set(serde_json::to_string(&row.periodic_mutes)?),
            severities: Set(serde_json::to_string(&row.severities)?),
            create_at: Set(now),
            create_by: Set(row.create_by.clone()),
            update_at: Set(now),
            update_by: Set(row.update_by.clone()),
        };
        let model = am.insert(self.db()).await?;
        tracing::info!(mute_id = model.id, group_id = model.group_id, "Mute created");
        to_row(model)
    }

    pub async fn get_mute(&self, id: i64) -> Result<Option<MuteRow>> {
        match Entity::find_by_id(id).one(self.db()).await? {
            Some(m) => Ok(Some(to_row(m)?)),
            None => Ok(None),
        }
    }

    /// Enabled mutes. Rows whose JSON columns no longer decode are skipped
    /// with a warning.
    pub async fn list_enabled_mutes(&self) -> Result<Vec<MuteRow>> {
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
                Err(e) => tracing::warn!(mute_id = id, error = %e, "Skipping undecodable mute"),
            }
        }
        Ok(rows)
    }

    pub async fn delete_mute(&self, id: i64) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn set_mute_disabled(&self, id: i64, disabled: bool) -> Result<MuteRow> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "alert_mute",
                id: id.to_string(),
            })?;
        let mut am: alert_mute::ActiveModel = model.into();
        am.disabled = Set(i32::from(disabled));
        am.update_at = Set(Utc::now().timestamp());
        to_row(am.update(self.db()).await?)
    }

    /// Deletes absolute mutes whose `etime` is more than 30 seconds before
    /// `now`. Returns the number removed.
    pub async fn sweep_expired_mutes(&self, now: i64) -> Result<u64> {
        let res = Entity::delete_many()
            .filter(Column::MuteTimeType.eq(MuteTimeType::TimeRange.code()))
            .filter(Column::Etime.lt(now - EXPIRED_MUTE_GRACE_SECS))
            .exec(self.db())
            .await?;
        if res.rows_affected > 0 {
            tracing::info!(removed = res.rows_affected, "Swept expired mutes");
        }
        Ok(res.rows_affected)
    }
}
