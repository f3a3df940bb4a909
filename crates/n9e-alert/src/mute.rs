use chrono::{DateTime, Datelike, TimeZone};
use n9e_common::error::ValidationError;
use n9e_common::filter::{compile_all, matches_all, TagFilter};
use n9e_common::types::{AlertEvent, PROD_HOST};
use n9e_storage::store::{MuteRow, MuteTimeType, PeriodicWindow};

#[derive(Debug, Clone)]
enum MuteWindow {
    Absolute { btime: i64, etime: i64 },
    Periodic(Vec<PeriodicWindow>),
}

/// A mute with its regexes, value sets and periodic windows parsed once at
/// load time.
#[derive(Debug, Clone)]
pub struct CompiledMute {
    id: i64,
    group_id: i64,
    prod: String,
    cate: String,
    datasource_ids: Vec<i64>,
    severities: Vec<i32>,
    window: MuteWindow,
    filters: Vec<TagFilter>,
}

impl CompiledMute {
    pub fn compile(row: &MuteRow) -> Result<Self, ValidationError> {
        let window = match row.mute_time_type {
            MuteTimeType::TimeRange => {
                if row.etime <= row.btime {
                    return Err(ValidationError::new("etime", "etime must be after btime"));
                }
                MuteWindow::Absolute {
                    btime: row.btime,
                    etime: row.etime,
                }
            }
            MuteTimeType::Periodic => MuteWindow::Periodic(row.periodic_windows()?),
        };
        Ok(Self {
            id: row.id,
            group_id: row.group_id,
            prod: row.prod.clone(),
            cate: row.cate.clone(),
            datasource_ids: row.datasource_ids.clone(),
            severities: row.severities.clone(),
            window,
            filters: compile_all(&row.tags)?,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    /// Whether the time window admits unix second `t`, periodic windows
    /// being read in `tz`.
    pub fn is_active_at<Tz: TimeZone>(&self, t: i64, tz: &Tz) -> bool {
        match &self.window {
            MuteWindow::Absolute { btime, etime } => *btime <= t && t < *etime,
            MuteWindow::Periodic(windows) => {
                let Some(utc) = DateTime::from_timestamp(t, 0) else {
                    return false;
                };
                let local = utc.with_timezone(tz);
                let tod = local.time();
                let weekday = local.weekday();
                windows.iter().any(|w| w.admits(tod, weekday))
            }
        }
    }

    pub fn matches<Tz: TimeZone>(&self, event: &AlertEvent, t: i64, tz: &Tz) -> bool {
        if self.group_id != event.group_id || self.prod != event.rule_prod {
            return false;
        }
        if self.prod != PROD_HOST {
            if self.cate != event.cate {
                return false;
            }
            if !datasource_matches(&self.datasource_ids, event.datasource_id) {
                return false;
            }
        }
        if !self.severities.is_empty() && !self.severities.contains(&event.severity) {
            return false;
        }
        if !self.is_active_at(t, tz) {
            return false;
        }
        matches_all(&self.filters, &event.tags)
    }
}

fn datasource_matches(ids: &[i64], datasource_id: i64) -> bool {
    ids.is_empty() || ids.contains(&0) || ids.contains(&datasource_id)
}

/// The first mute that silences `event` at `t`.
pub fn matching_mute<'a, Tz, I>(event: &AlertEvent, mutes: I, t: i64, tz: &Tz) -> Option<&'a CompiledMute>
where
    Tz: TimeZone,
    I: IntoIterator<Item = &'a CompiledMute>,
{
    mutes.into_iter().find(|m| m.matches(event, t, tz))
}

pub fn is_muted<'a, Tz, I>(event: &AlertEvent, mutes: I, t: i64, tz: &Tz) -> bool
where
    Tz: TimeZone,
    I: IntoIterator<Item = &'a CompiledMute>,
{
    matching_mute(event, mutes, t, tz).is_some()
}
