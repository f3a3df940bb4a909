use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::{format_value, parse_append_tags};
use crate::labels::LabelSet;

pub const PROD_HOST: &str = "host";
pub const PROD_METRIC: &str = "metric";
pub const PROD_LOG: &str = "log";

pub const SEVERITY_CRITICAL: i32 = 1;
pub const SEVERITY_WARNING: i32 = 2;
pub const SEVERITY_INFO: i32 = 3;

pub const STATUS_NORMAL: i32 = 0;
pub const STATUS_MUTED: i32 = 1;

/// Evaluation interval used when a rule leaves it unset.
pub const DEFAULT_EVAL_INTERVAL_SECS: i64 = 15;

/// Snapshot of an alert rule as seen by the lifecycle engine.
///
/// Rules are owned elsewhere; the engine reads them through a rule source
/// and never writes them back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub group_id: i64,
    pub cate: String,
    pub datasource_ids: Vec<i64>,
    pub cluster: String,
    /// Template.
    pub name: String,
    /// Template.
    pub note: String,
    pub prod: String,
    pub severity: i32,
    pub disabled: bool,
    /// Seconds a condition must hold before the event is born.
    pub prom_for_duration: i64,
    pub prom_eval_interval: i64,
    pub notify_recovered: bool,
    pub notify_channels: Vec<String>,
    pub notify_groups: Vec<String>,
    /// Minutes between repeat notifications, 0 disables repeats.
    pub notify_repeat_step: i64,
    /// 0 means unlimited.
    pub notify_max_number: i64,
    /// Seconds of uninterrupted non-firing before recovery.
    pub recover_duration: i64,
    /// Within one evaluation, a firing point suppresses lower-severity
    /// points that carry the same labels.
    pub inhibit: bool,
    pub callbacks: Vec<String>,
    pub runbook_url: String,
    pub append_tags: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub rule_config: serde_json::Value,
}

impl AlertRule {
    /// Evaluation interval in seconds; non-positive values fall back to 15.
    pub fn eval_interval(&self) -> i64 {
        if self.prom_eval_interval <= 0 {
            DEFAULT_EVAL_INTERVAL_SECS
        } else {
            self.prom_eval_interval
        }
    }

    /// Parsed `append_tags` pairs, values still unrendered.
    pub fn append_tag_pairs(&self) -> Vec<(String, String)> {
        parse_append_tags(&self.append_tags)
    }
}

/// One evaluator observation for a single label set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub rule_id: i64,
    /// 0 when the rule is not bound to a datasource.
    pub datasource_id: i64,
    pub labels: LabelSet,
    pub value: f64,
    pub is_firing: bool,
    /// Unix seconds of the evaluation.
    pub timestamp: i64,
    /// Severity of the query that produced the point; 0 uses the rule's.
    pub severity: i32,
}

impl EvalResult {
    pub fn fire(rule_id: i64, labels: LabelSet, value: f64, timestamp: i64) -> Self {
        Self {
            rule_id,
            datasource_id: 0,
            labels,
            value,
            is_firing: true,
            timestamp,
            severity: 0,
        }
    }

    pub fn quiet(rule_id: i64, labels: LabelSet, timestamp: i64) -> Self {
        Self {
            rule_id,
            datasource_id: 0,
            labels,
            value: 0.0,
            is_firing: false,
            timestamp,
            severity: 0,
        }
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = severity;
        self
    }

    /// The point's own severity, or the rule default when it has none.
    pub fn severity_for(&self, rule: &AlertRule) -> i32 {
        if self.severity > 0 {
            self.severity
        } else {
            rule.severity
        }
    }

    pub fn trigger_value(&self) -> String {
        format_value(self.value)
    }
}

/// In-memory alert event.
///
/// The same shape serves current and historical rows; `is_recovered` and
/// `recover_time` are only meaningful for history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: i64,
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
    pub rule_config: serde_json::Value,
    pub severity: i32,
    pub prom_for_duration: i64,
    pub prom_eval_interval: i64,
    pub callbacks: Vec<String>,
    pub runbook_url: String,
    pub notify_recovered: bool,
    pub notify_channels: Vec<String>,
    pub notify_groups: Vec<String>,
    pub notify_repeat_step: i64,
    pub notify_max_number: i64,
    pub notify_cur_number: i64,
    pub recover_duration: i64,
    pub target_ident: String,
    pub target_note: String,
    pub trigger_time: i64,
    pub first_trigger_time: i64,
    pub trigger_value: String,
    pub annotations: BTreeMap<String, String>,
    pub tags: LabelSet,
    pub status: i32,
    pub claimant: String,
    pub sub_rule_id: i64,
    pub last_eval_time: i64,
    pub last_sent_time: i64,
    pub is_recovered: bool,
    pub recover_time: i64,
}

impl AlertEvent {
    /// A firing event carrying the rule snapshot, before templates are
    /// rendered.
    pub fn from_rule(rule: &AlertRule, hash: String, result: &EvalResult) -> Self {
        Self {
            cate: rule.cate.clone(),
            cluster: rule.cluster.clone(),
            datasource_id: result.datasource_id,
            group_id: rule.group_id,
            hash,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_note: rule.note.clone(),
            rule_prod: rule.prod.clone(),
            rule_config: rule.rule_config.clone(),
            severity: result.severity_for(rule),
            prom_for_duration: rule.prom_for_duration,
            prom_eval_interval: rule.eval_interval(),
            callbacks: rule.callbacks.clone(),
            runbook_url: rule.runbook_url.clone(),
            notify_recovered: rule.notify_recovered,
            notify_channels: rule.notify_channels.clone(),
            notify_groups: rule.notify_groups.clone(),
            notify_repeat_step: rule.notify_repeat_step,
            notify_max_number: rule.notify_max_number,
            recover_duration: rule.recover_duration,
            trigger_time: result.timestamp,
            first_trigger_time: result.timestamp,
            last_eval_time: result.timestamp,
            trigger_value: result.trigger_value(),
            annotations: rule.annotations.clone(),
            tags: result.labels.clone(),
            ..Default::default()
        }
    }

    pub fn is_muted(&self) -> bool {
        self.status == STATUS_MUTED
    }

    /// The recovery snapshot of this event evaluated at `now`.
    pub fn recovered_at(&self, now: i64) -> Self {
        let mut event = self.clone();
        event.is_recovered = true;
        event.last_eval_time = now;
        event.recover_time = now;
        event
    }

    /// Named field lookup used by aggregation views and templates.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "cluster" => self.cluster.clone(),
            "group_id" => self.group_id.to_string(),
            "group_name" => self.group_name.clone(),
            "rule_id" => self.rule_id.to_string(),
            "rule_name" => self.rule_name.clone(),
            "severity" => self.severity.to_string(),
            "runbook_url" => self.runbook_url.clone(),
            "target_ident" => self.target_ident.clone(),
            "target_note" => self.target_note.clone(),
            "cate" => self.cate.clone(),
            "rule_prod" => self.rule_prod.clone(),
            "hash" => self.hash.clone(),
            "trigger_value" => self.trigger_value.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Outcome of one delivery attempt, as stored in `notification_record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyStatus {
    Success = 1,
    Failure = 2,
}

impl NotifyStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Success),
            2 => Some(Self::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyStatus::Success => write!(f, "success"),
            NotifyStatus::Failure => write!(f, "failure"),
        }
    }
}

/// One attempted delivery of one event on one channel to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub event_id: i64,
    pub sub_rule_id: i64,
    pub channel: String,
    pub target: String,
    pub status: NotifyStatus,
    pub details: String,
    pub created_at: i64,
}

/// A monitored host as exposed to event enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub ident: String,
    pub note: String,
    pub group_id: i64,
}
