use n9e_common::codec::{join_fields, split_fields};
use n9e_common::labels::LabelSet;
use n9e_common::time::Deadline;
use n9e_common::types::AlertEvent;
use sea_orm::sea_query::{Alias, Expr, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, Condition,
    DatabaseTransaction, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{alert_cur_event, alert_his_event};
use crate::error::{Result, StorageError};
use crate::store::Store;

/// Flat, string-encoded event row shared by the current and history tables.
///
/// This is the only place where labels, lists and JSON columns exist in
/// their stored form; [`EventRow::from_event`] and [`EventRow::into_event`]
/// are the two conversion boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
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
    pub is_recovered: i32,
    pub recover_time: i64,
}

impl EventRow {
    /// Encodes an in-memory event into its stored form.
    pub fn from_event(event: &AlertEvent) -> Result<Self> {
        let rule_config = if event.rule_config.is_null() {
            "{}".to_string()
        } else {
            serde_json::to_string(&event.rule_config)?
        };
        Ok(Self {
            id: event.id,
            cate: event.cate.clone(),
            cluster: event.cluster.clone(),
            datasource_id: event.datasource_id,
            group_id: event.group_id,
            group_name: event.group_name.clone(),
            hash: event.hash.clone(),
            rule_id: event.rule_id,
            rule_name: event.rule_name.clone(),
            rule_note: event.rule_note.clone(),
            rule_prod: event.rule_prod.clone(),
            rule_config,
            severity: event.severity,
            prom_for_duration: event.prom_for_duration,
            prom_eval_interval: event.prom_eval_interval,
            callbacks: join_fields(&event.callbacks),
            runbook_url: event.runbook_url.clone(),
            notify_recovered: i32::from(event.notify_recovered),
            notify_channels: join_fields(&event.notify_channels),
            notify_groups: join_fields(&event.notify_groups),
            notify_repeat_step: event.notify_repeat_step,
            notify_max_number: event.notify_max_number,
            notify_cur_number: event.notify_cur_number,
            recover_duration: event.recover_duration,
            target_ident: event.target_ident.clone(),
            target_note: event.target_note.clone(),
            first_trigger_time: event.first_trigger_time,
            trigger_time: event.trigger_time,
            trigger_value: event.trigger_value.clone(),
            annotations: serde_json::to_string(&event.annotations)?,
            tags: event.tags.encode(),
            status: event.status,
            claimant: event.claimant.clone(),
            sub_rule_id: event.sub_rule_id,
            last_eval_time: event.last_eval_time,
            last_sent_time: event.last_sent_time,
            is_recovered: i32::from(event.is_recovered),
            recover_time: event.recover_time,
        })
    }

    /// Decodes the stored form. Malformed JSON columns decode to empty
    /// values with a warning rather than failing the read.
    pub fn into_event(self) -> AlertEvent {
        let annotations = decode_annotations(&self.hash, &self.annotations);
        let rule_config = decode_rule_config(&self.hash, &self.rule_config);
        AlertEvent {
            id: self.id,
            cate: self.cate,
            cluster: self.cluster,
            datasource_id: self.datasource_id,
            group_id: self.group_id,
            group_name: self.group_name,
            hash: self.hash,
            rule_id: self.rule_id,
            rule_name: self.rule_name,
            rule_note: self.rule_note,
            rule_prod: self.rule_prod,
            rule_config,
            severity: self.severity,
            prom_for_duration: self.prom_for_duration,
            prom_eval_interval: self.prom_eval_interval,
            callbacks: split_fields(&self.callbacks),
            runbook_url: self.runbook_url,
            notify_recovered: self.notify_recovered == 1,
            notify_channels: split_fields(&self.notify_channels),
            notify_groups: split_fields(&self.notify_groups),
            notify_repeat_step: self.notify_repeat_step,
            notify_max_number: self.notify_max_number,
            notify_cur_number: self.notify_cur_number,
            recover_duration: self.recover_duration,
            target_ident: self.target_ident,
            target_note: self.target_note,
            trigger_time: self.trigger_time,
            first_trigger_time: self.first_trigger_time,
            trigger_value: self.trigger_value,
            annotations,
            tags: LabelSet::decode(&self.tags),
            status: self.status,
            claimant: self.claimant,
            sub_rule_id: self.sub_rule_id,
            last_eval_time: self.last_eval_time,
            last_sent_time: self.last_sent_time,
            is_recovered: self.is_recovered == 1,
            recover_time: self.recover_time,
        }
    }
}

fn decode_annotations(hash: &str, raw: &str) -> BTreeMap<String, String> {
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(hash, error = %e, "Malformed annotations column");
        BTreeMap::new()
    })
}

fn decode_rule_config(hash: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(hash, error = %e, "Malformed rule_config column");
        serde_json::Value::Null
    })
}

impl From<alert_cur_event::Model> for EventRow {
    fn from(m: alert_cur_event::Model) -> Self {
        Self {
            id: m.id,
            cate: m.cate,
            cluster: m.cluster,
            datasource_id: m.datasource_id,
            group_id: m.group_id,
            group_name: m.group_name,
            hash: m.hash,
            rule_id: m.rule_id,
            rule_name: m.rule_name,
            rule_note: m.rule_note,
            rule_prod: m.rule_prod,
            rule_config: m.rule_config,
            severity: m.severity,
            prom_for_duration: m.prom_for_duration,
            prom_eval_interval: m.prom_eval_interval,
            callbacks: m.callbacks,
            runbook_url: m.runbook_url,
            notify_recovered: m.notify_recovered,
            notify_channels: m.notify_channels,
            notify_groups: m.notify_groups,
            notify_repeat_step: m.notify_repeat_step,
            notify_max_number: m.notify_max_number,
            notify_cur_number: m.notify_cur_number,
            recover_duration: m.recover_duration,
            target_ident: m.target_ident,
            target_note: m.target_note,
            first_trigger_time: m.first_trigger_time,
            trigger_time: m.trigger_time,
            trigger_value: m.trigger_value,
            annotations: m.annotations,
            tags: m.tags,
            status: m.status,
            claimant: m.claimant,
            sub_rule_id: m.sub_rule_id,
            last_eval_time: m.last_eval_time,
            last_sent_time: m.last_sent_time,
            is_recovered: 0,
            recover_time: 0,
        }
    }
}

impl From<alert_his_event::Model> for EventRow {
    fn from(m: alert_his_event::Model) -> Self {
        Self {
            id: m.id,
            cate: m.cate,
            cluster: m.cluster,
            datasource_id: m.datasource_id,
            group_id: m.group_id,
            group_name: m.group_name,
            hash: m.hash,
            rule_id: m.rule_id,
            rule_name: m.rule_name,
            rule_note: m.rule_note,
            rule_prod: m.rule_prod,
            rule_config: m.rule_config,
            severity: m.severity,
            prom_for_duration: m.prom_for_duration,
            prom_eval_interval: m.prom_eval_interval,
            callbacks: m.callbacks,
            runbook_url: m.runbook_url,
            notify_recovered: m.notify_recovered,
            notify_channels: m.notify_channels,
            notify_groups: m.notify_groups,
            notify_repeat_step: m.notify_repeat_step,
            notify_max_number: m.notify_max_number,
            notify_cur_number: m.notify_cur_number,
            recover_duration: m.recover_duration,
            target_ident: m.target_ident,
            target_note: m.target_note,
            first_trigger_time: m.first_trigger_time,
            trigger_time: m.trigger_time,
            trigger_value: m.trigger_value,
            annotations: m.annotations,
            tags: m.tags,
            status: m.status,
            claimant: m.claimant,
            sub_rule_id: m.sub_rule_id,
            last_eval_time: m.last_eval_time,
            last_sent_time: m.last_sent_time,
            is_recovered: m.is_recovered,
            recover_time: m.recover_time,
        }
    }
}

fn current_active_model(row: &EventRow) -> alert_cur_event::ActiveModel {
    alert_cur_event::ActiveModel {
        id: Set(row.id),
        cate: Set(row.cate.clone()),
        cluster: Set(row.cluster.clone()),
        datasource_id: Set(row.datasource_id),
        group_id: Set(row.group_id),
        group_name: Set(row.group_name.clone()),
        hash: Set(row.hash.clone()),
        rule_id: Set(row.rule_id),
        rule_name: Set(row.rule_name.clone()),
        rule_note: Set(row.rule_note.clone()),
        rule_prod: Set(row.rule_prod.clone()),
        rule_config: Set(row.rule_config.clone()),
        severity: Set(row.severity),
        prom_for_duration: Set(row.prom_for_duration),
        prom_eval_interval: Set(row.prom_eval_interval),
        callbacks: Set(row.callbacks.clone()),
        runbook_url: Set(row.runbook_url.clone()),
        notify_recovered: Set(row.notify_recovered),
        notify_channels: Set(row.notify_channels.clone()),
        notify_groups: Set(row.notify_groups.clone()),
        notify_repeat_step: Set(row.notify_repeat_step),
        notify_max_number: Set(row.notify_max_number),
        notify_cur_number: Set(row.notify_cur_number),
        recover_duration: Set(row.recover_duration),
        target_ident: Set(row.target_ident.clone()),
        target_note: Set(row.target_note.clone()),
        first_trigger_time: Set(row.first_trigger_time),
        trigger_time: Set(row.trigger_time),
        trigger_value: Set(row.trigger_value.clone()),
        annotations: Set(row.annotations.clone()),
        tags: Set(row.tags.clone()),
        status: Set(row.status),
        claimant: Set(row.claimant.clone()),
        sub_rule_id: Set(row.sub_rule_id),
        last_eval_time: Set(row.last_eval_time),
        last_sent_time: Set(row.last_sent_time),
    }
}

fn history_active_model(row: &EventRow) -> alert_his_event::ActiveModel {
    alert_his_event::ActiveModel {
        id: NotSet,
        is_recovered: Set(row.is_recovered),
        cate: Set(row.cate.clone()),
        cluster: Set(row.cluster.clone()),
        datasource_id: Set(row.datasource_id),
        group_id: Set(row.group_id),
        group_name: Set(row.group_name.clone()),
        hash: Set(row.hash.clone()),
        rule_id: Set(row.rule_id),
        rule_name: Set(row.rule_name.clone()),
        rule_note: Set(row.rule_note.clone()),
        rule_prod: Set(row.rule_prod.clone()),
        rule_config: Set(row.rule_config.clone()),
        severity: Set(row.severity),
        prom_for_duration: Set(row.prom_for_duration),
        prom_eval_interval: Set(row.prom_eval_interval),
        callbacks: Set(row.callbacks.clone()),
        runbook_url: Set(row.runbook_url.clone()),
        notify_recovered: Set(row.notify_recovered),
        notify_channels: Set(row.notify_channels.clone()),
        notify_groups: Set(row.notify_groups.clone()),
        notify_repeat_step: Set(row.notify_repeat_step),
        notify_max_number: Set(row.notify_max_number),
        notify_cur_number: Set(row.notify_cur_number),
        recover_duration: Set(row.recover_duration),
        target_ident: Set(row.target_ident.clone()),
        target_note: Set(row.target_note.clone()),
        first_trigger_time: Set(row.first_trigger_time),
        trigger_time: Set(row.trigger_time),
        trigger_value: Set(row.trigger_value.clone()),
        annotations: Set(row.annotations.clone()),
        tags: Set(row.tags.clone()),
        status: Set(row.status),
        claimant: Set(row.claimant.clone()),
        sub_rule_id: Set(row.sub_rule_id),
        last_eval_time: Set(row.last_eval_time),
        last_sent_time: Set(row.last_sent_time),
        recover_time: Set(row.recover_time),
    }
}

/// What the writer believes the current table holds for a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Take whatever is there.
    Any,
    /// No current row.
    Absent,
    /// The current row with this id.
    Current(i64),
}

/// What [`Store::persist`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No current row existed; one was created.
    Born,
    /// The current row was replaced by a newer snapshot.
    Refreshed,
    /// The current row was removed and a recovery row appended.
    Recovered,
    /// Recovery for a hash with no current row; nothing was written.
    SpuriousRecovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    pub transition: Transition,
    /// History row id, which is also the new current row id. 0 when nothing
    /// was written.
    pub id: i64,
    /// `first_trigger_time` as persisted.
    pub first_trigger_time: i64,
}

/// Filters for current-event queries. Empty vectors mean "any".
#[derive(Debug, Clone, Default)]
pub struct CurrentEventFilter {
    pub prods: Vec<String>,
    pub cates: Vec<String>,
    pub group_ids: Vec<i64>,
    pub datasource_ids: Vec<i64>,
    pub severity: Option<i32>,
    pub rule_id: Option<i64>,
    pub hash: Option<String>,
    /// Whitespace separated words; each must appear in the rule name or the
    /// stored tags.
    pub query: Option<String>,
    pub limit: Option<u64>,
    pub offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryEventFilter {
    pub base: CurrentEventFilter,
    pub recovered: Option<bool>,
}

/// Inclusive range of `last_eval_time` in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Escapes LIKE wildcards so a search word matches literally.
fn escape_like(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn col(name: &str) -> Expr {
    Expr::col(Alias::new(name))
}

// Both event tables share column names, so one condition serves either.
fn event_condition(filter: &CurrentEventFilter) -> Condition {
    let mut cond = Condition::all();
    if !filter.prods.is_empty() {
        cond = cond.add(col("rule_prod").is_in(filter.prods.clone()));
    }
    if !filter.cates.is_empty() {
        cond = cond.add(col("cate").is_in(filter.cates.clone()));
    }
    if !filter.group_ids.is_empty() {
        cond = cond.add(col("group_id").is_in(filter.group_ids.clone()));
    }
    if !filter.datasource_ids.is_empty() {
        cond = cond.add(col("datasource_id").is_in(filter.datasource_ids.clone()));
    }
    if let Some(severity) = filter.severity {
        cond = cond.add(col("severity").eq(severity));
    }
    if let Some(rule_id) = filter.rule_id {
        cond = cond.add(col("rule_id").eq(rule_id));
    }
    if let Some(hash) = &filter.hash {
        cond = cond.add(col("hash").eq(hash.clone()));
    }
    if let Some(query) = &filter.query {
        for word in query.split_whitespace() {
            let pattern = format!("%{}%", escape_like(word));
            cond = cond.add(
                Condition::any()
                    .add(col("rule_name").like(LikeExpr::new(pattern.clone()).escape('\\')))
                    .add(col("tags").like(LikeExpr::new(pattern).escape('\\'))),
            );
        }
    }
    cond
}

fn history_condition(filter: &HistoryEventFilter, range: TimeRange) -> Condition {
    let mut cond = event_condition(&filter.base)
        .add(col("last_eval_time").gte(range.start))
        .add(col("last_eval_time").lte(range.end));
    if let Some(recovered) = filter.recovered {
        cond = cond.add(col("is_recovered").eq(i32::from(recovered)));
    }
    cond
}

impl Store {
    /// Applies one fire or recovery to the event tables.
    ///
    /// Every step runs inside one transaction: the history append, the
    /// removal of the previous current row and the insert of the new one
    /// either all commit or all roll back. The deadline is checked before
    /// each statement.
    pub async fn persist(&self, event: &AlertEvent, deadline: &Deadline) -> Result<PersistOutcome> {
        self.persist_expecting(event, Expected::Any, deadline).await
    }

    /// [`Store::persist`] as a compare-and-swap on the hash: when the current
    /// row does not match `expected`, nothing is written and
    /// [`StorageError::Conflict`] is returned.
    pub async fn persist_expecting(
        &self,
        event: &AlertEvent,
        expected: Expected,
        deadline: &Deadline,
    ) -> Result<PersistOutcome> {
        deadline.check()?;
        let txn = self.db().begin().await?;

        match persist_in(&txn, event, expected, deadline).await {
            Ok(outcome) => {
                if let Err(e) = deadline.check() {
                    txn.rollback().await?;
                    return Err(e.into());
                }
                txn.commit().await?;
                tracing::debug!(
                    hash = %event.hash,
                    rule_id = event.rule_id,
                    id = outcome.id,
                    transition = ?outcome.transition,
                    "Persisted alert event"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(hash = %event.hash, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    pub async fn get_current_by_hash(&self, hash: &str) -> Result<Option<AlertEvent>> {
        let model = alert_cur_event::Entity::find()
            .filter(alert_cur_event::Column::Hash.eq(hash))
            .one(self.db())
            .await?;
        Ok(model.map(|m| EventRow::from(m).into_event()))
    }

    pub async fn get_history_by_id(&self, id: i64) -> Result<Option<AlertEvent>> {
        let model = alert_his_event::Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(|m| EventRow::from(m).into_event()))
    }

    /// Every current event of one rule, used to rebuild in-memory state.
    pub async fn current_events_for_rule(&self, rule_id: i64) -> Result<Vec<AlertEvent>> {
        let rows = alert_cur_event::Entity::find()
            .filter(alert_cur_event::Column::RuleId.eq(rule_id))
            .order_by(alert_cur_event::Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| EventRow::from(m).into_event())
            .collect())
    }

    pub async fn query_current(&self, filter: &CurrentEventFilter) -> Result<Vec<AlertEvent>> {
        let mut q = alert_cur_event::Entity::find()
            .filter(event_condition(filter))
            .order_by(alert_cur_event::Column::TriggerTime, Order::Desc)
            .offset(filter.offset);
        if let Some(limit) = filter.limit {
            q = q.limit(limit);
        }
        let rows = q.all(self.db()).await?;
        Ok(rows
            .into_iter()
            .map(|m| EventRow::from(m).into_event())
            .collect())
    }

    pub async fn count_current(&self, filter: &CurrentEventFilter) -> Result<u64> {
        Ok(alert_cur_event::Entity::find()
            .filter(event_condition(filter))
            .count(self.db())
            .await?)
    }

    pub async fn query_history(
        &self,
        filter: &HistoryEventFilter,
        range: TimeRange,
    ) -> Result<Vec<AlertEvent>> {
        let mut q = alert_his_event::Entity::find()
            .filter(history_condition(filter, range))
            .order_by(alert_his_event::Column::Id, Order::Desc)
            .offset(filter.base.offset);
        if let Some(limit) = filter.base.limit {
            q = q.limit(limit);
        }
        let rows = q.all(self.db()).await?;
        Ok(rows
            .into_iter()
            .map(|m| EventRow::from(m).into_event())
            .collect())
    }

    pub async fn count_history(&self, filter: &HistoryEventFilter, range: TimeRange) -> Result<u64> {
        Ok(alert_his_event::Entity::find()
            .filter(history_condition(filter, range))
            .count(self.db())
            .await?)
    }

    /// History rows of one hash, oldest first.
    pub async fn history_for_hash(&self, hash: &str) -> Result<Vec<AlertEvent>> {
        let rows = alert_his_event::Entity::find()
            .filter(alert_his_event::Column::Hash.eq(hash))
            .order_by(alert_his_event::Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| EventRow::from(m).into_event())
            .collect())
    }

    /// Removes current rows by id without touching history (operator ack).
    pub async fn delete_current_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = alert_cur_event::Entity::delete_many()
            .filter(alert_cur_event::Column::Id.is_in(ids.to_vec()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}

async fn persist_in(
    txn: &DatabaseTransaction,
    event: &AlertEvent,
    expected: Expected,
    deadline: &Deadline,
) -> Result<PersistOutcome> {
    deadline.check()?;
    let current = alert_cur_event::Entity::find()
        .filter(alert_cur_event::Column::Hash.eq(event.hash.as_str()))
        .one(txn)
        .await?;

    let found = current.as_ref().map(|cur| cur.id);
    let stale = match expected {
        Expected::Any => false,
        Expected::Absent => found.is_some(),
        Expected::Current(id) => found != Some(id),
    };
    if stale {
        return Err(StorageError::Conflict {
            hash: event.hash.clone(),
        });
    }

    match &current {
        Some(cur) => {
            deadline.check()?;
            let history = alert_his_event::Entity::find_by_id(cur.id).one(txn).await?;
            if history.is_none() {
                tracing::error!(hash = %cur.hash, id = cur.id, "Current event has no history row");
                return Err(StorageError::Invariant(format!(
                    "current event {} (hash {}) has no history row",
                    cur.id, cur.hash
                )));
            }
        }
        None if event.is_recovered => {
            tracing::warn!(
                hash = %event.hash,
                rule_id = event.rule_id,
                "Recovery for a hash that is not firing, ignored"
            );
            return Ok(PersistOutcome {
                transition: Transition::SpuriousRecovery,
                id: 0,
                first_trigger_time: event.first_trigger_time,
            });
        }
        None => {}
    }

    let first_trigger_time = current
        .as_ref()
        .map(|cur| cur.first_trigger_time)
        .unwrap_or(event.trigger_time);

    let mut row = EventRow::from_event(event)?;
    row.first_trigger_time = first_trigger_time;
    if event.is_recovered {
        row.is_recovered = 1;
        row.recover_time = event.last_eval_time;
    } else {
        row.is_recovered = 0;
        row.recover_time = 0;
    }

    deadline.check()?;
    let history = history_active_model(&row).insert(txn).await?;
    row.id = history.id;

    if current.is_some() {
        deadline.check()?;
        alert_cur_event::Entity::delete_many()
            .filter(alert_cur_event::Column::Hash.eq(event.hash.as_str()))
            .exec(txn)
            .await?;
    }

    if event.is_recovered {
        return Ok(PersistOutcome {
            transition: Transition::Recovered,
            id: history.id,
            first_trigger_time,
        });
    }

    deadline.check()?;
    current_active_model(&row)
        .insert(txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::Conflict {
                hash: event.hash.clone(),
            },
            _ => StorageError::from(e),
        })?;

    Ok(PersistOutcome {
        transition: if current.is_some() {
            Transition::Refreshed
        } else {
            Transition::Born
        },
        id: history.id,
        first_trigger_time,
    })
}
