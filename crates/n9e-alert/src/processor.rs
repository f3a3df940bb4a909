use chrono::Local;
use n9e_common::error::ErrorKind;
use n9e_common::fingerprint::{fingerprint, point_fingerprint};
use n9e_common::time::Deadline;
use n9e_common::types::{AlertEvent, AlertRule, EvalResult, STATUS_MUTED, STATUS_NORMAL};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::engine::EngineContext;
use crate::error::{AlertError, Result};
use crate::lifecycle::{Lifecycle, Plan, Step};
use crate::mute::matching_mute;
use crate::registry::RegistrySnapshot;
use crate::template::render_event_fields;

/// Counts of what one snapshot ingestion did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub born: usize,
    pub refreshed: usize,
    pub recovered: usize,
    pub held: usize,
    /// Firing points dropped in favour of a higher severity with the same labels.
    pub inhibited: usize,
}

impl IngestSummary {
    fn count(&mut self, step: Step) {
        match step {
            Step::Birth => self.born += 1,
            Step::Refresh => self.refreshed += 1,
            Step::Recover => self.recovered += 1,
            Step::Hold => self.held += 1,
        }
    }
}

/// Lifecycle state for the rules of one shard, and the pipeline that moves
/// an evaluation from fingerprint to notification.
pub(crate) struct Processor {
    ctx: Arc<EngineContext>,
    lifecycle: Lifecycle,
    restored: HashSet<i64>,
}

impl Processor {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            lifecycle: Lifecycle::new(),
            restored: HashSet::new(),
        }
    }

    pub(crate) async fn ingest(&mut self, result: EvalResult, deadline: &Deadline) -> Result<Step> {
        let snapshot = self.ctx.registry.snapshot();
        let rule = snapshot
            .rule(result.rule_id)
            .ok_or(AlertError::RuleNotFound(result.rule_id))?;
        self.ensure_restored(rule.id, deadline).await?;

        let hash = point_fingerprint(rule.id, &result.labels, result.severity);
        self.process(&snapshot, &rule, hash, Some(&result), result.timestamp, deadline)
            .await
    }

    /// Every tracked hash of the rule missing from `results` is treated as
    /// a non-firing evaluation at `now`. With `rule.inhibit`, a firing point
    /// whose labels also fire at a higher severity is left untouched: it is
    /// neither processed nor treated as missing.
    pub(crate) async fn ingest_snapshot(
        &mut self,
        rule_id: i64,
        results: Vec<EvalResult>,
        now: i64,
        deadline: &Deadline,
    ) -> Result<IngestSummary> {
        let snapshot = self.ctx.registry.snapshot();
        let rule = snapshot
            .rule(rule_id)
            .ok_or(AlertError::RuleNotFound(rule_id))?;
        self.ensure_restored(rule_id, deadline).await?;

        let mut summary = IngestSummary::default();
        let mut seen = HashMap::new();
        for result in results.into_iter().filter(|r| r.rule_id == rule_id) {
            seen.insert(point_fingerprint(rule_id, &result.labels, result.severity), result);
        }
        let inhibited = if rule.inhibit {
            inhibited_points(&rule, &seen)
        } else {
            HashSet::new()
        };
        if !inhibited.is_empty() {
            tracing::debug!(rule_id, inhibited = inhibited.len(), "Inhibited lower severity points");
        }
        summary.inhibited = inhibited.len();

        for (hash, result) in &seen {
            if inhibited.contains(hash) {
                continue;
            }
            let step = self
                .process(&snapshot, &rule, hash.clone(), Some(result), result.timestamp, deadline)
                .await?;
            summary.count(step);
        }

        for hash in self.lifecycle.hashes_for_rule(rule_id) {
            if seen.contains_key(&hash) {
                continue;
            }
            let step = self
                .process(&snapshot, &rule, hash, None, now, deadline)
                .await?;
            summary.count(step);
        }

        Ok(summary)
    }

    async fn ensure_restored(&mut self, rule_id: i64, deadline: &Deadline) -> Result<()> {
        if self.restored.contains(&rule_id) {
            return Ok(());
        }
        deadline.check()?;
        let events = self.ctx.store.current_events_for_rule(rule_id).await?;
        let restored = self.lifecycle.restore(events);
        if restored > 0 {
            tracing::info!(rule_id, restored, "Restored firing events");
        }
        self.restored.insert(rule_id);
        Ok(())
    }

    /// One evaluation of one hash. A `None` result (or a quiet one) is a
    /// non-firing evaluation at `eval_ts`.
    async fn process(
        &mut self,
        snapshot: &RegistrySnapshot,
        rule: &AlertRule,
        hash: String,
        result: Option<&EvalResult>,
        eval_ts: i64,
        deadline: &Deadline,
    ) -> Result<Step> {
        let firing = result.filter(|r| r.is_firing);
        let plan = self.plan(snapshot, rule, &hash, firing, eval_ts);

        match self.execute(snapshot, plan, deadline).await {
            Err(AlertError::Storage(e)) if e.kind() == ErrorKind::Conflict => {
                // the current row changed under us; resync the hash and retry once
                tracing::warn!(hash = %hash, error = %e, "Current event conflict, retrying");
                deadline.check()?;
                let current = self.ctx.store.get_current_by_hash(&hash).await?;
                self.lifecycle.resync(&hash, current);
                let plan = self.plan(snapshot, rule, &hash, firing, eval_ts);
                self.execute(snapshot, plan, deadline).await
            }
            other => other,
        }
    }

    fn plan(
        &self,
        snapshot: &RegistrySnapshot,
        rule: &AlertRule,
        hash: &str,
        firing: Option<&EvalResult>,
        eval_ts: i64,
    ) -> Plan {
        match firing {
            Some(result) => {
                let event = self.build_event(snapshot, rule, hash, result);
                self.lifecycle.plan_fire(event, self.ctx.clock.unix())
            }
            None => self.lifecycle.plan_quiet(hash, eval_ts),
        }
    }

    async fn execute(
        &mut self,
        snapshot: &RegistrySnapshot,
        plan: Plan,
        deadline: &Deadline,
    ) -> Result<Step> {
        let step = plan.step;
        let notify = plan.notify;
        let expected = plan.expected_current();

        let outcome = match &plan.event {
            Some(event) => Some(
                self.ctx
                    .store
                    .persist_expecting(event, expected, deadline)
                    .await?,
            ),
            None => None,
        };
        let persisted = self.lifecycle.commit(plan, outcome.as_ref());

        if let Some(event) = &persisted {
            tracing::debug!(
                hash = %event.hash,
                rule_id = event.rule_id,
                event_id = event.id,
                step = ?step,
                muted = event.is_muted(),
                "Event persisted"
            );
            if notify {
                self.notify(snapshot, event).await;
            }
        }
        Ok(step)
    }

    /// Rule channels first, then one rewritten copy per matching
    /// subscription.
    async fn notify(&self, snapshot: &RegistrySnapshot, event: &AlertEvent) {
        let emitter = &self.ctx.emitter;
        emitter.emit(event, 0).await;
        for sub in snapshot.subscriptions_for_rule(event.rule_id) {
            if sub.matches(event) {
                let rewritten = sub.apply(event);
                emitter.emit(&rewritten, sub.id()).await;
            }
        }
    }

    fn build_event(
        &self,
        snapshot: &RegistrySnapshot,
        rule: &AlertRule,
        hash: &str,
        result: &EvalResult,
    ) -> AlertEvent {
        let mut event = AlertEvent::from_rule(rule, hash.to_string(), result);

        for err in render_event_fields(self.ctx.renderer.as_ref(), rule, &mut event, result.value) {
            tracing::warn!(
                rule_id = rule.id,
                field = %err.field,
                error = %err.reason,
                "Template rendering failed, keeping raw text"
            );
        }
        event.tags.insert("rulename", event.rule_name.clone());

        event.target_ident = event.tags.value_or_empty("ident").to_string();
        if let Some(target) = snapshot.target(&event.target_ident) {
            event.target_note = target.note.clone();
        }
        event.group_name = snapshot
            .group_name(rule.group_id)
            .unwrap_or_default()
            .to_string();

        let mutes = snapshot.mutes_for_group(event.group_id);
        let mute_id = match &self.ctx.mute_tz {
            Some(tz) => matching_mute(&event, mutes, result.timestamp, tz).map(|m| m.id()),
            None => matching_mute(&event, mutes, result.timestamp, &Local).map(|m| m.id()),
        };
        event.status = match mute_id {
            Some(mute_id) => {
                tracing::debug!(hash = %event.hash, mute_id, "Event muted");
                STATUS_MUTED
            }
            None => STATUS_NORMAL,
        };
        event
    }
}

/// Hashes of firing points outranked by a firing point with the same labels.
/// Lower numbers are more severe.
fn inhibited_points(rule: &AlertRule, seen: &HashMap<String, EvalResult>) -> HashSet<String> {
    let mut highest: HashMap<String, i32> = HashMap::new();
    for result in seen.values().filter(|r| r.is_firing) {
        let severity = result.severity_for(rule);
        highest
            .entry(fingerprint(rule.id, &result.labels))
            .and_modify(|s| *s = (*s).min(severity))
            .or_insert(severity);
    }
    seen.iter()
        .filter(|(_, r)| r.is_firing)
        .filter(|(_, r)| {
            highest
                .get(&fingerprint(rule.id, &r.labels))
                .is_some_and(|top| r.severity_for(rule) > *top)
        })
        .map(|(hash, _)| hash.clone())
        .collect()
}
