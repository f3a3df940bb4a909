use async_trait::async_trait;
use chrono::FixedOffset;
use n9e_common::filter::TagFilterSpec;
use n9e_common::fingerprint::{fingerprint, point_fingerprint};
use n9e_common::labels::LabelSet;
use n9e_common::time::{Deadline, ManualClock};
use n9e_common::types::{AlertEvent, AlertRule, EvalResult, Target, STATUS_MUTED, STATUS_NORMAL};
use n9e_notify::{Emitter, NotificationIntent, NotificationTransport, RecordSink, StaticContacts};
use n9e_storage::store::{
    BusiGroupRow, Expected, MuteRow, MuteTimeType, NotificationRecordFilter, PeriodicMute,
    SubscribeRow,
};
use n9e_storage::Store;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::engine::{Engine, EngineContext};
use crate::error::AlertError;
use crate::lifecycle::{should_notify_fire, should_notify_recovery, HashState, Lifecycle, Step};
use crate::mute::{is_muted, CompiledMute};
use crate::processor::{IngestSummary, Processor};
use crate::registry::{Registry, RegistrySnapshot};
use crate::subscribe::{route, CompiledSubscription};
use crate::template::{
    humanize, humanize1024, humanize_duration, humanize_percentage, render_event_fields, sprintf,
    HandlebarsRenderer, Renderer, TemplateContext,
};

/// Tuesday 2024-01-02 14:00:00 UTC.
const TUESDAY_2PM: i64 = 1_704_204_000;

// ---- fixtures ----

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<NotificationIntent>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<NotificationIntent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, intent: &NotificationIntent) -> n9e_notify::Result<String> {
        self.sent.lock().unwrap().push(intent.clone());
        Ok("ok".to_string())
    }
}

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs.iter().copied().collect()
}

fn rule() -> AlertRule {
    AlertRule {
        id: 42,
        group_id: 1,
        cate: "prometheus".to_string(),
        prod: "metric".to_string(),
        name: "cpu high on {{ $labels.ident }}".to_string(),
        note: "value {{ $value | humanize }}".to_string(),
        severity: 3,
        prom_eval_interval: 15,
        notify_recovered: true,
        notify_channels: vec!["email".to_string()],
        notify_groups: vec!["7".to_string()],
        append_tags: vec!["team=ops".to_string()],
        ..Default::default()
    }
}

fn contacts() -> StaticContacts {
    let mut book = StaticContacts::new();
    book.add("7", "email", "ops@example.com");
    book.add("8", "email", "dba@example.com");
    book
}

fn periodic_mute() -> MuteRow {
    MuteRow {
        id: 3,
        group_id: 1,
        cate: "prometheus".to_string(),
        prod: "metric".to_string(),
        mute_time_type: MuteTimeType::Periodic,
        periodic_mutes: vec![PeriodicMute::new("09:00", "18:00", "1 2 3 4 5")],
        ..Default::default()
    }
}

fn escalating_subscription() -> SubscribeRow {
    SubscribeRow {
        id: 5,
        group_id: 1,
        rule_id: 42,
        redefine_severity: true,
        new_severity: 1,
        user_group_ids: "7 8".to_string(),
        ..Default::default()
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<Store>,
    clock: Arc<ManualClock>,
    transport: Arc<RecordingTransport>,
    emitter: Arc<Emitter>,
    registry: Arc<Registry>,
    ctx: Arc<EngineContext>,
}

impl Harness {
    async fn new(rules: Vec<AlertRule>, mutes: Vec<MuteRow>, subs: Vec<SubscribeRow>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open_sqlite(&dir.path().join("alert.db")).await.unwrap());
        let clock = Arc::new(ManualClock::new(TUESDAY_2PM));
        let transport = Arc::new(RecordingTransport::default());
        let sink: Arc<dyn RecordSink> = store.clone();
        let emitter = Arc::new(Emitter::new(
            transport.clone(),
            Arc::new(contacts()),
            sink,
            clock.clone(),
            64,
        ));
        let targets = vec![Target {
            ident: "web-01".to_string(),
            note: "frontend".to_string(),
            group_id: 1,
        }];
        let groups = vec![BusiGroupRow {
            id: 1,
            name: "infra".to_string(),
        }];
        let registry = Arc::new(Registry::with_snapshot(RegistrySnapshot::build(
            rules, mutes, subs, targets, groups,
        )));
        let ctx = Arc::new(EngineContext {
            store: store.clone(),
            registry: registry.clone(),
            emitter: emitter.clone(),
            renderer: Arc::new(HandlebarsRenderer::new().unwrap()),
            clock: clock.clone(),
            mute_tz: FixedOffset::east_opt(0),
        });
        Self {
            _dir: dir,
            store,
            clock,
            transport,
            emitter,
            registry,
            ctx,
        }
    }

    fn processor(&self) -> Processor {
        Processor::new(self.ctx.clone())
    }
}

fn web01() -> LabelSet {
    labels(&[("ident", "web-01"), ("__name__", "cpu_usage")])
}

// ---- end to end ----

#[tokio::test]
async fn first_fire_persists_and_notifies() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();

    let step = p
        .ingest(EvalResult::fire(42, web01(), 95.5, TUESDAY_2PM), &Deadline::none())
        .await
        .unwrap();
    assert_eq!(step, Step::Birth);

    let hash = fingerprint(42, &web01());
    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cur.rule_name, "cpu high on web-01");
    assert_eq!(cur.rule_note, "value 95.5");
    assert_eq!(cur.tags.get("team"), Some("ops"));
    assert_eq!(cur.tags.get("rulename"), Some("cpu high on web-01"));
    assert_eq!(cur.target_ident, "web-01");
    assert_eq!(cur.target_note, "frontend");
    assert_eq!(cur.group_name, "infra");
    assert_eq!(cur.status, STATUS_NORMAL);
    assert_eq!(cur.notify_cur_number, 1);
    assert_eq!(cur.first_trigger_time, TUESDAY_2PM);

    let history = h.store.history_for_hash(&hash).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, cur.id);

    assert_eq!(h.emitter.pending().await, 1);
    let stats = h.emitter.dispatch_pending().await;
    assert_eq!(stats.sent, 1);
    let sent = h.transport.sent();
    assert_eq!(sent[0].target, "ops@example.com");
    assert_eq!(sent[0].event_id(), cur.id);

    let filter = NotificationRecordFilter {
        event_id: Some(cur.id),
        ..Default::default()
    };
    assert_eq!(h.store.count_notification_records(&filter).await.unwrap(), 1);
}

#[tokio::test]
async fn repeat_fire_refreshes_without_renotifying() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();

    p.ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &deadline)
        .await
        .unwrap();
    h.emitter.dispatch_pending().await;

    h.clock.advance(15);
    let step = p
        .ingest(EvalResult::fire(42, web01(), 92.0, TUESDAY_2PM + 15), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Refresh);
    assert_eq!(h.emitter.pending().await, 0);

    let hash = fingerprint(42, &web01());
    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cur.trigger_value, "92");
    assert_eq!(cur.first_trigger_time, TUESDAY_2PM);
    assert_eq!(cur.notify_cur_number, 1);
    assert_eq!(h.store.history_for_hash(&hash).await.unwrap().len(), 2);
}

#[tokio::test]
async fn quiet_evaluation_recovers_and_announces() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();
    let hash = fingerprint(42, &web01());

    p.ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &deadline)
        .await
        .unwrap();
    h.emitter.dispatch_pending().await;

    let step = p
        .ingest(EvalResult::quiet(42, web01(), TUESDAY_2PM + 60), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Recover);
    assert!(h.store.get_current_by_hash(&hash).await.unwrap().is_none());

    let history = h.store.history_for_hash(&hash).await.unwrap();
    assert_eq!(history.len(), 2);
    let last = history.last().unwrap();
    assert!(last.is_recovered);
    assert_eq!(last.recover_time, TUESDAY_2PM + 60);

    assert_eq!(h.emitter.pending().await, 1);
    h.emitter.dispatch_pending().await;
    assert!(h.transport.sent()[1].event.is_recovered);

    // nothing tracked anymore
    let step = p
        .ingest(EvalResult::quiet(42, web01(), TUESDAY_2PM + 75), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Hold);
}

#[tokio::test]
async fn periodic_mute_silences_inside_window() {
    let h = Harness::new(vec![rule()], vec![periodic_mute()], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();
    let hash = fingerprint(42, &web01());

    let step = p
        .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Birth);
    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cur.status, STATUS_MUTED);
    assert_eq!(cur.notify_cur_number, 0);
    assert_eq!(h.emitter.pending().await, 0);

    // 19:00 is outside the window; the first unmuted fire is announced
    let evening = TUESDAY_2PM + 5 * 3600;
    h.clock.set(evening);
    p.ingest(EvalResult::fire(42, web01(), 91.0, evening), &deadline)
        .await
        .unwrap();
    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cur.status, STATUS_NORMAL);
    assert_eq!(cur.notify_cur_number, 1);
    assert_eq!(h.emitter.pending().await, 1);
}

#[tokio::test]
async fn subscription_rewrites_only_the_emitted_copy() {
    let h = Harness::new(vec![rule()], vec![], vec![escalating_subscription()]).await;
    let mut p = h.processor();
    let hash = fingerprint(42, &web01());

    p.ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &Deadline::none())
        .await
        .unwrap();

    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(cur.severity, 3);
    assert_eq!(cur.sub_rule_id, 0);

    let stats = h.emitter.dispatch_pending().await;
    assert_eq!(stats.sent, 3);

    let sent = h.transport.sent();
    let from_sub: Vec<_> = sent.iter().filter(|i| i.sub_rule_id == 5).collect();
    assert_eq!(from_sub.len(), 2);
    for intent in &from_sub {
        assert_eq!(intent.event.severity, 1);
        assert_eq!(intent.event.sub_rule_id, 5);
        assert_eq!(intent.event.notify_groups, vec!["7", "8"]);
    }
    let mut targets: Vec<_> = from_sub.iter().map(|i| i.target.as_str()).collect();
    targets.sort();
    assert_eq!(targets, vec!["dba@example.com", "ops@example.com"]);

    let direct: Vec<_> = sent.iter().filter(|i| i.sub_rule_id == 0).collect();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].event.severity, 3);

    let filter = NotificationRecordFilter {
        sub_id: Some(5),
        ..Default::default()
    };
    assert_eq!(h.store.count_notification_records(&filter).await.unwrap(), 2);
}

#[tokio::test]
async fn pending_fire_waits_for_duration() {
    let mut r = rule();
    r.prom_for_duration = 60;
    let h = Harness::new(vec![r], vec![], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();
    let hash = fingerprint(42, &web01());

    for offset in [0, 15, 30] {
        let step = p
            .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM + offset), &deadline)
            .await
            .unwrap();
        assert_eq!(step, Step::Hold);
    }
    assert!(h.store.get_current_by_hash(&hash).await.unwrap().is_none());

    let step = p
        .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM + 45), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Birth);
}

#[tokio::test]
async fn restarted_processor_recovers_restored_event() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let deadline = Deadline::none();
    let hash = fingerprint(42, &web01());

    let mut before = h.processor();
    before
        .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &deadline)
        .await
        .unwrap();
    drop(before);

    let mut after = h.processor();
    let step = after
        .ingest(EvalResult::quiet(42, web01(), TUESDAY_2PM + 30), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Recover);
    assert!(h.store.get_current_by_hash(&hash).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_state_resyncs_and_retries_once() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let deadline = Deadline::none();
    let hash = fingerprint(42, &web01());

    // `late` has already loaded rule 42 and believes web-01 is absent
    let mut late = h.processor();
    let step = late
        .ingest(EvalResult::quiet(42, web01(), TUESDAY_2PM - 15), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Hold);

    let mut early = h.processor();
    early
        .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), &deadline)
        .await
        .unwrap();
    let stored = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();

    h.clock.advance(15);
    let step = late
        .ingest(EvalResult::fire(42, web01(), 93.0, TUESDAY_2PM + 15), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Refresh);

    let cur = h.store.get_current_by_hash(&hash).await.unwrap().unwrap();
    assert_ne!(cur.id, stored.id);
    assert_eq!(cur.first_trigger_time, stored.first_trigger_time);
    assert_eq!(cur.notify_cur_number, 1);
    let history = h.store.history_for_hash(&hash).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, cur.id);
    // the refresh was not announced again
    assert_eq!(h.emitter.pending().await, 1);

    // `early` still holds the first id; its recovery resyncs onto the new row
    let step = early
        .ingest(EvalResult::quiet(42, web01(), TUESDAY_2PM + 30), &deadline)
        .await
        .unwrap();
    assert_eq!(step, Step::Recover);
    assert!(h.store.get_current_by_hash(&hash).await.unwrap().is_none());
    let history = h.store.history_for_hash(&hash).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[2].is_recovered);
}

#[tokio::test]
async fn snapshot_treats_missing_hashes_as_quiet() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();
    let web02 = labels(&[("ident", "web-02")]);

    let summary = p
        .ingest_snapshot(
            42,
            vec![
                EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM),
                EvalResult::fire(42, web02.clone(), 91.0, TUESDAY_2PM),
            ],
            TUESDAY_2PM,
            &deadline,
        )
        .await
        .unwrap();
    assert_eq!(summary.born, 2);

    let summary = p
        .ingest_snapshot(
            42,
            vec![EvalResult::fire(42, web01(), 92.0, TUESDAY_2PM + 15)],
            TUESDAY_2PM + 15,
            &deadline,
        )
        .await
        .unwrap();
    assert_eq!(
        summary,
        IngestSummary {
            born: 0,
            refreshed: 1,
            recovered: 1,
            held: 0,
            inhibited: 0,
        }
    );
    let gone = fingerprint(42, &web02);
    assert!(h.store.get_current_by_hash(&gone).await.unwrap().is_none());
}

#[tokio::test]
async fn inhibit_keeps_only_the_most_severe_point() {
    let inhibiting = AlertRule {
        inhibit: true,
        ..rule()
    };
    let h = Harness::new(vec![inhibiting], vec![], vec![]).await;
    let mut p = h.processor();
    let deadline = Deadline::none();
    let critical = point_fingerprint(42, &web01(), 1);
    let warning = point_fingerprint(42, &web01(), 2);

    let summary = p
        .ingest_snapshot(
            42,
            vec![EvalResult::fire(42, web01(), 80.0, TUESDAY_2PM).with_severity(2)],
            TUESDAY_2PM,
            &deadline,
        )
        .await
        .unwrap();
    assert_eq!(summary.born, 1);

    let summary = p
        .ingest_snapshot(
            42,
            vec![
                EvalResult::fire(42, web01(), 95.0, TUESDAY_2PM + 15).with_severity(1),
                EvalResult::fire(42, web01(), 95.0, TUESDAY_2PM + 15).with_severity(2),
                EvalResult::fire(42, labels(&[("ident", "web-02")]), 81.0, TUESDAY_2PM + 15).with_severity(2),
            ],
            TUESDAY_2PM + 15,
            &deadline,
        )
        .await
        .unwrap();
    assert_eq!(
        summary,
        IngestSummary {
            born: 2,
            refreshed: 0,
            recovered: 0,
            held: 0,
            inhibited: 1,
        }
    );

    let top = h.store.get_current_by_hash(&critical).await.unwrap().unwrap();
    assert_eq!(top.severity, 1);
    // the outranked point is left alone, not recovered
    let kept = h.store.get_current_by_hash(&warning).await.unwrap().unwrap();
    assert_eq!(kept.trigger_value, "80");
    assert_eq!(h.store.history_for_hash(&warning).await.unwrap().len(), 1);
}

#[tokio::test]
async fn without_inhibit_every_severity_fires() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let summary = p
        .ingest_snapshot(
            42,
            vec![
                EvalResult::fire(42, web01(), 95.0, TUESDAY_2PM).with_severity(1),
                EvalResult::fire(42, web01(), 95.0, TUESDAY_2PM).with_severity(2),
            ],
            TUESDAY_2PM,
            &Deadline::none(),
        )
        .await
        .unwrap();
    assert_eq!(summary.born, 2);
    assert_eq!(summary.inhibited, 0);
}

#[tokio::test]
async fn unknown_rule_is_rejected() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let err = p
        .ingest(EvalResult::fire(999, web01(), 1.0, TUESDAY_2PM), &Deadline::none())
        .await
        .unwrap_err();
    assert!(matches!(err, AlertError::RuleNotFound(999)));
}

#[tokio::test]
async fn expired_deadline_leaves_state_untouched() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let mut p = h.processor();
    let result = EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM);

    let err = p
        .ingest(result.clone(), &Deadline::after(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, AlertError::Deadline(_)));
    assert!(err.is_retriable());

    let step = p.ingest(result, &Deadline::none()).await.unwrap();
    assert_eq!(step, Step::Birth);
}

#[tokio::test]
async fn engine_shards_and_shuts_down() {
    let h = Harness::new(vec![rule()], vec![], vec![]).await;
    let engine = Engine::start(h.ctx.clone(), 3, 8);
    let handle = engine.handle();

    let step = handle
        .ingest(EvalResult::fire(42, web01(), 90.0, TUESDAY_2PM), Deadline::none())
        .await
        .unwrap();
    assert_eq!(step, Step::Birth);

    let summary = handle
        .ingest_snapshot(42, vec![], TUESDAY_2PM + 30, Deadline::none())
        .await
        .unwrap();
    assert_eq!(summary.recovered, 1);

    drop(handle);
    engine.shutdown().await;
    assert_eq!(h.registry.snapshot().rule_count(), 1);
}

// ---- lifecycle ----

fn firing_event(last_eval: i64) -> AlertEvent {
    AlertEvent {
        id: 10,
        hash: "h".to_string(),
        rule_id: 42,
        prom_eval_interval: 15,
        notify_recovered: true,
        trigger_time: last_eval,
        first_trigger_time: last_eval,
        last_eval_time: last_eval,
        ..Default::default()
    }
}

#[test]
fn recover_duration_defers_recovery() {
    let mut lc = Lifecycle::new();
    let mut event = firing_event(100);
    event.recover_duration = 30;
    lc.restore([event]);

    let plan = lc.plan_quiet("h", 110);
    assert_eq!(plan.step, Step::Hold);
    assert_eq!(plan.expected_current(), Expected::Any);
    lc.commit(plan, None);
    assert!(matches!(
        lc.state("h"),
        Some(HashState::PendingRecover { since: 110, .. })
    ));

    let plan = lc.plan_quiet("h", 130);
    assert_eq!(plan.step, Step::Recover);
    let recovered = lc.commit(plan, None).unwrap();
    assert!(recovered.is_recovered);
    assert!(lc.is_empty());
}

#[test]
fn fire_cancels_pending_recovery() {
    let mut lc = Lifecycle::new();
    let mut event = firing_event(100);
    event.recover_duration = 60;
    lc.restore([event.clone()]);

    let plan = lc.plan_quiet("h", 115);
    lc.commit(plan, None);

    let mut again = event.clone();
    again.id = 0;
    again.last_eval_time = 130;
    again.trigger_time = 130;
    let plan = lc.plan_fire(again, 130);
    assert_eq!(plan.step, Step::Refresh);
    assert_eq!(plan.expected_current(), Expected::Current(10));
    let refreshed = lc.commit(plan, None).unwrap();
    assert_eq!(refreshed.id, 10);
    assert_eq!(refreshed.first_trigger_time, 100);
    assert!(matches!(lc.state("h"), Some(HashState::Firing { .. })));
}

#[test]
fn quiet_during_pending_fire_forgets_hash() {
    let mut lc = Lifecycle::new();
    let mut event = firing_event(100);
    event.prom_for_duration = 60;
    let plan = lc.plan_fire(event, 100);
    assert_eq!(plan.step, Step::Hold);
    lc.commit(plan, None);
    assert_eq!(lc.hashes_for_rule(42), vec!["h".to_string()]);

    let plan = lc.plan_quiet("h", 115);
    assert!(!plan.persists());
    lc.commit(plan, None);
    assert!(lc.state("h").is_none());
}

#[test]
fn repeat_step_and_max_number_bound_notifications() {
    let mut event = firing_event(1000);
    event.notify_repeat_step = 5;
    event.notify_max_number = 2;
    assert!(should_notify_fire(&event, 1000));

    event.notify_cur_number = 1;
    event.last_sent_time = 1000;
    assert!(!should_notify_fire(&event, 1100));
    assert!(should_notify_fire(&event, 1300));

    event.notify_cur_number = 2;
    assert!(!should_notify_fire(&event, 1700));

    event.notify_max_number = 0;
    assert!(should_notify_fire(&event, 1700));

    event.notify_repeat_step = 0;
    assert!(!should_notify_fire(&event, 9999));

    event.status = STATUS_MUTED;
    event.notify_cur_number = 0;
    assert!(!should_notify_fire(&event, 9999));
}

#[test]
fn recovery_notice_needs_prior_notification() {
    let mut event = firing_event(100);
    assert!(!should_notify_recovery(&event));
    event.notify_cur_number = 1;
    assert!(should_notify_recovery(&event));
    event.notify_recovered = false;
    assert!(!should_notify_recovery(&event));
}

#[test]
fn birth_resets_counters() {
    let lc = Lifecycle::new();
    let mut event = firing_event(100);
    event.notify_cur_number = 4;
    event.last_sent_time = 50;
    let plan = lc.plan_fire(event, 100);
    assert_eq!(plan.step, Step::Birth);
    assert_eq!(plan.expected_current(), Expected::Absent);
    assert!(plan.notify);
    let event = plan.event.unwrap();
    assert_eq!(event.notify_cur_number, 1);
    assert_eq!(event.last_sent_time, 100);
}

// ---- mutes ----

fn mute_target() -> AlertEvent {
    AlertEvent {
        group_id: 1,
        rule_prod: "metric".to_string(),
        cate: "prometheus".to_string(),
        datasource_id: 3,
        severity: 2,
        tags: labels(&[("service", "api-gw"), ("env", "prod")]),
        ..Default::default()
    }
}

fn absolute_mute() -> MuteRow {
    MuteRow {
        id: 1,
        group_id: 1,
        cate: "prometheus".to_string(),
        prod: "metric".to_string(),
        btime: 100,
        etime: 200,
        ..Default::default()
    }
}

#[test]
fn absolute_window_is_half_open() {
    let utc = FixedOffset::east_opt(0).unwrap();
    let mute = CompiledMute::compile(&absolute_mute()).unwrap();
    let event = mute_target();
    assert!(mute.matches(&event, 100, &utc));
    assert!(mute.matches(&event, 199, &utc));
    assert!(!mute.matches(&event, 200, &utc));
    assert!(!mute.matches(&event, 99, &utc));
}

#[test]
fn periodic_window_follows_zone_and_weekday() {
    let mute = CompiledMute::compile(&periodic_mute()).unwrap();
    let event = mute_target();
    let utc = FixedOffset::east_opt(0).unwrap();
    assert!(mute.matches(&event, TUESDAY_2PM, &utc));

    // 14:00 UTC is 22:00 at +08:00
    let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
    assert!(!mute.matches(&event, TUESDAY_2PM, &shanghai));

    // Sunday 2023-12-31 14:00 UTC
    assert!(!mute.matches(&event, TUESDAY_2PM - 2 * 86_400, &utc));
}

#[test]
fn host_mutes_ignore_cate_and_datasource() {
    let utc = FixedOffset::east_opt(0).unwrap();
    let mut row = absolute_mute();
    row.prod = "host".to_string();
    row.cate = "other".to_string();
    row.datasource_ids = vec![99];
    let mute = CompiledMute::compile(&row).unwrap();

    let mut event = mute_target();
    event.rule_prod = "host".to_string();
    assert!(mute.matches(&event, 150, &utc));
}

#[test]
fn mute_scope_filters() {
    let utc = FixedOffset::east_opt(0).unwrap();
    let event = mute_target();

    let mut row = absolute_mute();
    row.datasource_ids = vec![4];
    assert!(!CompiledMute::compile(&row).unwrap().matches(&event, 150, &utc));
    row.datasource_ids = vec![0];
    assert!(CompiledMute::compile(&row).unwrap().matches(&event, 150, &utc));

    let mut row = absolute_mute();
    row.severities = vec![1];
    assert!(!CompiledMute::compile(&row).unwrap().matches(&event, 150, &utc));

    let mut row = absolute_mute();
    row.group_id = 2;
    assert!(!CompiledMute::compile(&row).unwrap().matches(&event, 150, &utc));

    let mut row = absolute_mute();
    row.tags = vec![
        TagFilterSpec::new("service", "=~", "^api"),
        TagFilterSpec::new("env", "!=", "dev"),
    ];
    let mute = CompiledMute::compile(&row).unwrap();
    assert!(is_muted(&event, [&mute], 150, &utc));

    row.tags = vec![TagFilterSpec::new("env", "in", "dev staging")];
    let mute = CompiledMute::compile(&row).unwrap();
    assert!(!is_muted(&event, [&mute], 150, &utc));
}

#[test]
fn invalid_mutes_do_not_compile() {
    let mut row = absolute_mute();
    row.etime = row.btime;
    assert!(CompiledMute::compile(&row).is_err());

    let mut row = periodic_mute();
    row.periodic_mutes = vec![PeriodicMute::new("22:00", "06:00", "1")];
    assert!(CompiledMute::compile(&row).is_err());

    let mut row = absolute_mute();
    row.tags = vec![TagFilterSpec::new("service", "=~", "(")];
    assert!(CompiledMute::compile(&row).is_err());
}

// ---- subscriptions ----

fn subscribed_event() -> AlertEvent {
    AlertEvent {
        group_id: 1,
        rule_id: 42,
        rule_prod: "metric".to_string(),
        cate: "prometheus".to_string(),
        datasource_id: 3,
        severity: 3,
        trigger_time: 1_000,
        first_trigger_time: 900,
        notify_channels: vec!["email".to_string()],
        callbacks: vec!["http://hook.local/a".to_string()],
        tags: labels(&[("service", "api-gw")]),
        ..Default::default()
    }
}

#[test]
fn subscription_scope_and_for_duration() {
    let event = subscribed_event();
    let sub = CompiledSubscription::compile(escalating_subscription()).unwrap();
    assert!(sub.matches(&event));

    let mut row = escalating_subscription();
    row.for_duration = 100;
    assert!(CompiledSubscription::compile(row.clone()).unwrap().matches(&event));
    row.for_duration = 101;
    assert!(!CompiledSubscription::compile(row).unwrap().matches(&event));

    let mut row = escalating_subscription();
    row.datasource_ids = vec![4];
    assert!(!CompiledSubscription::compile(row.clone()).unwrap().matches(&event));
    let mut local = event.clone();
    local.datasource_id = 0;
    assert!(CompiledSubscription::compile(row).unwrap().matches(&local));

    let mut row = escalating_subscription();
    row.prod = "host".to_string();
    assert!(!CompiledSubscription::compile(row).unwrap().matches(&event));

    let mut row = escalating_subscription();
    row.severities = vec![1, 2];
    assert!(!CompiledSubscription::compile(row.clone()).unwrap().matches(&event));
    row.severities = vec![3];
    assert!(CompiledSubscription::compile(row.clone()).unwrap().matches(&event));
    row.severities = vec![1, 0];
    assert!(CompiledSubscription::compile(row).unwrap().matches(&event));

    let mut row = escalating_subscription();
    row.rule_id = 0;
    row.tags = vec![TagFilterSpec::new("service", "==", "api-gw")];
    assert!(CompiledSubscription::compile(row).unwrap().matches(&event));
}

#[test]
fn subscription_apply_rewrites_fields() {
    let event = subscribed_event();
    let mut row = escalating_subscription();
    row.redefine_channels = true;
    row.new_channels = vec!["phone".to_string()];
    row.redefine_webhooks = true;
    row.webhooks = vec!["http://hook.local/b".to_string()];
    let sub = CompiledSubscription::compile(row).unwrap();

    let copies = route(&event, [&sub]);
    assert_eq!(copies.len(), 1);
    let copy = &copies[0];
    assert_eq!(copy.severity, 1);
    assert_eq!(copy.notify_channels, vec!["phone"]);
    assert_eq!(copy.callbacks, vec!["http://hook.local/b"]);
    assert_eq!(copy.notify_groups, vec!["7", "8"]);
    assert_eq!(copy.sub_rule_id, 5);
    assert_eq!(event.severity, 3);
}

#[test]
fn subscription_without_rule_or_tags_is_invalid() {
    let mut row = escalating_subscription();
    row.rule_id = 0;
    assert!(CompiledSubscription::compile(row).is_err());

    let mut row = escalating_subscription();
    row.user_group_ids = "7 x".to_string();
    assert!(CompiledSubscription::compile(row).is_err());
}

// ---- registry ----

#[test]
fn registry_skips_disabled_and_invalid_rows() {
    let mut disabled = rule();
    disabled.id = 43;
    disabled.disabled = true;

    let mut broken_mute = absolute_mute();
    broken_mute.id = 2;
    broken_mute.etime = 0;

    let mut broken_sub = escalating_subscription();
    broken_sub.id = 6;
    broken_sub.rule_id = 0;

    let mut global = escalating_subscription();
    global.id = 7;
    global.rule_id = 0;
    global.tags = vec![TagFilterSpec::new("service", "==", "api-gw")];

    let snapshot = RegistrySnapshot::build(
        vec![rule(), disabled],
        vec![absolute_mute(), broken_mute],
        vec![escalating_subscription(), broken_sub, global],
        vec![],
        vec![],
    );
    assert_eq!(snapshot.rule_count(), 1);
    assert!(snapshot.rule(43).is_none());
    assert_eq!(snapshot.mute_count(), 1);
    assert_eq!(snapshot.mutes_for_group(1).len(), 1);
    assert!(snapshot.mutes_for_group(9).is_empty());
    assert_eq!(snapshot.subscription_count(), 2);

    let ids: Vec<i64> = snapshot.subscriptions_for_rule(42).map(|s| s.id()).collect();
    assert_eq!(ids, vec![5, 7]);
    let ids: Vec<i64> = snapshot.subscriptions_for_rule(44).map(|s| s.id()).collect();
    assert_eq!(ids, vec![7]);
}

#[tokio::test]
async fn registry_reloads_from_store() {
    let dir = TempDir::new().unwrap();
    let store = Store::open_sqlite(&dir.path().join("alert.db")).await.unwrap();
    let saved = store.insert_alert_rule(&rule()).await.unwrap();
    store.insert_mute(&periodic_mute()).await.unwrap();

    let registry = Registry::new();
    assert_eq!(registry.snapshot().rule_count(), 0);
    registry.reload(&store).await.unwrap();

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.rule_count(), 1);
    assert_eq!(snapshot.rule(saved.id).unwrap().name, rule().name);
    assert_eq!(snapshot.mute_count(), 1);
}

// ---- templates ----

fn template_ctx(value: f64) -> TemplateContext {
    let tags: BTreeMap<String, String> = [
        ("instance".to_string(), "10.0.0.1:9100".to_string()),
        ("service".to_string(), "api".to_string()),
    ]
    .into_iter()
    .collect();
    TemplateContext {
        labels: tags.clone(),
        value,
        tags_map: tags,
        rule_name: "disk".to_string(),
        ..Default::default()
    }
}

#[test]
fn renders_prometheus_style_templates() {
    let r = HandlebarsRenderer::new().unwrap();
    let ctx = template_ctx(1_234_567.0);

    assert_eq!(r.render("{{ $value | humanize }}", &ctx).unwrap(), "1.235M");
    assert_eq!(r.render("{{ $labels.instance }}", &ctx).unwrap(), "10.0.0.1:9100");
    assert_eq!(r.render("{{ .TagsMap.service }}", &ctx).unwrap(), "api");
    assert_eq!(r.render("{{ index $labels \"service\" }}", &ctx).unwrap(), "api");
    assert_eq!(r.render("{{ printf \"%.2f\" $value }}", &ctx).unwrap(), "1234567.00");
    assert_eq!(r.render("{{ .RuleName | toUpper }}", &ctx).unwrap(), "DISK");
    assert_eq!(
        r.render("{{ if .IsRecovered }}ok{{ else }}firing{{ end }}", &ctx)
            .unwrap(),
        "firing"
    );
    assert_eq!(r.render("no actions", &ctx).unwrap(), "no actions");
}

#[test]
fn translation_of_pipelines() {
    let r = HandlebarsRenderer::new().unwrap();
    assert_eq!(
        r.translate("{{ $labels.instance | toUpper }}"),
        "{{toUpper labels.instance}}"
    );
    assert_eq!(
        r.translate("{{ $value | printf \"%.1f\" }}"),
        "{{printf \"%.1f\" value}}"
    );
    assert_eq!(r.translate("{{ range .TagsMap }}{{ . }}{{ end }}"), "{{#each TagsMap}}{{this}}{{/each}}");
}

#[test]
fn humanize_helpers() {
    assert_eq!(humanize(1_234_567.0), "1.235M");
    assert_eq!(humanize(0.0012), "1.2m");
    assert_eq!(humanize1024(1_048_576.0), "1Mi");
    assert_eq!(humanize_duration(3661.0), "1h 1m 1s");
    assert_eq!(humanize_duration(0.05), "50ms");
    assert_eq!(humanize_duration(0.0), "0s");
    assert_eq!(humanize_percentage(0.1234), "12.34%");
    assert_eq!(
        sprintf("%s=%d (%x)%%", &["cpu".into(), 255.into(), 255.into()]),
        "cpu=255 (ff)%"
    );
    assert_eq!(sprintf("%d", &[]), "%!d(MISSING)");
}

#[test]
fn sprintf_clamps_precision() {
    assert_eq!(sprintf("%.2f", &[1.5.into()]), "1.50");
    assert_eq!(sprintf("%.f", &[1.75.into()]), "2");
    let wide = sprintf("%.999999999f", &[1.5.into()]);
    assert_eq!(wide.len(), "1.".len() + 64);
    let overflow = sprintf("%.99999999999999999999999f", &[0.25.into()]);
    assert_eq!(overflow.len(), "0.".len() + 64);
    assert!(sprintf("%.999999999g", &[1.5.into()]).len() < 80);
}

#[test]
fn failed_fields_keep_raw_text() {
    let r = HandlebarsRenderer::new().unwrap();
    let rule = AlertRule {
        name: "broken {{#if}}".to_string(),
        note: "on {{ $labels.owner }}".to_string(),
        append_tags: vec!["owner={{ $labels.team }}-oncall".to_string()],
        ..Default::default()
    };
    let mut event = AlertEvent {
        tags: labels(&[("team", "dba")]),
        ..Default::default()
    };

    let errors = render_event_fields(&r, &rule, &mut event, 1.0);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "rule_name");
    assert_eq!(event.rule_name, "broken {{#if}}");
    assert_eq!(event.tags.get("owner"), Some("dba-oncall"));
    assert_eq!(event.rule_note, "on dba-oncall");
}
