mod common;

use anyhow::{anyhow, Result};
use common::{build_test_context, disk_rule, MONDAY_10AM};
use n9e_alert::Step;
use n9e_common::labels::LabelSet;
use n9e_common::time::Deadline;
use n9e_common::types::EvalResult;
use n9e_storage::store::{MuteRow, MuteTimeType, NotificationRecordFilter};

fn host(ident: &str) -> LabelSet {
    [("ident", ident), ("mountpoint", "/")].into_iter().collect()
}

#[tokio::test]
async fn fire_and_recover_through_the_daemon() -> Result<()> {
    let ctx = build_test_context()?;
    let seed = ctx.seed_store().await?;
    seed.insert_alert_rule(&disk_rule()).await?;
    drop(seed);

    let app = ctx.build_app().await?;
    assert_eq!(app.registry.snapshot().rule_count(), 1);
    let handle = app.handle();

    let step = handle
        .ingest(EvalResult::fire(7001, host("db-01"), 97.0, MONDAY_10AM), app.deadline())
        .await?;
    assert_eq!(step, Step::Birth);

    ctx.clock.advance(60);
    let summary = handle
        .ingest_snapshot(7001, vec![], MONDAY_10AM + 60, Deadline::none())
        .await?;
    assert_eq!(summary.recovered, 1);

    let history = app
        .store
        .history_for_hash(&n9e_common::fingerprint::fingerprint(7001, &host("db-01")))
        .await?;
    assert_eq!(history.len(), 2);
    let born = history
        .first()
        .ok_or_else(|| anyhow!("birth row should exist"))?;
    assert_eq!(born.rule_name, "disk full on db-01");

    drop(handle);
    let store = app.store.clone();
    app.shutdown().await;

    // firing + recovery, both flushed on shutdown
    let sent = ctx.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|i| i.target == "ops@example.com"));
    assert!(sent[1].event.is_recovered);
    let records = store
        .count_notification_records(&NotificationRecordFilter::default())
        .await?;
    assert_eq!(records, 2);
    Ok(())
}

#[tokio::test]
async fn stored_mute_silences_new_events() -> Result<()> {
    let ctx = build_test_context()?;
    let seed = ctx.seed_store().await?;
    seed.insert_alert_rule(&disk_rule()).await?;
    seed.insert_mute(&MuteRow {
        group_id: 1,
        cate: "prometheus".to_string(),
        prod: "metric".to_string(),
        mute_time_type: MuteTimeType::TimeRange,
        btime: MONDAY_10AM - 3600,
        etime: MONDAY_10AM + 3600,
        ..Default::default()
    })
    .await?;
    drop(seed);

    let app = ctx.build_app().await?;
    let handle = app.handle();
    handle
        .ingest(EvalResult::fire(7001, host("db-02"), 99.0, MONDAY_10AM), Deadline::none())
        .await?;

    let current = app
        .store
        .get_current_by_hash(&n9e_common::fingerprint::fingerprint(7001, &host("db-02")))
        .await?
        .ok_or_else(|| anyhow!("muted event should still be persisted"))?;
    assert!(current.is_muted());
    assert_eq!(app.emitter.pending().await, 0);

    drop(handle);
    app.shutdown().await;
    assert!(ctx.transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_rule_reports_error() -> Result<()> {
    let ctx = build_test_context()?;
    let app = ctx.build_app().await?;
    let handle = app.handle();

    let err = handle
        .ingest(EvalResult::fire(1, host("db-03"), 1.0, MONDAY_10AM), Deadline::none())
        .await
        .err()
        .ok_or_else(|| anyhow!("ingest should fail for an unknown rule"))?;
    assert!(matches!(err, n9e_alert::AlertError::RuleNotFound(1)));

    drop(handle);
    app.shutdown().await;
    Ok(())
}
