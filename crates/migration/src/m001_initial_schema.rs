use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS busi_group (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    update_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS target (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL DEFAULT 0,
    ident TEXT NOT NULL UNIQUE,
    note TEXT NOT NULL DEFAULT '',
    update_at INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_target_group_id ON target(group_id);

CREATE TABLE IF NOT EXISTS alert_rule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL DEFAULT 0,
    cate TEXT NOT NULL DEFAULT '',
    datasource_ids TEXT NOT NULL DEFAULT '[]',
    cluster TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    prod TEXT NOT NULL DEFAULT '',
    severity INTEGER NOT NULL DEFAULT 3,
    disabled INTEGER NOT NULL DEFAULT 0,
    prom_for_duration INTEGER NOT NULL DEFAULT 0,
    prom_eval_interval INTEGER NOT NULL DEFAULT 0,
    rule_config TEXT NOT NULL DEFAULT '{}',
    notify_recovered INTEGER NOT NULL DEFAULT 0,
    notify_channels TEXT NOT NULL DEFAULT '',
    notify_groups TEXT NOT NULL DEFAULT '',
    notify_repeat_step INTEGER NOT NULL DEFAULT 0,
    notify_max_number INTEGER NOT NULL DEFAULT 0,
    recover_duration INTEGER NOT NULL DEFAULT 0,
    inhibit INTEGER NOT NULL DEFAULT 0,
    callbacks TEXT NOT NULL DEFAULT '',
    runbook_url TEXT NOT NULL DEFAULT '',
    append_tags TEXT NOT NULL DEFAULT '',
    annotations TEXT NOT NULL DEFAULT '{}',
    create_at INTEGER NOT NULL DEFAULT 0,
    update_at INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_alert_rule_group_id ON alert_rule(group_id);

CREATE TABLE IF NOT EXISTS alert_cur_event (
    id INTEGER PRIMARY KEY NOT NULL,
    cate TEXT NOT NULL DEFAULT '',
    cluster TEXT NOT NULL DEFAULT '',
    datasource_id INTEGER NOT NULL DEFAULT 0,
    group_id INTEGER NOT NULL DEFAULT 0,
    group_name TEXT NOT NULL DEFAULT '',
    hash TEXT NOT NULL,
    rule_id INTEGER NOT NULL,
    rule_name TEXT NOT NULL DEFAULT '',
    rule_note TEXT NOT NULL DEFAULT '',
    rule_prod TEXT NOT NULL DEFAULT '',
    rule_config TEXT NOT NULL DEFAULT '{}',
    severity INTEGER NOT NULL DEFAULT 3,
    prom_for_duration INTEGER NOT NULL DEFAULT 0,
    prom_eval_interval INTEGER NOT NULL DEFAULT 0,
    callbacks TEXT NOT NULL DEFAULT '',
    runbook_url TEXT NOT NULL DEFAULT '',
    notify_recovered INTEGER NOT NULL DEFAULT 0,
    notify_channels TEXT NOT NULL DEFAULT '',
    notify_groups TEXT NOT NULL DEFAULT '',
    notify_repeat_step INTEGER NOT NULL DEFAULT 0,
    notify_max_number INTEGER NOT NULL DEFAULT 0,
    notify_cur_number INTEGER NOT NULL DEFAULT 0,
    recover_duration INTEGER NOT NULL DEFAULT 0,
    target_ident TEXT NOT NULL DEFAULT '',
    target_note TEXT NOT NULL DEFAULT '',
    first_trigger_time INTEGER NOT NULL DEFAULT 0,
    trigger_time INTEGER NOT NULL,
    trigger_value TEXT NOT NULL DEFAULT '',
    annotations TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    claimant TEXT NOT NULL DEFAULT '',
    sub_rule_id INTEGER NOT NULL DEFAULT 0,
    last_eval_time INTEGER NOT NULL DEFAULT 0,
    last_sent_time INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_alert_cur_event_hash ON alert_cur_event(hash);
CREATE INDEX IF NOT EXISTS idx_alert_cur_event_rule_id ON alert_cur_event(rule_id);
CREATE INDEX IF NOT EXISTS idx_alert_cur_event_trigger_time ON alert_cur_event(trigger_time);

CREATE TABLE IF NOT EXISTS alert_his_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    is_recovered INTEGER NOT NULL DEFAULT 0,
    cate TEXT NOT NULL DEFAULT '',
    cluster TEXT NOT NULL DEFAULT '',
    datasource_id INTEGER NOT NULL DEFAULT 0,
    group_id INTEGER NOT NULL DEFAULT 0,
    group_name TEXT NOT NULL DEFAULT '',
    hash TEXT NOT NULL,
    rule_id INTEGER NOT NULL,
    rule_name TEXT NOT NULL DEFAULT '',
    rule_note TEXT NOT NULL DEFAULT '',
    rule_prod TEXT NOT NULL DEFAULT '',
    rule_config TEXT NOT NULL DEFAULT '{}',
    severity INTEGER NOT NULL DEFAULT 3,
    prom_for_duration INTEGER NOT NULL DEFAULT 0,
    prom_eval_interval INTEGER NOT NULL DEFAULT 0,
    callbacks TEXT NOT NULL DEFAULT '',
    runbook_url TEXT NOT NULL DEFAULT '',
    notify_recovered INTEGER NOT NULL DEFAULT 0,
    notify_channels TEXT NOT NULL DEFAULT '',
    notify_groups TEXT NOT NULL DEFAULT '',
    notify_repeat_step INTEGER NOT NULL DEFAULT 0,
    notify_max_number INTEGER NOT NULL DEFAULT 0,
    notify_cur_number INTEGER NOT NULL DEFAULT 0,
    recover_duration INTEGER NOT NULL DEFAULT 0,
    target_ident TEXT NOT NULL DEFAULT '',
    target_note TEXT NOT NULL DEFAULT '',
    first_trigger_time INTEGER NOT NULL DEFAULT 0,
    trigger_time INTEGER NOT NULL,
    trigger_value TEXT NOT NULL DEFAULT '',
    annotations TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    claimant TEXT NOT NULL DEFAULT '',
    sub_rule_id INTEGER NOT NULL DEFAULT 0,
    last_eval_time INTEGER NOT NULL DEFAULT 0,
    last_sent_time INTEGER NOT NULL DEFAULT 0,
    recover_time INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_alert_his_event_hash ON alert_his_event(hash);
CREATE INDEX IF NOT EXISTS idx_alert_his_event_rule_id ON alert_his_event(rule_id);
CREATE INDEX IF NOT EXISTS idx_alert_his_event_trigger_time ON alert_his_event(trigger_time);
CREATE INDEX IF NOT EXISTS idx_alert_his_event_last_eval_time ON alert_his_event(last_eval_time);

CREATE TABLE IF NOT EXISTS alert_mute (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL DEFAULT 0,
    note TEXT NOT NULL DEFAULT '',
    cate TEXT NOT NULL DEFAULT '',
    prod TEXT NOT NULL DEFAULT '',
    datasource_ids TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    cause TEXT NOT NULL DEFAULT '',
    btime INTEGER NOT NULL DEFAULT 0,
    etime INTEGER NOT NULL DEFAULT 0,
    disabled INTEGER NOT NULL DEFAULT 0,
    mute_time_type INTEGER NOT NULL DEFAULT 0,
    periodic_mutes TEXT NOT NULL DEFAULT '[]',
    severities TEXT NOT NULL DEFAULT '[]',
    create_at INTEGER NOT NULL DEFAULT 0,
    create_by TEXT NOT NULL DEFAULT '',
    update_at INTEGER NOT NULL DEFAULT 0,
    update_by TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_alert_mute_group_id ON alert_mute(group_id);

CREATE TABLE IF NOT EXISTS alert_subscribe (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT '',
    disabled INTEGER NOT NULL DEFAULT 0,
    group_id INTEGER NOT NULL DEFAULT 0,
    prod TEXT NOT NULL DEFAULT '',
    cate TEXT NOT NULL DEFAULT '',
    datasource_ids TEXT NOT NULL DEFAULT '[]',
    rule_id INTEGER NOT NULL DEFAULT 0,
    severities TEXT NOT NULL DEFAULT '[]',
    for_duration INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    redefine_severity INTEGER NOT NULL DEFAULT 0,
    new_severity INTEGER NOT NULL DEFAULT 0,
    redefine_channels INTEGER NOT NULL DEFAULT 0,
    new_channels TEXT NOT NULL DEFAULT '',
    user_group_ids TEXT NOT NULL DEFAULT '',
    redefine_webhooks INTEGER NOT NULL DEFAULT 0,
    webhooks TEXT NOT NULL DEFAULT '[]',
    create_at INTEGER NOT NULL DEFAULT 0,
    create_by TEXT NOT NULL DEFAULT '',
    update_at INTEGER NOT NULL DEFAULT 0,
    update_by TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_alert_subscribe_rule_id ON alert_subscribe(rule_id);

CREATE TABLE IF NOT EXISTS alert_aggr_view (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    rule TEXT NOT NULL DEFAULT '',
    cate INTEGER NOT NULL DEFAULT 0,
    create_at INTEGER NOT NULL DEFAULT 0,
    create_by INTEGER NOT NULL DEFAULT 0,
    update_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notification_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    sub_id INTEGER NOT NULL DEFAULT 0,
    channel TEXT NOT NULL,
    status INTEGER NOT NULL,
    target TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_record_event_id ON notification_record(event_id);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS notification_record;
DROP TABLE IF EXISTS alert_aggr_view;
DROP TABLE IF EXISTS alert_subscribe;
DROP TABLE IF EXISTS alert_mute;
DROP TABLE IF EXISTS alert_his_event;
DROP TABLE IF EXISTS alert_cur_event;
DROP TABLE IF EXISTS alert_rule;
DROP TABLE IF EXISTS target;
DROP TABLE IF EXISTS busi_group;
";
