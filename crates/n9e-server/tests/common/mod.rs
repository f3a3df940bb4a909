#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use n9e_common::time::ManualClock;
use n9e_common::types::AlertRule;
use n9e_notify::{NotificationIntent, NotificationTransport, StaticContacts};
use n9e_server::app::App;
use n9e_server::config::{EngineConfig, NotifyConfig, ServerConfig};
use n9e_storage::Store;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Monday 2024-01-01 10:00:00 UTC.
pub const MONDAY_10AM: i64 = 1_704_103_200;

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<NotificationIntent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<NotificationIntent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, intent: &NotificationIntent) -> n9e_notify::Result<String> {
        self.sent.lock().unwrap().push(intent.clone());
        Ok("delivered".to_string())
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: ServerConfig,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
}

pub fn test_config(temp_dir: &TempDir) -> ServerConfig {
    let mut contacts = StaticContacts::new();
    contacts.add("7", "email", "ops@example.com");
    ServerConfig {
        data_dir: temp_dir.path().join("data").to_string_lossy().to_string(),
        engine: EngineConfig {
            workers: 2,
            mute_utc_offset: Some("+00:00".to_string()),
            ..Default::default()
        },
        notify: NotifyConfig {
            contacts,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = test_config(&temp_dir);
    Ok(TestContext {
        temp_dir,
        config,
        clock: Arc::new(ManualClock::new(MONDAY_10AM)),
        transport: Arc::new(RecordingTransport::default()),
    })
}

impl TestContext {
    /// Opens the store the app will use, for seeding before `build_app`.
    pub async fn seed_store(&self) -> Result<Store> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        Ok(Store::new(&self.config.connection_url()).await?)
    }

    pub async fn build_app(&self) -> Result<App> {
        App::build(
            self.config.clone(),
            self.transport.clone(),
            self.clock.clone(),
        )
        .await
    }
}

pub fn disk_rule() -> AlertRule {
    AlertRule {
        id: 7001,
        group_id: 1,
        cate: "prometheus".to_string(),
        prod: "metric".to_string(),
        name: "disk full on {{ $labels.ident }}".to_string(),
        severity: 2,
        prom_eval_interval: 30,
        notify_recovered: true,
        notify_channels: vec!["email".to_string()],
        notify_groups: vec!["7".to_string()],
        ..Default::default()
    }
}
