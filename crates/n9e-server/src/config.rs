use chrono::FixedOffset;
use n9e_notify::StaticContacts;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Full database URL. When unset a SQLite file under `data_dir` is used.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub mute: MuteConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            engine: EngineConfig::default(),
            registry: RegistryConfig::default(),
            mute: MuteConfig::default(),
            notify: NotifyConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn connection_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => {
                let file = Path::new(&self.data_dir).join("n9e.db");
                format!("sqlite://{}?mode=rwc", file.display())
            }
        }
    }

    /// The URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        let Some((scheme, rest)) = url.split_once("://") else {
            return url;
        };
        match rest.split_once('@') {
            Some((userinfo, host)) => {
                let user = userinfo.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            None => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Commands buffered per worker before `ingest` waits.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_eval_deadline_secs")]
    pub eval_deadline_secs: u64,
    /// Offset periodic mutes are evaluated in, e.g. `"+08:00"`. Unset means
    /// the host's local zone.
    #[serde(default)]
    pub mute_utc_offset: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            eval_deadline_secs: default_eval_deadline_secs(),
            mute_utc_offset: None,
        }
    }
}

impl EngineConfig {
    pub fn eval_deadline(&self) -> Duration {
        Duration::from_secs(self.eval_deadline_secs)
    }

    pub fn mute_offset(&self) -> anyhow::Result<Option<FixedOffset>> {
        match self.mute_utc_offset.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<FixedOffset>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("Invalid engine.mute_utc_offset '{}': {}", raw, e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: default_reload_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteConfig {
    /// 0 disables the expired-mute sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for MuteConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Capacity of each per-channel queue.
    #[serde(default = "default_notify_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// User group id -> channel -> recipients.
    #[serde(default)]
    pub contacts: StaticContacts,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_notify_queue_capacity(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            contacts: StaticContacts::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive for the workspace crates.
    pub fn directive(&self) -> String {
        format!("n9e={}", self.level.trim())
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    n9e_alert::DEFAULT_QUEUE_DEPTH
}

fn default_eval_deadline_secs() -> u64 {
    10
}

fn default_reload_interval_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_notify_queue_capacity() -> usize {
    n9e_notify::DEFAULT_QUEUE_CAPACITY
}

fn default_dispatch_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}
