use anyhow::Result;
use n9e_alert::registry::RegistrySource;
use n9e_alert::{Engine, EngineContext, EngineHandle, HandlebarsRenderer, Registry};
use n9e_common::time::{Clock, Deadline};
use n9e_notify::{Emitter, NotificationTransport, RecordSink};
use n9e_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

/// Every long-lived component of the daemon, wired together.
pub struct App {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub emitter: Arc<Emitter>,
    clock: Arc<dyn Clock>,
    engine: Engine,
    config: ServerConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Connects (and migrates) the store, loads the registry and starts the
    /// engine workers. Background loops are started by
    /// [`App::spawn_background`].
    pub async fn build(
        config: ServerConfig,
        transport: Arc<dyn NotificationTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.database_url.is_none() {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| {
                anyhow::anyhow!("Failed to create data dir '{}': {}", config.data_dir, e)
            })?;
        }
        let store = Arc::new(Store::new(&config.connection_url()).await?);

        let registry = Arc::new(Registry::new());
        if let Err(e) = registry.reload(store.as_ref()).await {
            tracing::error!(error = %e, "Failed to load registry from DB");
        }

        let sink: Arc<dyn RecordSink> = store.clone();
        let emitter = Arc::new(Emitter::new(
            transport,
            Arc::new(config.notify.contacts.clone()),
            sink,
            clock.clone(),
            config.notify.queue_capacity,
        ));

        let ctx = Arc::new(EngineContext {
            store: store.clone(),
            registry: registry.clone(),
            emitter: emitter.clone(),
            renderer: Arc::new(HandlebarsRenderer::new()?),
            clock: clock.clone(),
            mute_tz: config.engine.mute_offset()?,
        });
        let engine = Engine::start(ctx, config.engine.workers, config.engine.queue_depth);

        Ok(Self {
            store,
            registry,
            emitter,
            clock,
            engine,
            config,
            tasks: Vec::new(),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.engine.handle()
    }

    /// Deadline for one evaluation round, from `engine.eval_deadline_secs`.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.engine.eval_deadline())
    }

    /// Registry reload, expired-mute sweep and notification dispatch loops.
    pub fn spawn_background(&mut self) {
        let source: Arc<dyn RegistrySource> = self.store.clone();
        let every = Duration::from_secs(self.config.registry.reload_interval_secs.max(1));
        self.tasks
            .push(tokio::spawn(self.registry.clone().run(source, every)));

        let sweep_secs = self.config.mute.sweep_interval_secs;
        if sweep_secs > 0 {
            self.tasks.push(tokio::spawn(sweep_expired_mutes(
                self.store.clone(),
                self.clock.clone(),
                Duration::from_secs(sweep_secs),
            )));
        } else {
            tracing::info!("Expired mute sweep disabled");
        }

        let every = Duration::from_millis(self.config.notify.dispatch_interval_ms.max(1));
        self.tasks.push(tokio::spawn(self.emitter.clone().run(every)));
    }

    /// Stops the background loops, drains the engine and flushes queued
    /// notifications. Every [`EngineHandle`] handed out must be dropped
    /// first, otherwise the engine workers keep waiting for input.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.engine.shutdown().await;

        let stats = self.emitter.dispatch_pending().await;
        tracing::info!(
            sent = stats.sent,
            failed = stats.failed,
            dropped = self.emitter.dropped_total(),
            "Flushed notification queues"
        );
    }
}

async fn sweep_expired_mutes(store: Arc<Store>, clock: Arc<dyn Clock>, every: Duration) {
    let mut tick = tokio::time::interval(every);
    loop {
        tick.tick().await;
        if let Err(e) = store.sweep_expired_mutes(clock.unix()).await {
            tracing::error!(error = %e, "Expired mute sweep failed");
        }
    }
}
