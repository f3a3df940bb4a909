use chrono::FixedOffset;
use n9e_common::time::{Clock, Deadline};
use n9e_common::types::EvalResult;
use n9e_notify::Emitter;
use n9e_storage::Store;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AlertError, Result};
use crate::lifecycle::Step;
use crate::processor::{IngestSummary, Processor};
use crate::registry::Registry;
use crate::template::Renderer;

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Collaborators shared by every worker.
pub struct EngineContext {
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub emitter: Arc<Emitter>,
    pub renderer: Arc<dyn Renderer>,
    pub clock: Arc<dyn Clock>,
    /// Zone periodic mutes are read in; `None` uses the server's local zone.
    pub mute_tz: Option<FixedOffset>,
}

enum Command {
    Ingest {
        result: EvalResult,
        deadline: Deadline,
        reply: oneshot::Sender<Result<Step>>,
    },
    Snapshot {
        rule_id: i64,
        results: Vec<EvalResult>,
        now: i64,
        deadline: Deadline,
        reply: oneshot::Sender<Result<IngestSummary>>,
    },
}

/// Sharded lifecycle engine.
///
/// Each worker owns the state of the rules with `rule_id % workers` equal to
/// its index, so every transition of a hash happens on one task and
/// different hashes proceed in parallel.
pub struct Engine {
    handle: EngineHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn start(ctx: Arc<EngineContext>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            senders.push(tx);
            let processor = Processor::new(Arc::clone(&ctx));
            handles.push(tokio::spawn(run_worker(shard, processor, rx)));
        }

        tracing::info!(workers, "Alert engine started");
        Self {
            handle: EngineHandle {
                senders: Arc::new(senders),
            },
            workers: handles,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Drops this engine's senders and waits for the workers to drain.
    /// Workers exit once every [`EngineHandle`] clone is gone.
    pub async fn shutdown(self) {
        drop(self.handle);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Alert worker panicked");
            }
        }
        tracing::info!("Alert engine stopped");
    }
}

async fn run_worker(shard: usize, mut processor: Processor, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Ingest {
                result,
                deadline,
                reply,
            } => {
                let rule_id = result.rule_id;
                let outcome = processor.ingest(result, &deadline).await;
                if let Err(e) = &outcome {
                    tracing::warn!(shard, rule_id, kind = %e.kind(), error = %e, "Ingest failed");
                }
                let _ = reply.send(outcome);
            }
            Command::Snapshot {
                rule_id,
                results,
                now,
                deadline,
                reply,
            } => {
                let outcome = processor
                    .ingest_snapshot(rule_id, results, now, &deadline)
                    .await;
                if let Err(e) = &outcome {
                    tracing::warn!(shard, rule_id, kind = %e.kind(), error = %e, "Snapshot ingest failed");
                }
                let _ = reply.send(outcome);
            }
        }
    }
    tracing::debug!(shard, "Alert worker exited");
}

/// Cheap cloneable entry point for evaluators.
#[derive(Clone)]
pub struct EngineHandle {
    senders: Arc<Vec<mpsc::Sender<Command>>>,
}

impl EngineHandle {
    fn shard(&self, rule_id: i64) -> &mpsc::Sender<Command> {
        let n = self.senders.len() as i64;
        &self.senders[rule_id.rem_euclid(n) as usize]
    }

    /// Feeds one evaluation and waits for its transition.
    pub async fn ingest(&self, result: EvalResult, deadline: Deadline) -> Result<Step> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Ingest {
            result: result.clone(),
            deadline,
            reply,
        };
        self.shard(result.rule_id)
            .send(cmd)
            .await
            .map_err(|_| AlertError::EngineStopped)?;
        rx.await.map_err(|_| AlertError::EngineStopped)?
    }

    /// Feeds a full evaluation round of one rule. Hashes the rule was
    /// tracking that are absent from `results` count as non-firing at `now`.
    pub async fn ingest_snapshot(
        &self,
        rule_id: i64,
        results: Vec<EvalResult>,
        now: i64,
        deadline: Deadline,
    ) -> Result<IngestSummary> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Snapshot {
            rule_id,
            results,
            now,
            deadline,
            reply,
        };
        self.shard(rule_id)
            .send(cmd)
            .await
            .map_err(|_| AlertError::EngineStopped)?;
        rx.await.map_err(|_| AlertError::EngineStopped)?
    }
}
