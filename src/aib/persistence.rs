//! Background save queue (`spec.md` §4.3 "Persistence worker"): a single
//! task drains model-save jobs so a slow MS response never blocks a
//! session's training step.

use crate::aib::client::MsClient;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::time::Instant;

pub struct SaveJob {
    pub model_key: String,
    pub body: Value,
    /// updated with the round-trip latency in milliseconds once the save
    /// attempt completes, for the session's own metrics surface.
    pub latency_ms: Arc<AtomicU64>,
}

#[derive(Clone)]
pub struct PersistenceHandle {
    tx: UnboundedSender<SaveJob>,
}

impl PersistenceHandle {
    /// Non-blocking: a full queue never backs up a session's tick.
    /// Failures are dropped; the next save attempt supersedes
    /// (`spec.md` §7 "MS save failure").
    pub fn enqueue(&self, job: SaveJob) {
        let _ = self.tx.send(job);
    }
}

pub fn spawn_persistence_worker(ms_client: Arc<MsClient>) -> PersistenceHandle {
    let (tx, mut rx) = unbounded_channel::<SaveJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let started = Instant::now();
            if let Err(e) = ms_client.save_model(&job.model_key, &job.body).await {
                log::warn!("model save failed for {}: {e}", job.model_key);
            }
            job.latency_ms.store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
    });
    PersistenceHandle { tx }
}
