//! Transient queue: durable fallback for envelopes addressed to offline users.
//!
//! The dispatcher hands envelopes over on a bounded channel and never hears
//! back. Hand-off is at-least-once; the store decides what "durable" means.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use messagehive_core::error::Result;
use messagehive_core::protocol::Envelope;

use crate::obs::HubMetrics;

#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Park an envelope under its recipient.
    async fn push(&self, env: Envelope) -> Result<()>;
    /// Take every parked envelope for `recipient`, oldest first.
    async fn drain(&self, recipient: &str) -> Result<Vec<Envelope>>;
}

/// Per-recipient FIFO kept in process memory.
#[derive(Default)]
pub struct MemoryTransientStore {
    queues: DashMap<String, VecDeque<Envelope>>,
}

impl MemoryTransientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, recipient: &str) -> usize {
        self.queues.get(recipient).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TransientStore for MemoryTransientStore {
    async fn push(&self, env: Envelope) -> Result<()> {
        self.queues
            .entry(env.recipient_id.clone())
            .or_insert_with(VecDeque::new)
            .push_back(env);
        Ok(())
    }

    async fn drain(&self, recipient: &str) -> Result<Vec<Envelope>> {
        Ok(self
            .queues
            .remove(recipient)
            .map(|(_, q)| q.into_iter().collect())
            .unwrap_or_default())
    }
}

pub struct TransientWorker {
    rx: mpsc::Receiver<Envelope>,
    store: Arc<dyn TransientStore>,
    metrics: Arc<HubMetrics>,
}

impl TransientWorker {
    pub fn new(rx: mpsc::Receiver<Envelope>, store: Arc<dyn TransientStore>, metrics: Arc<HubMetrics>) -> Self {
        Self { rx, store, metrics }
    }

    /// Runs until every sender of the transient channel is dropped.
    pub async fn run(mut self) {
        while let Some(env) = self.rx.recv().await {
            let mid = env.message_id.clone();
            let rid = env.recipient_id.clone();
            match self.store.push(env).await {
                Ok(()) => {
                    self.metrics.transient.inc(&[("stage", "stored")]);
                    tracing::debug!(mid = %mid, rid = %rid, "envelope parked in transient store");
                }
                Err(e) => {
                    tracing::error!(mid = %mid, rid = %rid, error = %e, "transient store push failed");
                }
            }
        }
        tracing::debug!("transient worker stopped");
    }
}
