//! Presence events emitted by the dispatcher for ONLINE / OFFLINE envelopes.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use messagehive_core::protocol::Envelope;

use crate::obs::HubMetrics;
use crate::workers::transient::TransientStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEventKind {
    Online,
    Offline,
}

impl fmt::Display for PresenceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PresenceEventKind::Online => "online",
            PresenceEventKind::Offline => "offline",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    pub identity: String,
    pub kind: PresenceEventKind,
}

/// Consumes presence events. When a user comes online, everything parked for
/// them in the transient store is pushed back onto the inbound queue.
pub struct EventWorker {
    rx: mpsc::Receiver<PresenceEvent>,
    transient: Arc<dyn TransientStore>,
    inbound: mpsc::Sender<Envelope>,
    metrics: Arc<HubMetrics>,
}

impl EventWorker {
    pub fn new(
        rx: mpsc::Receiver<PresenceEvent>,
        transient: Arc<dyn TransientStore>,
        inbound: mpsc::Sender<Envelope>,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self { rx, transient, inbound, metrics }
    }

    pub async fn run(mut self) {
        while let Some(ev) = self.rx.recv().await {
            let kind = ev.kind.to_string();
            self.metrics.presence_events.inc(&[("kind", kind.as_str())]);

            match ev.kind {
                PresenceEventKind::Online => {
                    tracing::info!(uid = %ev.identity, "user online");
                    self.replay_parked(&ev.identity).await;
                }
                PresenceEventKind::Offline => {
                    tracing::info!(uid = %ev.identity, "user offline");
                }
            }
        }
        tracing::debug!("event worker stopped");
    }

    async fn replay_parked(&self, identity: &str) {
        let parked = match self.transient.drain(identity).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(uid = %identity, error = %e, "transient drain failed");
                return;
            }
        };
        if parked.is_empty() {
            return;
        }

        tracing::debug!(uid = %identity, count = parked.len(), "replaying parked envelopes");
        self.metrics.transient.add(&[("stage", "replayed")], parked.len() as u64);

        // Never await the inbound queue here: the dispatcher can be parked
        // on our own event channel.
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            for env in parked {
                if inbound.send(env).await.is_err() {
                    tracing::warn!("inbound queue closed during replay");
                    break;
                }
            }
        });
    }
}
