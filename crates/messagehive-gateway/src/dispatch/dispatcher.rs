use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;

use messagehive_core::protocol::{Classification, Envelope, GroupAction, GroupActionKind};

use crate::config::DispatchSection;
use crate::directory::{EntityKind, MembershipAction, PresenceDirectory};
use crate::obs::HubMetrics;
use crate::workers::{PresenceEvent, PresenceEventKind};

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Budget for each ack / direct delivery attempt.
    pub delivery_timeout: Duration,
    /// 0 = re-queue timed-out deliveries without limit.
    pub max_delivery_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(1),
            max_delivery_attempts: 0,
        }
    }
}

impl From<&DispatchSection> for DispatchConfig {
    fn from(s: &DispatchSection) -> Self {
        Self {
            delivery_timeout: Duration::from_millis(s.delivery_timeout_ms),
            max_delivery_attempts: s.max_delivery_attempts,
        }
    }
}

/// Per-envelope switches flipped by the classification scan.
struct Effects {
    /// Route to the recipient after the scan.
    send: bool,
    /// Acknowledge to the sender.
    respond: bool,
}

/// The inbound control loop: classify, mutate presence, acknowledge, route.
pub struct Dispatcher {
    directory: Arc<PresenceDirectory>,
    events: mpsc::Sender<PresenceEvent>,
    requeue: Requeue,
    cfg: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        directory: Arc<PresenceDirectory>,
        inbound: mpsc::Sender<Envelope>,
        events: mpsc::Sender<PresenceEvent>,
        transient: mpsc::Sender<Envelope>,
        metrics: Arc<HubMetrics>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            events,
            requeue: Requeue {
                inbound,
                transient,
                metrics,
                max_attempts: cfg.max_delivery_attempts,
            },
            cfg,
        }
    }

    /// Drain the inbound queue. Returns once every producer is gone.
    pub async fn run(&self, mut rx: mpsc::Receiver<Envelope>) {
        tracing::info!("dispatcher started");
        while let Some(env) = rx.recv().await {
            self.handle(env).await;
        }
        tracing::info!("dispatcher stopped");
    }

    /// Process a single envelope.
    pub async fn handle(&self, env: Envelope) {
        let started = Instant::now();
        let metrics = Arc::clone(&self.requeue.metrics);
        metrics.dispatched.inc(&[]);

        let class = env.classification;
        let sender = match self.directory.lookup(&env.sender_id) {
            Ok(entity) => Some(entity),
            Err(e) if class.bypasses_sender_check() => {
                tracing::trace!(sid = %env.sender_id, error = %e, "sender check bypassed");
                None
            }
            Err(e) => {
                tracing::debug!(mid = %env.message_id, error = %e, "envelope from unknown sender dropped");
                metrics.dropped.inc(&[("reason", "unknown_sender")]);
                return;
            }
        };

        let mut ack = Envelope::acknowledgement_for(&env);
        let mut fx = Effects { send: true, respond: true };

        for bit in class.iter() {
            match bit {
                Classification::GROUP => {
                    if let Some(body) = self.apply_group_action(&env).await {
                        ack.body = body.to_string();
                        fx.send = false;
                    }
                }
                Classification::EVENT => fx.respond = false,
                Classification::ONLINE => {
                    self.emit(&env.sender_id, PresenceEventKind::Online).await;
                    fx.send = false;
                }
                Classification::OFFLINE => {
                    self.emit(&env.sender_id, PresenceEventKind::Offline).await;
                    fx.send = false;
                    fx.respond = false;
                }
                _ => {}
            }
        }

        if fx.respond {
            match sender.as_ref().and_then(|s| s.delivery()) {
                Some(tx) => self.acknowledge(tx.clone(), ack),
                None => tracing::debug!(mid = %env.message_id, sid = %env.sender_id, "no sender channel, ack skipped"),
            }
        }

        if fx.send {
            self.route(env).await;
        }

        metrics.dispatch_duration.observe(&[], started.elapsed());
    }

    /// Applies join / invite / leave. Returns the ack body when the action
    /// consumed the envelope (no further routing).
    async fn apply_group_action(&self, env: &Envelope) -> Option<&'static str> {
        let req = GroupAction::decode(&env.body).unwrap_or_else(|e| {
            tracing::info!(mid = %env.message_id, error = %e, "group body not decoded");
            self.requeue.metrics.decode_errors.inc(&[("kind", "group")]);
            GroupAction::default()
        });
        let gid = env.recipient_id.as_str();

        match req.action {
            GroupActionKind::Join => {
                if self.directory.lookup(gid).is_err() {
                    if let Err(e) = self.directory.register_group(gid, req.members, true).await {
                        tracing::error!(gid = %gid, error = %e, "join: group registration failed");
                    }
                }
            }
            GroupActionKind::Invite => {
                if let Err(e) = self
                    .directory
                    .update_membership(gid, MembershipAction::Add, &req.members)
                    .await
                {
                    tracing::error!(gid = %gid, error = %e, "invite: membership update failed");
                }
            }
            GroupActionKind::Leave => {
                if let Err(e) = self
                    .directory
                    .update_membership(gid, MembershipAction::Delete, &req.members)
                    .await
                {
                    tracing::error!(gid = %gid, error = %e, "leave: membership update failed");
                }
            }
            GroupActionKind::Send | GroupActionKind::Unknown(_) => return None,
        }

        GroupAction::success_body(&req.action)
    }

    async fn emit(&self, identity: &str, kind: PresenceEventKind) {
        let ev = PresenceEvent {
            identity: identity.to_string(),
            kind,
        };
        if self.events.send(ev).await.is_err() {
            tracing::warn!(uid = %identity, %kind, "event channel closed, presence event lost");
        }
    }

    /// Fire-and-forget ack. A timed-out ack is dropped, never retried.
    fn acknowledge(&self, tx: mpsc::Sender<Envelope>, ack: Envelope) {
        let budget = self.cfg.delivery_timeout;
        let metrics = Arc::clone(&self.requeue.metrics);
        tokio::spawn(async move {
            let rid = ack.recipient_id.clone();
            match timeout(budget, tx.send(ack)).await {
                Ok(Ok(())) => {
                    metrics.acks.inc(&[("result", "delivered")]);
                    tracing::debug!(rid = %rid, "ack delivered");
                }
                Ok(Err(_)) => {
                    metrics.acks.inc(&[("result", "closed")]);
                    tracing::debug!(rid = %rid, "ack dropped, channel closed");
                }
                Err(_) => {
                    metrics.acks.inc(&[("result", "timeout")]);
                    tracing::warn!(rid = %rid, "ack dropped, delivery timed out");
                }
            }
        });
    }

    async fn route(&self, env: Envelope) {
        let recipient = match self.directory.lookup(&env.recipient_id) {
            Ok(r) => r,
            Err(e) => {
                if env.classification.contains(Classification::TRANSIENT) {
                    self.requeue.park(env).await;
                } else {
                    tracing::debug!(mid = %env.message_id, error = %e, "recipient offline, envelope dropped");
                    self.requeue.metrics.dropped.inc(&[("reason", "unknown_recipient")]);
                }
                return;
            }
        };

        match recipient.kind {
            EntityKind::Group { members } => {
                let mut copies = 0u64;
                for member in members.iter().filter(|m| **m != env.sender_id) {
                    self.requeue.reinject(env.readdressed(member));
                    copies += 1;
                }
                self.requeue.metrics.fanout_copies.add(&[], copies);
                tracing::debug!(mid = %env.message_id, gid = %env.recipient_id, copies, "group fan-out");
            }
            EntityKind::User { delivery } => self.deliver(delivery, env),
        }
    }

    /// Direct delivery on its own task. A stalled or closed recipient sends
    /// the envelope back through the inbound queue.
    fn deliver(&self, tx: mpsc::Sender<Envelope>, env: Envelope) {
        let budget = self.cfg.delivery_timeout;
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            match timeout(budget, tx.reserve()).await {
                Ok(Ok(permit)) => {
                    tracing::info!(mid = %env.message_id, sid = %env.sender_id, rid = %env.recipient_id, "envelope delivered");
                    permit.send(env);
                    requeue.metrics.deliveries.inc(&[("result", "delivered")]);
                }
                Ok(Err(_)) => {
                    requeue.metrics.deliveries.inc(&[("result", "closed")]);
                    requeue.retry(env).await;
                }
                Err(_) => {
                    tracing::debug!(mid = %env.message_id, rid = %env.recipient_id, "delivery timed out");
                    requeue.retry(env).await;
                }
            }
        });
    }
}

/// Re-injection side of the dispatcher, cloned into delivery tasks.
#[derive(Clone)]
struct Requeue {
    inbound: mpsc::Sender<Envelope>,
    transient: mpsc::Sender<Envelope>,
    metrics: Arc<HubMetrics>,
    max_attempts: u32,
}

impl Requeue {
    /// Append to the inbound queue without ever blocking the caller.
    fn reinject(&self, env: Envelope) {
        match self.inbound.try_send(env) {
            Ok(()) => {}
            Err(TrySendError::Full(env)) => {
                let tx = self.inbound.clone();
                tokio::spawn(async move {
                    if tx.send(env).await.is_err() {
                        tracing::warn!("inbound queue closed, re-injected envelope lost");
                    }
                });
            }
            Err(TrySendError::Closed(env)) => {
                tracing::warn!(mid = %env.message_id, "inbound queue closed, re-injected envelope lost");
                self.metrics.dropped.inc(&[("reason", "requeue_closed")]);
            }
        }
    }

    /// One failed delivery attempt: re-queue, unless the attempt budget is
    /// spent, in which case TRANSIENT envelopes are parked and others dropped.
    async fn retry(&self, mut env: Envelope) {
        env.attempts = env.attempts.saturating_add(1);
        if self.max_attempts > 0 && env.attempts >= self.max_attempts {
            self.metrics.deliveries.inc(&[("result", "exhausted")]);
            if env.classification.contains(Classification::TRANSIENT) {
                self.park(env).await;
            } else {
                tracing::warn!(mid = %env.message_id, rid = %env.recipient_id, attempts = env.attempts, "delivery attempts exhausted, envelope dropped");
            }
            return;
        }

        self.metrics.deliveries.inc(&[("result", "retried")]);
        tracing::debug!(mid = %env.message_id, rid = %env.recipient_id, attempts = env.attempts, "delivery re-queued");
        self.reinject(env);
    }

    /// Hand off to the transient queue, marked QUEUED.
    async fn park(&self, mut env: Envelope) {
        env.classification = env.classification.with(Classification::QUEUED);
        env.attempts = 0;
        let mid = env.message_id.clone();
        if self.transient.send(env).await.is_err() {
            tracing::warn!(mid = %mid, "transient channel closed, envelope lost");
            return;
        }
        self.metrics.transient.inc(&[("stage", "queued")]);
        tracing::debug!(mid = %mid, "envelope handed to transient queue");
    }
}
