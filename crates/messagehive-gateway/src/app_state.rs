//! Shared application state for the MessageHive gateway.
//!
//! `AppState::new` builds the single presence directory of the process, the
//! three bounded channels (inbound, event, transient) and the loops that
//! consume them. The loops are returned separately as `Workers` so the caller
//! decides when to start them (tests drive the dispatcher by hand).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use messagehive_core::protocol::Envelope;

use crate::auth::{self, AuthAdapter};
use crate::config::GatewayConfig;
use crate::directory::PresenceDirectory;
use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::obs::HubMetrics;
use crate::store::GroupStore;
use crate::workers::{EventWorker, TransientStore, TransientWorker};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    directory: Arc<PresenceDirectory>,
    inbound: mpsc::Sender<Envelope>,
    auth: Arc<dyn AuthAdapter>,
    metrics: Arc<HubMetrics>,
}

/// The hub's long-running loops, not yet started.
pub struct Workers {
    pub dispatcher: Dispatcher,
    pub inbound_rx: mpsc::Receiver<Envelope>,
    pub events: EventWorker,
    pub transient: TransientWorker,
}

impl Workers {
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let Workers { dispatcher, inbound_rx, events, transient } = self;
        vec![
            tokio::spawn(async move { dispatcher.run(inbound_rx).await }),
            tokio::spawn(events.run()),
            tokio::spawn(transient.run()),
        ]
    }
}

impl AppState {
    pub fn new(
        cfg: GatewayConfig,
        group_store: Arc<dyn GroupStore>,
        transient_store: Arc<dyn TransientStore>,
    ) -> (Self, Workers) {
        let d = &cfg.dispatch;
        let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(d.inbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(d.event_capacity);
        let (transient_tx, transient_rx) = mpsc::channel::<Envelope>(d.transient_capacity);

        let metrics = Arc::new(HubMetrics::default());
        let directory = Arc::new(PresenceDirectory::new(group_store));

        let dispatcher = Dispatcher::new(
            Arc::clone(&directory),
            inbound_tx.clone(),
            event_tx,
            transient_tx,
            Arc::clone(&metrics),
            DispatchConfig::from(d),
        );
        let events = EventWorker::new(
            event_rx,
            Arc::clone(&transient_store),
            inbound_tx.clone(),
            Arc::clone(&metrics),
        );
        let transient = TransientWorker::new(transient_rx, transient_store, Arc::clone(&metrics));

        let auth = auth::build_adapter(&cfg.auth);

        let state = Self {
            inner: Arc::new(AppStateInner {
                cfg,
                directory,
                inbound: inbound_tx,
                auth,
                metrics,
            }),
        };
        let workers = Workers { dispatcher, inbound_rx, events, transient };
        (state, workers)
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn directory(&self) -> Arc<PresenceDirectory> {
        Arc::clone(&self.inner.directory)
    }

    /// Producer side of the inbound queue (transport -> dispatcher).
    pub fn inbound(&self) -> mpsc::Sender<Envelope> {
        self.inner.inbound.clone()
    }

    pub fn auth(&self) -> &dyn AuthAdapter {
        self.inner.auth.as_ref()
    }

    pub fn metrics(&self) -> &HubMetrics {
        &self.inner.metrics
    }

    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("messagehive_directory_entities", self.inner.directory.len() as u64)]
    }
}
