#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;

use messagehive_core::protocol::{Classification, Envelope};
use messagehive_gateway::directory::PresenceDirectory;
use messagehive_gateway::dispatch::{DispatchConfig, Dispatcher};
use messagehive_gateway::obs::HubMetrics;
use messagehive_gateway::store::MemoryGroupStore;
use messagehive_gateway::workers::{PresenceEvent, PresenceEventKind};

const QUIET: Duration = Duration::from_millis(150);

struct Harness {
    dispatcher: Dispatcher,
    directory: Arc<PresenceDirectory>,
    store: Arc<MemoryGroupStore>,
    metrics: Arc<HubMetrics>,
    /// Everything the dispatcher re-injects (fan-out copies, retries).
    reinjected: mpsc::Receiver<Envelope>,
    events: mpsc::Receiver<PresenceEvent>,
    transient: mpsc::Receiver<Envelope>,
}

fn harness(cfg: DispatchConfig) -> Harness {
    let store = Arc::new(MemoryGroupStore::new());
    let directory = Arc::new(PresenceDirectory::new(store.clone()));
    let metrics = Arc::new(HubMetrics::default());
    let (inbound_tx, reinjected) = mpsc::channel(64);
    let (event_tx, events) = mpsc::channel(16);
    let (transient_tx, transient) = mpsc::channel(16);
    let dispatcher = Dispatcher::new(
        Arc::clone(&directory),
        inbound_tx,
        event_tx,
        transient_tx,
        Arc::clone(&metrics),
        cfg,
    );
    Harness { dispatcher, directory, store, metrics, reinjected, events, transient }
}

fn fast() -> DispatchConfig {
    DispatchConfig {
        delivery_timeout: Duration::from_millis(50),
        max_delivery_attempts: 0,
    }
}

fn user(h: &Harness, id: &str, cap: usize) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(cap);
    h.directory.register(id, tx.clone());
    (tx, rx)
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn class(bits: &[u32]) -> Classification {
    Classification::of(bits)
}

async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> T {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::Receiver<T>) {
    if let Ok(Some(v)) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected message: {v:?}");
    }
}

#[tokio::test]
async fn unknown_sender_is_dropped() {
    let mut h = harness(fast());
    let (_btx, mut b) = user(&h, "bob", 4);

    h.dispatcher
        .handle(Envelope::new("m1", "ghost", "bob", Classification::empty(), "hi"))
        .await;

    assert_silent(&mut b).await;
    assert_silent(&mut h.reinjected).await;
    assert_eq!(h.metrics.dropped.get(&[("reason", "unknown_sender")]), 1);
}

#[tokio::test]
async fn direct_delivery_and_ack() {
    let h = harness(fast());
    let (_atx, mut a) = user(&h, "alice", 4);
    let (_btx, mut b) = user(&h, "bob", 4);

    h.dispatcher
        .handle(Envelope::new("m1", "alice", "bob", Classification::empty(), "hi"))
        .await;

    let got = recv(&mut b).await;
    assert_eq!(got.message_id, "m1");
    assert_eq!(got.body, "hi");

    let ack = recv(&mut a).await;
    assert_eq!(ack.message_id, "m1");
    assert_eq!(ack.sender_id, "");
    assert_eq!(ack.recipient_id, "alice");
    assert_eq!(ack.classification, Classification::empty());
    assert!(ack.body.is_empty());
}

#[tokio::test]
async fn group_fanout_reinjects_one_copy_per_other_member() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    h.directory.register_group("G", strings(&["A", "B", "C"]), false).await.unwrap();

    let original = Envelope::new("m1", "A", "G", class(&[Classification::TRANSIENT]), "payload");
    h.dispatcher.handle(original.clone()).await;

    let first = recv(&mut h.reinjected).await;
    let second = recv(&mut h.reinjected).await;
    assert_silent(&mut h.reinjected).await;

    let mut rids = vec![first.recipient_id.clone(), second.recipient_id.clone()];
    rids.sort();
    assert_eq!(rids, vec!["B", "C"]);
    for copy in [&first, &second] {
        assert_eq!(copy.message_id, original.message_id);
        assert_eq!(copy.classification, original.classification);
        assert_eq!(copy.body, original.body);
        assert_eq!(copy.sender_id, "A");
    }

    // the sender is still acknowledged
    assert_eq!(recv(&mut a).await.message_id, "m1");
    assert_eq!(h.metrics.fanout_copies.get(&[]), 2);
}

#[tokio::test]
async fn group_send_action_is_a_passthrough() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    h.directory.register_group("G", strings(&["A", "B"]), false).await.unwrap();

    let body = r#"{"action":"send","data":"hello"}"#;
    h.dispatcher
        .handle(Envelope::new("m1", "A", "G", class(&[Classification::GROUP]), body))
        .await;

    let copy = recv(&mut h.reinjected).await;
    assert_eq!(copy.recipient_id, "B");
    assert_eq!(copy.body, body);
    assert!(recv(&mut a).await.body.is_empty());
}

#[tokio::test]
async fn join_creates_and_persists_group() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);

    let body = r#"{"action":"join","data":["A","B"]}"#;
    h.dispatcher
        .handle(Envelope::new("j1", "A", "G", class(&[Classification::GROUP]), body))
        .await;

    let g = h.directory.lookup("G").unwrap();
    assert_eq!(g.members().unwrap(), strings(&["A", "B"]).as_slice());
    assert_eq!(h.store.members_of("G").unwrap(), strings(&["A", "B"]));

    let ack = recv(&mut a).await;
    assert_eq!(ack.message_id, "j1");
    assert_eq!(ack.body, r#"{"action":"join","data":"succeed"}"#);
    assert_silent(&mut h.reinjected).await;
}

#[tokio::test]
async fn join_on_existing_group_keeps_members() {
    let h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    h.directory.register_group("G", strings(&["X"]), false).await.unwrap();

    let body = r#"{"action":"join","data":["A"]}"#;
    h.dispatcher
        .handle(Envelope::new("j1", "A", "G", class(&[Classification::GROUP]), body))
        .await;

    assert_eq!(h.directory.lookup("G").unwrap().members().unwrap(), strings(&["X"]).as_slice());
    assert_eq!(recv(&mut a).await.body, r#"{"action":"join","data":"succeed"}"#);
}

#[tokio::test]
async fn invite_and_leave_update_membership() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    h.directory.register_group("G", strings(&["A"]), true).await.unwrap();

    let invite = r#"{"action":"invite","data":["B","C"]}"#;
    h.dispatcher
        .handle(Envelope::new("i1", "A", "G", class(&[Classification::GROUP]), invite))
        .await;
    assert_eq!(recv(&mut a).await.body, r#"{"action":"invite","data":"succeed"}"#);
    assert_eq!(h.store.members_of("G").unwrap(), strings(&["A", "B", "C"]));

    let leave = r#"{"action":"leave","data":["b","C"]}"#;
    h.dispatcher
        .handle(Envelope::new("l1", "A", "G", class(&[Classification::GROUP]), leave))
        .await;
    assert_eq!(recv(&mut a).await.body, r#"{"action":"leave","data":"succeed"}"#);
    assert_eq!(h.directory.lookup("G").unwrap().members().unwrap(), strings(&["A", "C"]).as_slice());
    assert_eq!(h.store.members_of("G").unwrap(), strings(&["A", "C"]));

    assert_silent(&mut h.reinjected).await;
}

#[tokio::test]
async fn undecodable_group_body_does_not_abort_other_effects() {
    let h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    let (_btx, mut b) = user(&h, "B", 4);

    h.dispatcher
        .handle(Envelope::new(
            "m1",
            "A",
            "B",
            class(&[Classification::GROUP, Classification::EVENT]),
            "not json",
        ))
        .await;

    // zero-value request: no suppression, so the envelope is still routed
    assert_eq!(recv(&mut b).await.message_id, "m1");
    // EVENT still suppresses the ack
    assert_silent(&mut a).await;
    assert_eq!(h.metrics.decode_errors.get(&[("kind", "group")]), 1);
}

#[tokio::test]
async fn event_suppresses_ack_only() {
    let h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    let (_btx, mut b) = user(&h, "B", 4);

    h.dispatcher
        .handle(Envelope::new("e1", "A", "B", class(&[Classification::EVENT]), "sys"))
        .await;

    assert_eq!(recv(&mut b).await.message_id, "e1");
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn online_emits_event_and_acks_without_routing() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);

    h.dispatcher
        .handle(Envelope::new("", "A", "", class(&[Classification::ONLINE]), ""))
        .await;

    let ev = recv(&mut h.events).await;
    assert_eq!(ev, PresenceEvent { identity: "A".into(), kind: PresenceEventKind::Online });
    assert_eq!(recv(&mut a).await.recipient_id, "A");
    assert_silent(&mut h.reinjected).await;
    assert_silent(&mut h.transient).await;
}

#[tokio::test]
async fn offline_from_departed_sender_emits_event_only() {
    let mut h = harness(fast());

    h.dispatcher
        .handle(Envelope::new("", "A", "", class(&[Classification::OFFLINE]), ""))
        .await;

    let ev = recv(&mut h.events).await;
    assert_eq!(ev.kind, PresenceEventKind::Offline);
    assert_eq!(ev.identity, "A");
    assert_eq!(h.metrics.dropped.get(&[("reason", "unknown_sender")]), 0);
    assert_silent(&mut h.reinjected).await;
}

#[tokio::test]
async fn transient_envelope_for_offline_recipient_is_parked() {
    let mut h = harness(fast());
    let (_atx, _a) = user(&h, "A", 4);

    h.dispatcher
        .handle(Envelope::new("t1", "A", "C", class(&[Classification::TRANSIENT]), "later"))
        .await;

    let parked = recv(&mut h.transient).await;
    assert_eq!(parked.message_id, "t1");
    assert!(parked.classification.contains(Classification::TRANSIENT));
    assert!(parked.classification.contains(Classification::QUEUED));
}

#[tokio::test]
async fn plain_envelope_for_offline_recipient_is_dropped() {
    let mut h = harness(fast());
    let (_atx, _a) = user(&h, "A", 4);

    h.dispatcher
        .handle(Envelope::new("m1", "A", "C", Classification::empty(), "gone"))
        .await;

    assert_silent(&mut h.transient).await;
    assert_silent(&mut h.reinjected).await;
    assert_eq!(h.metrics.dropped.get(&[("reason", "unknown_recipient")]), 1);
}

#[tokio::test]
async fn replayed_envelope_bypasses_sender_check() {
    let h = harness(fast());
    let (_btx, mut b) = user(&h, "B", 4);

    let replay = Envelope::new(
        "t1",
        "A",
        "B",
        class(&[Classification::TRANSIENT, Classification::QUEUED]),
        "late",
    );
    h.dispatcher.handle(replay).await;

    assert_eq!(recv(&mut b).await.message_id, "t1");
}

#[tokio::test]
async fn stalled_recipient_is_requeued_once_per_failed_attempt() {
    let mut h = harness(fast());
    let (_atx, mut a) = user(&h, "A", 4);
    let (btx, _b) = user(&h, "B", 1);
    btx.send(Envelope::default()).await.unwrap(); // B's queue is now full

    h.dispatcher
        .handle(Envelope::new("m1", "A", "B", Classification::empty(), "hi"))
        .await;

    let retried = recv(&mut h.reinjected).await;
    assert_eq!(retried.message_id, "m1");
    assert_eq!(retried.recipient_id, "B");
    assert_eq!(retried.attempts, 1);
    assert_silent(&mut h.reinjected).await;
    assert_eq!(h.metrics.deliveries.get(&[("result", "retried")]), 1);

    // the ack is independent of the stalled delivery
    assert_eq!(recv(&mut a).await.message_id, "m1");
}

#[tokio::test]
async fn stalled_sender_ack_is_dropped_not_retried() {
    let mut h = harness(fast());
    let (atx, mut a) = user(&h, "A", 1);
    let (_btx, mut b) = user(&h, "B", 4);
    atx.send(Envelope::new("filler", "", "A", Classification::empty(), "")).await.unwrap();

    let started = Instant::now();
    h.dispatcher
        .handle(Envelope::new("m1", "A", "B", Classification::empty(), "hi"))
        .await;
    h.dispatcher
        .handle(Envelope::new("m2", "A", "B", Classification::empty(), "again"))
        .await;
    assert!(started.elapsed() < Duration::from_millis(50), "dispatcher blocked on a stalled ack");

    assert_eq!(recv(&mut b).await.message_id, "m1");
    assert_eq!(recv(&mut b).await.message_id, "m2");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.metrics.acks.get(&[("result", "timeout")]), 2);
    assert_silent(&mut h.reinjected).await;

    // only the filler ever made it into A's queue
    assert_eq!(recv(&mut a).await.message_id, "filler");
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn bounded_retry_parks_transient_envelopes_when_exhausted() {
    let mut h = harness(DispatchConfig {
        delivery_timeout: Duration::from_millis(50),
        max_delivery_attempts: 2,
    });
    let (_atx, _a) = user(&h, "A", 4);
    let (btx, _b) = user(&h, "B", 1);
    btx.send(Envelope::default()).await.unwrap();

    let mut env = Envelope::new("m1", "A", "B", class(&[Classification::TRANSIENT]), "hi");
    env.attempts = 1;
    h.dispatcher.handle(env).await;

    let parked = recv(&mut h.transient).await;
    assert_eq!(parked.message_id, "m1");
    assert!(parked.classification.contains(Classification::QUEUED));
    assert_silent(&mut h.reinjected).await;
    assert_eq!(h.metrics.deliveries.get(&[("result", "exhausted")]), 1);
}

#[tokio::test]
async fn bounded_retry_drops_plain_envelopes_when_exhausted() {
    let mut h = harness(DispatchConfig {
        delivery_timeout: Duration::from_millis(50),
        max_delivery_attempts: 1,
    });
    let (_atx, _a) = user(&h, "A", 4);
    let (btx, _b) = user(&h, "B", 1);
    btx.send(Envelope::default()).await.unwrap();

    h.dispatcher
        .handle(Envelope::new("m1", "A", "B", Classification::empty(), "hi"))
        .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_silent(&mut h.transient).await;
    assert_silent(&mut h.reinjected).await;
    assert_eq!(h.metrics.deliveries.get(&[("result", "exhausted")]), 1);
}
