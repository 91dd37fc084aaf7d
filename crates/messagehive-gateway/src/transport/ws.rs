//! WebSocket session handler.
//!
//! Lifecycle of one connection:
//! - resolve identity via the configured auth adapter (`?uid=` or `?ticket=`)
//! - create the delivery channel, register it, announce ONLINE
//! - pump: socket text frames -> inbound queue, delivery channel -> socket
//! - ping interval + idle timeout
//! - on exit: deregister (only if still ours), announce OFFLINE

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::Instrument;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use messagehive_core::error::{HiveError, Result};
use messagehive_core::protocol::{Classification, Envelope};

use crate::app_state::AppState;
use crate::transport::codec::{decode_frame, encode_frame, lifecycle_envelope, sys_authed_json, sys_error_json};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub ticket: Option<String>,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = run_session(app, q, socket).await {
            tracing::debug!(error = %e, "session ended with error");
        }
    })
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket) -> Result<()> {
    let (mut ws_tx, ws_rx) = socket.split();

    let credential = q.ticket.as_deref().or(q.uid.as_deref()).unwrap_or_default();
    let uid = match app.auth().resolve(credential) {
        Ok(uid) => uid,
        Err(e) => {
            let _ = ws_tx
                .send(Message::Text(sys_error_json(e.client_code().as_str(), "auth failed")))
                .await;
            return Err(e);
        }
    };

    let span = tracing::info_span!("session", uid = %uid);
    serve_session(app, uid, ws_tx, ws_rx).instrument(span).await
}

async fn serve_session(
    app: AppState,
    uid: String,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
) -> Result<()> {
    let gw = &app.cfg().gateway;
    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(gw.outbound_queue);
    let directory = app.directory();
    let inbound = app.inbound();

    directory.register(&uid, out_tx.clone());
    app.metrics().sessions_online.inc(&[]);
    tracing::info!("session registered");

    inbound
        .send(lifecycle_envelope(&uid, Classification::ONLINE))
        .await
        .map_err(|_| HiveError::Internal("inbound queue closed".into()))?;

    if ws_tx.send(Message::Text(sys_authed_json(&uid))).await.is_err() {
        close_session(&app, &uid, &out_tx).await;
        return Ok(());
    }

    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                let Some(env) = maybe_out else { break; };
                match encode_frame(&env) {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(mid = %env.message_id, error = %e, "outbound encode failed"),
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                last_activity = Instant::now();

                match msg {
                    Message::Text(s) => match decode_frame(&s, &uid) {
                        Ok(env) => {
                            if inbound.send(env).await.is_err() {
                                tracing::warn!("inbound queue closed");
                                break;
                            }
                        }
                        Err(e) => {
                            app.metrics().decode_errors.inc(&[("kind", "frame")]);
                            let _ = ws_tx.send(Message::Text(sys_error_json(e.client_code().as_str(), &e.to_string()))).await;
                        }
                    },
                    Message::Binary(_) => {
                        let _ = ws_tx.send(Message::Text(sys_error_json("BAD_REQUEST", "binary frames not supported"))).await;
                    }
                    Message::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }

            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    let _ = ws_tx.send(Message::Text(sys_error_json("TIMEOUT", "idle timeout"))).await;
                    break;
                }
            }
        }
    }

    close_session(&app, &uid, &out_tx).await;
    Ok(())
}

/// Deregister and announce OFFLINE, unless a newer session already took over
/// this identity.
async fn close_session(app: &AppState, uid: &str, out_tx: &mpsc::Sender<Envelope>) {
    app.metrics().sessions_online.dec(&[]);
    if !app.directory().deregister_session(uid, out_tx) {
        tracing::debug!("identity re-registered elsewhere, offline not announced");
        return;
    }
    tracing::info!("session closed");
    if app
        .inbound()
        .send(lifecycle_envelope(uid, Classification::OFFLINE))
        .await
        .is_err()
    {
        tracing::warn!("inbound queue closed, offline not announced");
    }
}
