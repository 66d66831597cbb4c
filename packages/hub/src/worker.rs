//! Per-session drain and read loops.
//!
//! Each session gets two tasks. The drain loop owns the writing half of the
//! connection: it writes queued envelopes and heartbeat pings, and closes
//! the connection once the session leaves the active set. The read loop
//! owns the reading half: it enforces the liveness deadline and dispatches
//! client commands. Either loop tears the session down when its half fails.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use fanout_core::{message_types, Envelope, InboundEnvelope, Topic};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HubConfig;
use crate::connection::{Connection, Frame, FrameReader, FrameWriter};
use crate::error::ConnectionError;
use crate::hub::WeakHub;
use crate::session::Session;

/// Heartbeat and write timings for one session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Keepalive {
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl From<&HubConfig> for Keepalive {
    fn from(config: &HubConfig) -> Self {
        Self {
            ping_period: config.ping_period,
            pong_wait: config.pong_wait,
            write_wait: config.write_wait,
        }
    }
}

/// Split the connection and start both loops.
pub(crate) fn spawn<C: Connection>(
    hub: WeakHub,
    session: Arc<Session>,
    outbound: mpsc::Receiver<Bytes>,
    connection: C,
    keepalive: Keepalive,
) {
    let (writer, reader) = connection.split();
    tokio::spawn(drain_loop(
        hub.clone(),
        session.clone(),
        outbound,
        writer,
        keepalive,
    ));
    tokio::spawn(read_loop(hub, session, reader, keepalive));
}

async fn write<W: FrameWriter>(
    writer: &mut W,
    frame: Frame,
    wait: Duration,
) -> Result<(), ConnectionError> {
    time::timeout(wait, writer.send(frame))
        .await
        .map_err(|_| ConnectionError::Timeout)?
}

async fn drain_loop<W: FrameWriter>(
    hub: WeakHub,
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<Bytes>,
    mut writer: W,
    keepalive: Keepalive,
) {
    let id = session.id();
    let mut state = session.watch_state();
    let mut ticker = time::interval_at(Instant::now() + keepalive.ping_period, keepalive.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Anything still queued once the session is terminating is discarded.
    while !session.state().is_terminating() {
        let frame = tokio::select! {
            biased;

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            message = outbound.recv() => match message {
                Some(message) => Frame::Message(message),
                None => break,
            },
            _ = ticker.tick() => Frame::Ping,
        };

        if let Err(e) = write(&mut writer, frame, keepalive.write_wait).await {
            tracing::debug!("Session {}: Write failed: {}", id, e);
            teardown(&hub, &session).await;
            break;
        }
    }

    if let Err(e) = write(&mut writer, Frame::Close, keepalive.write_wait).await {
        tracing::debug!("Session {}: Close frame not sent: {}", id, e);
    }
    if let Ok(Err(e)) = time::timeout(keepalive.write_wait, writer.close()).await {
        tracing::debug!("Session {}: Failed to close connection: {}", id, e);
    }
    session.mark_closed();
    tracing::debug!("Session {}: Connection closed", id);
}

async fn read_loop<R: FrameReader>(
    hub: WeakHub,
    session: Arc<Session>,
    mut reader: R,
    keepalive: Keepalive,
) {
    let id = session.id();
    let mut state = session.watch_state();
    let mut deadline = Instant::now() + keepalive.pong_wait;

    loop {
        // Removed elsewhere; the drain loop closes the connection.
        if session.state().is_terminating() {
            return;
        }

        let received = tokio::select! {
            biased;

            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
            received = time::timeout_at(deadline, reader.recv()) => received,
        };

        let frame = match received {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::debug!("Session {}: Read failed: {}", id, e);
                break;
            }
            Ok(None) => {
                tracing::debug!("Session {}: Peer went away", id);
                break;
            }
            Err(_) => {
                tracing::info!("Session {}: No pong within {:?}, dropping session", id, keepalive.pong_wait);
                break;
            }
        };

        session.touch();
        match frame {
            Frame::Pong => deadline = Instant::now() + keepalive.pong_wait,
            Frame::Message(bytes) => handle_inbound(&hub, &session, &bytes),
            // Transports answer protocol pings themselves.
            Frame::Ping => {}
            Frame::Close => {
                tracing::debug!("Session {}: Peer closed the connection", id);
                break;
            }
        }
    }

    teardown(&hub, &session).await;
}

/// Remove a session whose connection failed.
///
/// Goes through the scheduler when possible and falls back to direct
/// removal if the scheduler is busy or gone.
async fn teardown(hub: &WeakHub, session: &Session) {
    let id = session.id();
    // Draining first, so a registration still in flight is refused.
    session.begin_draining();
    if let Some(hub) = hub.upgrade()
        && let Err(e) = hub.unregister(id).await
    {
        tracing::warn!("Session {}: Unregister failed ({}), removing directly", id, e);
        hub.force_unregister(id);
    }
}

fn handle_inbound(hub: &WeakHub, session: &Session, bytes: &[u8]) {
    let id = session.id();
    let Some(hub) = hub.upgrade() else {
        return;
    };

    let inbound = match InboundEnvelope::decode(bytes) {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::debug!("Session {}: Ignoring malformed message: {}", id, e);
            return;
        }
    };

    let reply = match inbound.kind.as_str() {
        kind @ (message_types::SUBSCRIBE | message_types::UNSUBSCRIBE) => {
            let Some(topic) = inbound.data_str().and_then(|name| name.parse::<Topic>().ok()) else {
                tracing::debug!("Session {}: Ignoring {} for unknown topic {}", id, kind, inbound.data);
                return;
            };
            if kind == message_types::SUBSCRIBE {
                if let Err(e) = hub.subscribe(id, topic) {
                    tracing::debug!("Session {}: subscribe to {} failed: {}", id, topic, e);
                }
            } else {
                hub.unsubscribe(id, topic);
            }
            return;
        }
        message_types::PING => {
            Envelope::new(message_types::PONG, json!({ "timestamp": Utc::now() }))
        }
        message_types::GET_STATS => Envelope::new(message_types::HUB_STATS, json!(hub.stats())),
        other => {
            tracing::debug!("Session {}: Ignoring unknown message type {}", id, other);
            return;
        }
    };

    if let Err(e) = hub.send_to_session(id, &reply) {
        tracing::debug!("Session {}: Reply to {} not sent: {}", id, inbound.kind, e);
    }
}
