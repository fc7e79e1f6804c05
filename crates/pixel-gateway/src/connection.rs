use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pixel_types::events::{ChangeEvent, EventFilter, FeedCommand, FeedEvent};
use pixel_types::models::PIXELS_TABLE;

use crate::dispatcher::ChangeFeed;

/// Timings for one changefeed session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// A session that has not subscribed within this window is closed.
    pub subscribe_timeout: Duration,
    /// The server pings this often; two missed pongs drop the session.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Handle one changefeed session. The access key was checked at the HTTP
/// upgrade layer; the session still has to send `Subscribe` before any
/// changes flow.
pub async fn handle_connection(socket: WebSocket, feed: ChangeFeed, config: SessionConfig) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Subscribe
    let filter = match wait_for_subscribe(&mut sender, &mut receiver, config.subscribe_timeout).await {
        Some(filter) => filter,
        None => {
            warn!("Changefeed session {} never subscribed, closing", conn_id);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Step 2: Join the feed before acknowledging, so nothing published after
    // the ack is missed
    let changes = feed.subscribe();

    // Step 3: Acknowledge
    let ack = FeedEvent::Subscribed {
        table: PIXELS_TABLE.to_string(),
        event: filter,
    };
    if !send_event(&mut sender, &ack).await {
        return;
    }

    let sessions = feed.session_opened();
    info!("Changefeed session {} subscribed ({:?}), {} active", conn_id, filter, sessions);

    run_session_loop(sender, receiver, changes, conn_id, filter, config.heartbeat_interval).await;

    let sessions = feed.session_closed();
    info!("Changefeed session {} closed, {} active", conn_id, sessions);
}

async fn run_session_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut changes: broadcast::Receiver<ChangeEvent>,
    conn_id: Uuid,
    filter: EventFilter,
    heartbeat_interval: Duration,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward row changes -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = changes.recv() => {
                    let change = match result {
                        Ok(change) => change,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Changefeed session {} lagged by {} changes", conn_id, n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !filter.matches(change.event_type) {
                        continue;
                    }

                    if !send_event(&mut sender, &FeedEvent::Change(change)).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on session {} (missed {} pongs), dropping", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<FeedCommand>(&text) {
                    Ok(FeedCommand::Unsubscribe) => {
                        debug!("Changefeed session {} unsubscribed", conn_id);
                        break;
                    }
                    Ok(FeedCommand::Subscribe { .. }) => {
                        debug!("Changefeed session {} sent a second Subscribe, ignoring", conn_id);
                    }
                    Err(e) => {
                        warn!(
                            "Changefeed session {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Wait for a valid Subscribe command. Subscriptions to unknown tables get an
/// Error frame and the session keeps waiting until the timeout.
async fn wait_for_subscribe(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    subscribe_timeout: Duration,
) -> Option<EventFilter> {
    let timeout = tokio::time::timeout(subscribe_timeout, async {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };

            match serde_json::from_str::<FeedCommand>(&text) {
                Ok(FeedCommand::Subscribe { table, event }) if table == PIXELS_TABLE => {
                    return Some(event);
                }
                Ok(FeedCommand::Subscribe { table, .. }) => {
                    let error = FeedEvent::Error {
                        message: format!("unknown table '{}'", table),
                    };
                    if !send_event(sender, &error).await {
                        return None;
                    }
                }
                Ok(FeedCommand::Unsubscribe) => return None,
                Err(e) => {
                    let error = FeedEvent::Error {
                        message: format!("bad command: {}", e),
                    };
                    if !send_event(sender, &error).await {
                        return None;
                    }
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Serialize and send one event. Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &FeedEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode changefeed event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
