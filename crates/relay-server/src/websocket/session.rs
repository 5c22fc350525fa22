//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::{ConnectionMetadata, TransportId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::outbox::Outbox;
use crate::router::{EventRouter, Flow};

/// How long the writer gets to flush and send Close once the reader stops.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends `welcome`
/// 2. Dispatches incoming text (or UTF-8 binary) frames through the router
/// 3. Drains the outbox onto the socket and sends periodic Pings
/// 4. Runs the disconnect handler whatever ended the session
#[instrument(skip_all, fields(connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    router: EventRouter,
    metadata: ConnectionMetadata,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (outbox, send_rx) = Outbox::channel(config.outbound_queue_capacity);
    let outbox = Arc::new(outbox);

    let id = match router.connect(TransportId::new(), metadata, Arc::clone(&outbox)) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to register connection");
            return;
        }
    };
    let _ = tracing::Span::current().record("connection_id", tracing::field::display(&id));

    let started = std::time::Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let closing = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::clone(&outbox),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        closing.clone(),
    ));
    let eviction = outbox.eviction();
    let mut writer_done = false;

    let reason: String = loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = eviction.cancelled() => break "slow consumer".into(),
            () = shutdown.cancelled() => break "server shutdown".into(),
            ended = &mut writer => {
                writer_done = true;
                break ended.unwrap_or("writer task failed").into();
            }
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break format!("transport error: {e}"),
            None => break "transport closed".into(),
        };
        outbox.mark_alive();

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => break "client closed".into(),
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if router.handle_frame(&id, &text) == Flow::Close {
            break "client disconnect".into();
        }
    };

    if !writer_done {
        closing.cancel();
        if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    }

    let _ = router.disconnect(&id, &reason);
    info!(reason = %reason, "websocket session ended");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Forward queued frames and send Pings. Returns why it stopped.
async fn write_loop<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    outbox: Arc<Outbox>,
    ping_every: Duration,
    pong_timeout: Duration,
    closing: CancellationToken,
) -> &'static str
where
    S: futures::Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = send_rx.recv() => {
                let Some(frame) = frame else { return "outbox closed" };
                if ws_tx.send(Message::Text(frame.as_str().to_owned().into())).await.is_err() {
                    return "send failed";
                }
            }
            _ = ping.tick() => {
                if !outbox.check_alive() && outbox.last_pong_elapsed() > pong_timeout {
                    warn!(timeout = ?pong_timeout, "client unresponsive, disconnecting");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return "heartbeat timeout";
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return "send failed";
                }
            }
            () = closing.cancelled() => {
                // Flush what is already queued, then close.
                while let Ok(frame) = send_rx.try_recv() {
                    if ws_tx.send(Message::Text(frame.as_str().to_owned().into())).await.is_err() {
                        return "send failed";
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                return "closed";
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    fn sink() -> (
        impl futures::Sink<Message> + Unpin,
        fmpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = fmpsc::unbounded::<Message>();
        (tx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_frames_in_order() {
        let (ws_tx, out) = sink();
        let (outbox, rx) = Outbox::channel(8);
        let outbox = Arc::new(outbox);
        let closing = CancellationToken::new();
        let task = tokio::spawn(write_loop(
            ws_tx,
            rx,
            Arc::clone(&outbox),
            Duration::from_secs(30),
            Duration::from_secs(90),
            closing.clone(),
        ));

        assert!(outbox.send(Arc::new("one".into())));
        assert!(outbox.send(Arc::new("two".into())));
        closing.cancel();
        assert_eq!(task.await.unwrap(), "closed");

        let texts: Vec<String> = out
            .filter_map(|msg| async move {
                match msg {
                    Message::Text(t) => Some(t.as_str().to_owned()),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pings_then_times_out_silent_client() {
        let (ws_tx, out) = sink();
        let (outbox, rx) = Outbox::channel(8);
        let outbox = Arc::new(outbox);
        let task = tokio::spawn(write_loop(
            ws_tx,
            rx,
            Arc::clone(&outbox),
            Duration::from_secs(30),
            Duration::from_secs(90),
            CancellationToken::new(),
        ));

        let reason = task.await.unwrap();
        assert_eq!(reason, "heartbeat timeout");

        let frames: Vec<Message> = out.collect().await;
        let pings = frames.iter().filter(|m| matches!(m, Message::Ping(_))).count();
        assert!(pings >= 2, "expected pings before timeout, got {pings}");
        assert!(matches!(frames.last(), Some(Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_client_is_kept() {
        let (ws_tx, _out) = sink();
        let (outbox, rx) = Outbox::channel(8);
        let outbox = Arc::new(outbox);
        let closing = CancellationToken::new();
        let task = tokio::spawn(write_loop(
            ws_tx,
            rx,
            Arc::clone(&outbox),
            Duration::from_secs(30),
            Duration::from_secs(90),
            closing.clone(),
        ));

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(25)).await;
            outbox.mark_alive();
        }
        assert!(!task.is_finished());
        closing.cancel();
        assert_eq!(task.await.unwrap(), "closed");
    }
}
