//! One websocket connection: a read pump and a write pump around a hub queue.
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use warp::ws::{Message, WebSocket};

use crate::config::WsConfig;
use crate::hub::{ConnectionId, Frame, Hub};
use crate::protocol::Envelope;

/// Runs the connection until either side stops, then unregisters it.
pub async fn serve(
    socket: WebSocket,
    hub: Hub,
    table_id: String,
    player_id: String,
    cfg: WsConfig,
) {
    let (id, queue) = hub.register(table_id.as_str(), player_id.as_str());
    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, queue, cfg, id));

    let reader_finished = tokio::select! {
        _ = read_pump(stream, cfg, id) => true,
        _ = &mut writer => false,
    };

    hub.unregister(id);
    if reader_finished {
        // Unregistering closes the queue; the writer sends Close and exits.
        if timeout(cfg.write_wait, &mut writer).await.is_err() {
            writer.abort();
        }
    }
    tracing::info!(
        connection_id = id,
        table_id = %table_id,
        player_id = %player_id,
        "websocket session ended"
    );
}

async fn read_pump(mut stream: SplitStream<WebSocket>, cfg: WsConfig, id: ConnectionId) {
    loop {
        // Any frame, pongs included, resets the idle deadline.
        let next = match timeout(cfg.pong_wait, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(connection_id = id, "peer idle past pong wait");
                return;
            }
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::debug!(connection_id = id, error = %err, "websocket read failed");
                return;
            }
            None => return,
        };

        if message.is_close() {
            return;
        }
        if let Ok(text) = message.to_str() {
            handle_inbound(id, text);
        }
    }
}

/// Client commands are decoded and logged only; REST stays the command path.
fn handle_inbound(id: ConnectionId, text: &str) {
    match Envelope::parse(text) {
        Ok(envelope) => tracing::debug!(
            connection_id = id,
            kind = ?envelope.kind,
            game_id = envelope.game_id.as_deref().unwrap_or(""),
            "client message received"
        ),
        Err(err) => tracing::warn!(
            connection_id = id,
            error = %err,
            "discarding malformed client message"
        ),
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Frame>,
    cfg: WsConfig,
    id: ConnectionId,
) {
    let mut ping = interval_at(Instant::now() + cfg.ping_period, cfg.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    let _ = timeout(cfg.write_wait, sink.send(Message::close())).await;
                    return;
                };
                let mut text = String::from(&*frame);
                while let Ok(more) = queue.try_recv() {
                    text.push('\n');
                    text.push_str(&more);
                }
                if !send_bounded(&mut sink, Message::text(text), cfg, id).await {
                    return;
                }
            }
            _ = ping.tick() => {
                if !send_bounded(&mut sink, Message::ping(Vec::new()), cfg, id).await {
                    return;
                }
            }
        }
    }
}

async fn send_bounded(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    cfg: WsConfig,
    id: ConnectionId,
) -> bool {
    match timeout(cfg.write_wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(connection_id = id, error = %err, "websocket write failed");
            false
        }
        Err(_) => {
            tracing::debug!(connection_id = id, "websocket write timed out");
            false
        }
    }
}
