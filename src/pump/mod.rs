use crate::connection::{close_requested, ConnectionManager, Dialer, WsStream};
use crate::dispatch::Registry;
use crate::outbound::{OutboundReceiver, SendHook};
use crate::protocol::{BackendMode, Envelope};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

pub async fn announce(sink: &mut WsSink, mode: BackendMode) -> Result<(), tungstenite::Error> {
    write_envelope(sink, &Envelope::bootstrap(mode)).await
}

async fn write_envelope(sink: &mut WsSink, envelope: &Envelope) -> Result<(), tungstenite::Error> {
    let frame = envelope
        .to_frame()
        .map_err(|err| tungstenite::Error::Io(std::io::Error::other(err)))?;
    sink.send(Message::text(frame)).await
}

fn frame_text(message: &Message) -> Option<&str> {
    match message {
        Message::Text(text) => Some(text.as_str()),
        Message::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

pub enum Link {
    Up { generation: u64, sink: WsSink },
    Down,
}

#[allow(clippy::too_many_arguments)]
pub async fn receive_loop<D: Dialer>(
    mut source: WsSource,
    mut conn: ConnectionManager<D>,
    registry: Arc<Registry>,
    links: mpsc::Sender<Link>,
    mut write_failures: mpsc::UnboundedReceiver<u64>,
    mode: BackendMode,
    shutdown: watch::Receiver<bool>,
    done: oneshot::Sender<()>,
) {
    let mut generation: u64 = 0;
    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(message)) if !message.is_close() => {
                    if let Some(text) = frame_text(&message) {
                        handle_frame(&registry, text);
                    }
                    continue;
                }
                Some(Ok(_)) => tracing::info!("backend closed the connection"),
                Some(Err(err)) => tracing::warn!(error = %err, "websocket read failed"),
                None => tracing::info!("websocket stream ended"),
            },
            Some(failed) = write_failures.recv() => {
                if failed != generation {
                    continue;
                }
                tracing::warn!(generation, "write side failed, dropping connection");
            }
        }

        if *shutdown.borrow() {
            break;
        }
        if links.send(Link::Down).await.is_err() {
            break;
        }
        conn.mark_disconnected();
        let Some(stream) = conn.reconnect().await else {
            break;
        };
        generation += 1;
        let (mut sink, next_source) = stream.split();
        if let Err(err) = announce(&mut sink, mode).await {
            tracing::warn!(error = %err, "handshake after reconnect failed");
        }
        source = next_source;
        if links.send(Link::Up { generation, sink }).await.is_err() {
            break;
        }
    }
    let _ = done.send(());
}

fn handle_frame(registry: &Registry, text: &str) {
    let envelope = match Envelope::from_frame(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(error = %err, "dropping inbound frame");
            return;
        }
    };
    match registry.dispatch(&envelope) {
        Ok(Some(applied)) => {
            tracing::debug!(message_type = %envelope.message_type, ?applied, "inbound applied");
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(message_type = %envelope.message_type, error = %err, "inbound payload rejected");
        }
    }
}

fn prepare(hook: &dyn SendHook, mut envelope: Envelope) -> Option<Envelope> {
    hook.before_send(&mut envelope);
    if envelope.is_skip() {
        return None;
    }
    if envelope.message_type.is_empty() {
        tracing::warn!("dropping outbound envelope with empty type");
        return None;
    }
    Some(envelope)
}

async fn flush(
    link: &mut Link,
    pending: &mut VecDeque<Envelope>,
    write_failures: &mpsc::UnboundedSender<u64>,
) {
    let Link::Up { generation, sink } = link else {
        return;
    };
    let generation = *generation;
    while let Some(envelope) = pending.pop_front() {
        if let Err(err) = write_envelope(sink, &envelope).await {
            tracing::warn!(message_type = %envelope.message_type, error = %err, "websocket write failed");
            let _ = write_failures.send(generation);
            *link = Link::Down;
            return;
        }
    }
}

// The hook runs on dequeue whether or not a write half is attached.
#[allow(clippy::too_many_arguments)]
pub async fn send_loop(
    mut link: Link,
    mut outbound: OutboundReceiver,
    mut links: mpsc::Receiver<Link>,
    write_failures: mpsc::UnboundedSender<u64>,
    hook: Arc<dyn SendHook>,
    mut shutdown: watch::Receiver<bool>,
    done: oneshot::Receiver<()>,
    close_timeout: Duration,
) {
    let mut pending = VecDeque::new();
    loop {
        tokio::select! {
            biased;
            _ = close_requested(&mut shutdown) => break,
            Some(next) = links.recv() => {
                link = next;
            }
            Some(envelope) = outbound.recv() => {
                if let Some(envelope) = prepare(hook.as_ref(), envelope) {
                    pending.push_back(envelope);
                }
            }
        }
        flush(&mut link, &mut pending, &write_failures).await;
    }

    while let Some(envelope) = outbound.try_recv() {
        if let Some(envelope) = prepare(hook.as_ref(), envelope) {
            pending.push_back(envelope);
        }
    }
    flush(&mut link, &mut pending, &write_failures).await;
    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), "closing with unsent messages");
    }

    if let Link::Up { mut sink, .. } = link {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: Default::default(),
        }));
        if let Err(err) = sink.send(close).await {
            tracing::debug!(error = %err, "close frame not sent");
        }
    }
    if tokio::time::timeout(close_timeout, done).await.is_err() {
        tracing::debug!("receive loop did not acknowledge close in time");
    }
}
