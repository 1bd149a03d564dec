use crate::protocol::{Envelope, SETTING_CHANGE};
use crate::state::AppState;
use serde_json::Map;
use std::collections::HashSet;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

pub fn channel() -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundQueue { tx }, OutboundReceiver { rx })
}

impl OutboundQueue {
    pub fn send(&self, envelope: Envelope) {
        if let Err(err) = self.tx.send(envelope) {
            tracing::debug!(message_type = %err.0.message_type, "outbound queue closed, dropping message");
        }
    }
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

pub trait SendHook: Send + Sync {
    fn before_send(&self, envelope: &mut Envelope);
}

pub struct SettingsSendHook {
    state: AppState,
    local_only: HashSet<String>,
}

impl SettingsSendHook {
    pub fn new(state: AppState, local_only: impl IntoIterator<Item = String>) -> Self {
        Self {
            state,
            local_only: local_only.into_iter().collect(),
        }
    }
}

impl SendHook for SettingsSendHook {
    fn before_send(&self, envelope: &mut Envelope) {
        if envelope.message_type != SETTING_CHANGE || envelope.name.is_empty() || envelope.is_skip()
        {
            return;
        }
        let mut patch = Map::new();
        patch.insert(envelope.name.clone(), envelope.value.clone());
        let applied = self.state.update(|live| match live.settings.merged(&patch) {
            Ok(next) => {
                live.settings = next;
                live.refresh_limit_hint();
                Ok(())
            }
            Err(err) => Err(err),
        });
        if let Err(err) = applied {
            tracing::warn!(name = %envelope.name, error = %err, "outbound setting not applied locally");
        }
        if self.local_only.contains(&envelope.name) {
            envelope.skip();
        }
    }
}
