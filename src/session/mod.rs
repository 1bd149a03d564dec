use crate::connection::{ConnectionManager, ConnectionState, Dialer};
use crate::dispatch::Registry;
use crate::outbound::{OutboundReceiver, SendHook};
use crate::protocol::BackendMode;
use crate::pump;
use crate::ui::ConnectingIndicator;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tokio::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{task} task panicked: {source}")]
    TaskPanicked {
        task: &'static str,
        #[source]
        source: JoinError,
    },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub mode: BackendMode,
    pub retry_delay: Duration,
    pub close_timeout: Duration,
    pub handle_interrupt: bool,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    close_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SessionHandle {
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

pub struct Session<D> {
    config: SessionConfig,
    conn: ConnectionManager<D>,
    registry: Arc<Registry>,
    hook: Arc<dyn SendHook>,
    outbound: OutboundReceiver,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
}

impl<D: Dialer> Session<D> {
    pub fn new(
        config: SessionConfig,
        dialer: D,
        registry: Arc<Registry>,
        hook: Arc<dyn SendHook>,
        indicator: Arc<dyn ConnectingIndicator>,
        outbound: OutboundReceiver,
    ) -> Self {
        let (close_tx, close_rx) = watch::channel(false);
        let conn = ConnectionManager::new(
            config.url.clone(),
            dialer,
            config.retry_delay,
            indicator,
            close_rx.clone(),
        );
        Self {
            config,
            conn,
            registry,
            hook,
            outbound,
            close_tx: Arc::new(close_tx),
            close_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            close_tx: self.close_tx.clone(),
            state_rx: self.conn.subscribe(),
        }
    }

    pub async fn start(self) -> Result<(), SessionError> {
        let Self {
            config,
            mut conn,
            registry,
            hook,
            outbound,
            close_tx,
            close_rx,
        } = self;

        let interrupt = config.handle_interrupt.then(|| {
            let close_tx = close_tx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown: ctrl-c");
                    close_tx.send_replace(true);
                }
            })
        });

        let (link_tx, link_rx) = mpsc::channel(1);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let mut sender = tokio::spawn(pump::send_loop(
            pump::Link::Down,
            outbound,
            link_rx,
            failure_tx,
            hook,
            close_rx.clone(),
            done_rx,
            config.close_timeout,
        ));

        let Some(stream) = conn.connect().await else {
            tracing::info!("session closed before a connection was established");
            drop(done_tx);
            let outcome = sender
                .await
                .map_err(|source| SessionError::TaskPanicked { task: "send", source });
            if let Some(task) = interrupt {
                task.abort();
            }
            return outcome;
        };
        let (mut sink, source) = stream.split();
        if let Err(err) = pump::announce(&mut sink, config.mode).await {
            tracing::warn!(error = %err, "initial handshake failed");
        }
        if link_tx
            .send(pump::Link::Up { generation: 0, sink })
            .await
            .is_err()
        {
            tracing::debug!("send loop gone before the first connection was attached");
        }

        let mut receiver = tokio::spawn(pump::receive_loop(
            source,
            conn,
            registry,
            link_tx,
            failure_rx,
            config.mode,
            close_rx,
            done_tx,
        ));

        let outcome = tokio::select! {
            res = &mut sender => {
                receiver.abort();
                res.map_err(|source| SessionError::TaskPanicked { task: "send", source })
            }
            res = &mut receiver => {
                // The receive loop only returns on its own once close was requested.
                close_tx.send_replace(true);
                match res {
                    Err(source) => {
                        sender.abort();
                        Err(SessionError::TaskPanicked { task: "receive", source })
                    }
                    Ok(()) => sender
                        .await
                        .map_err(|source| SessionError::TaskPanicked { task: "send", source }),
                }
            }
        };
        if let Some(task) = interrupt {
            task.abort();
        }
        tracing::info!("session closed");
        outcome
    }
}
