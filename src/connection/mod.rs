use crate::ui::ConnectingIndicator;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, url: &str) -> impl Future<Output = Result<WsStream, tungstenite::Error>> + Send;
}

pub struct TungsteniteDialer;

impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> Result<WsStream, tungstenite::Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(stream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// Never resolves if the requester is gone.
pub(crate) async fn close_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub struct ConnectionManager<D> {
    url: String,
    dialer: D,
    retry_delay: Duration,
    indicator: Arc<dyn ConnectingIndicator>,
    state_tx: watch::Sender<ConnectionState>,
    previously_connected: bool,
    shutdown: watch::Receiver<bool>,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(
        url: impl Into<String>,
        dialer: D,
        retry_delay: Duration,
        indicator: Arc<dyn ConnectingIndicator>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            dialer,
            retry_delay,
            indicator,
            state_tx,
            previously_connected: false,
            shutdown,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub async fn connect(&mut self) -> Option<WsStream> {
        self.indicator.show(&self.url);
        let stream = self.dial_until_connected().await;
        self.indicator.hide();
        stream
    }

    pub async fn reconnect(&mut self) -> Option<WsStream> {
        let announce = std::mem::take(&mut self.previously_connected);
        if announce {
            self.indicator.show(&self.url);
        }
        let stream = self.dial_until_connected().await;
        if announce {
            self.indicator.hide();
        }
        stream
    }

    pub fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    async fn dial_until_connected(&mut self) -> Option<WsStream> {
        self.set_state(ConnectionState::Connecting);
        let mut attempt: u64 = 0;
        loop {
            if *self.shutdown.borrow() {
                self.set_state(ConnectionState::Disconnected);
                return None;
            }
            attempt += 1;
            let dialed = tokio::select! {
                res = self.dialer.dial(&self.url) => res,
                _ = close_requested(&mut self.shutdown) => {
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
            };
            match dialed {
                Ok(stream) => {
                    tracing::info!(url = %self.url, attempt, "websocket connected");
                    self.previously_connected = true;
                    self.set_state(ConnectionState::Connected);
                    return Some(stream);
                }
                Err(err) => {
                    tracing::warn!(url = %self.url, attempt, error = %err, "websocket dial failed, retrying");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = close_requested(&mut self.shutdown) => {
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Default)]
    pub(crate) struct CountingIndicator {
        pub shows: AtomicUsize,
        pub hides: AtomicUsize,
    }

    impl ConnectingIndicator for CountingIndicator {
        fn show(&self, _target: &str) {
            self.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn hide(&self) {
            self.hides.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FlakyDialer {
        failures_left: AtomicUsize,
        attempts: Arc<AtomicUsize>,
    }

    impl Dialer for FlakyDialer {
        async fn dial(&self, url: &str) -> Result<WsStream, tungstenite::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(tungstenite::Error::ConnectionClosed);
            }
            TungsteniteDialer.dial(url).await
        }
    }

    struct AlwaysFail {
        attempts: Arc<AtomicUsize>,
    }

    impl Dialer for AlwaysFail {
        async fn dial(&self, _url: &str) -> Result<WsStream, tungstenite::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(tungstenite::Error::ConnectionClosed)
        }
    }

    async fn accept_one() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        (url, server)
    }

    #[tokio::test]
    async fn connects_after_consecutive_failures() {
        for failures in [0usize, 1, 4] {
            let (url, server) = accept_one().await;
            let indicator = Arc::new(CountingIndicator::default());
            let attempts = Arc::new(AtomicUsize::new(0));
            let dialer = FlakyDialer {
                failures_left: AtomicUsize::new(failures),
                attempts: attempts.clone(),
            };
            let (_close_tx, close_rx) = watch::channel(false);
            let mut manager = ConnectionManager::new(
                url,
                dialer,
                Duration::from_millis(10),
                indicator.clone(),
                close_rx,
            );

            let states = manager.subscribe();
            assert!(manager.connect().await.is_some());
            assert_eq!(*states.borrow(), ConnectionState::Connected);
            assert_eq!(attempts.load(Ordering::SeqCst), failures + 1);
            assert_eq!(indicator.shows.load(Ordering::SeqCst), 1);
            assert_eq!(indicator.hides.load(Ordering::SeqCst), 1);
            server.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_fixed_delay_until_closed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let indicator = Arc::new(CountingIndicator::default());
        let (close_tx, close_rx) = watch::channel(false);
        let mut manager = ConnectionManager::new(
            "ws://127.0.0.1:9/",
            AlwaysFail {
                attempts: attempts.clone(),
            },
            Duration::from_millis(500),
            indicator.clone(),
            close_rx,
        );
        let states = manager.subscribe();
        let task = tokio::spawn(async move { manager.connect().await.is_some() });

        tokio::time::sleep(Duration::from_millis(2250)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        assert_eq!(*states.borrow(), ConnectionState::Connecting);

        close_tx.send(true).unwrap();
        assert!(!task.await.unwrap());
        assert_eq!(*states.borrow(), ConnectionState::Disconnected);
        assert_eq!(indicator.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconnect_announces_once_per_disconnect() {
        let (url, server) = accept_one().await;
        let indicator = Arc::new(CountingIndicator::default());
        let (_close_tx, close_rx) = watch::channel(false);
        let mut manager = ConnectionManager::new(
            url,
            FlakyDialer {
                failures_left: AtomicUsize::new(2),
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_millis(10),
            indicator.clone(),
            close_rx,
        );
        manager.previously_connected = true;
        manager.mark_disconnected();

        assert!(manager.reconnect().await.is_some());
        assert_eq!(indicator.shows.load(Ordering::SeqCst), 1);
        assert_eq!(indicator.hides.load(Ordering::SeqCst), 1);
        assert!(manager.previously_connected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_without_prior_connection_stays_quiet() {
        let indicator = Arc::new(CountingIndicator::default());
        let (close_tx, close_rx) = watch::channel(false);
        let mut manager = ConnectionManager::new(
            "ws://127.0.0.1:9/",
            AlwaysFail {
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_millis(10),
            indicator.clone(),
            close_rx,
        );
        close_tx.send(true).unwrap();

        assert!(manager.reconnect().await.is_none());
        assert_eq!(indicator.shows.load(Ordering::SeqCst), 0);
        assert_eq!(indicator.hides.load(Ordering::SeqCst), 0);
    }
}
