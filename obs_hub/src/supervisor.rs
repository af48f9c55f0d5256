use crate::client::ObsApi;
use crate::lock;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct SupervisorInner {
    state: ConnectionState,
    retry: Option<JoinHandle<()>>,
}

/// Owns the connection lifecycle: a fixed-interval retry timer runs while
/// disconnected and is cancelled as soon as a link opens.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    api: Arc<dyn ObsApi>,
    interval: Duration,
    inner: Arc<Mutex<SupervisorInner>>,
}

impl ConnectionSupervisor {
    pub fn new(api: Arc<dyn ObsApi>, interval: Duration) -> Self {
        Self {
            api,
            interval,
            inner: Arc::new(Mutex::new(SupervisorInner {
                state: ConnectionState::Disconnected,
                retry: None,
            })),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// First attempt fires immediately, then every interval.
    pub fn start(&self) {
        self.restart_retry(Instant::now());
    }

    pub fn on_opened(&self) {
        let mut inner = lock(&self.inner);
        if let Some(retry) = inner.retry.take() {
            retry.abort();
        }
        if inner.state != ConnectionState::Connected {
            info!("obs connection up");
        }
        inner.state = ConnectionState::Connected;
    }

    /// Returns true only for a Connected -> Disconnected transition.
    pub fn on_closed(&self) -> bool {
        let was_connected = {
            let mut inner = lock(&self.inner);
            let was = inner.state == ConnectionState::Connected;
            inner.state = ConnectionState::Disconnected;
            was
        };
        if was_connected {
            info!("obs connection lost; retrying every {:?}", self.interval);
        }
        self.restart_retry(Instant::now() + self.interval);
        was_connected
    }

    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        if let Some(retry) = inner.retry.take() {
            retry.abort();
        }
        inner.state = ConnectionState::Disconnected;
    }

    fn restart_retry(&self, first_attempt: Instant) {
        let api = Arc::clone(&self.api);
        let inner = Arc::clone(&self.inner);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(first_attempt, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                {
                    let mut guard = lock(&inner);
                    if guard.state == ConnectionState::Connected {
                        return;
                    }
                    guard.state = ConnectionState::Connecting;
                }
                match api.connect().await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!("obs connect attempt failed: {e}");
                        let mut guard = lock(&inner);
                        if guard.state == ConnectionState::Connecting {
                            guard.state = ConnectionState::Disconnected;
                        }
                    }
                }
            }
        });

        let mut inner = lock(&self.inner);
        if let Some(prev) = inner.retry.replace(task) {
            prev.abort();
        }
    }
}
