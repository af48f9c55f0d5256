use crate::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

type Fire = Arc<dyn Fn() + Send + Sync>;

struct CoalescerInner {
    last_fire: Option<Instant>,
    pending: Option<JoinHandle<()>>,
    seq: u64,
}

/// Rate-limits a sink to one call per `min_interval`; calls inside the window
/// collapse into a single trailing call at the end of it.
#[derive(Clone)]
pub struct NotificationCoalescer {
    fire: Fire,
    min_interval: Duration,
    inner: Arc<Mutex<CoalescerInner>>,
}

impl NotificationCoalescer {
    pub fn new(min_interval: Duration, fire: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            fire: Arc::new(fire),
            min_interval,
            inner: Arc::new(Mutex::new(CoalescerInner {
                last_fire: None,
                pending: None,
                seq: 0,
            })),
        }
    }

    pub fn notify(&self) {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
        inner.seq += 1;

        let elapsed = inner.last_fire.map(|t| now.saturating_duration_since(t));
        match elapsed {
            Some(elapsed) if elapsed < self.min_interval => {
                let delay = self.min_interval - elapsed;
                let seq = inner.seq;
                let fire = Arc::clone(&self.fire);
                let shared = Arc::clone(&self.inner);
                inner.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    {
                        let mut inner = lock(&shared);
                        if inner.seq != seq {
                            return;
                        }
                        inner.last_fire = Some(Instant::now());
                        inner.pending = None;
                    }
                    debug!("trailing notification");
                    fire();
                }));
            }
            _ => {
                inner.last_fire = Some(now);
                drop(inner);
                debug!("immediate notification");
                (self.fire)();
            }
        }
    }

    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        inner.seq += 1;
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
    }
}
