//! In-flight request accounting for graceful shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts open SSE streams and collect requests
#[derive(Clone)]
pub struct RequestTracker {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0usize);
        Self {
            in_flight: Arc::new(tx),
        }
    }

    /// Count a request until the returned guard is dropped
    pub fn begin(&self) -> RequestGuard {
        self.in_flight.send_modify(|n| *n += 1);
        RequestGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until no request is in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        let idle = async move { rx.wait_for(|n| *n == 0).await.map(drop).is_ok() };
        matches!(tokio::time::timeout(timeout, idle).await, Ok(true))
    }
}

/// Releases its slot in the [`RequestTracker`] on drop
pub struct RequestGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}
