use crate::core::client::QueryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Background refresh of observed queries on a fixed interval and whenever
/// the window regains focus.
pub struct Revalidator {
    focus: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Revalidator {
    pub fn spawn(client: QueryClient, interval: Duration) -> Revalidator {
        let focus = Arc::new(Notify::new());
        let signal = focus.clone();
        let period = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let reason = tokio::select! {
                    _ = ticker.tick() => "interval",
                    _ = signal.notified() => "focus",
                };
                let count = client.refetch_active().await;
                let dropped = client.cache().collect_garbage();
                tracing::debug!(
                    "revalidated {} queries ({}), dropped {} idle entries",
                    count,
                    reason,
                    dropped
                );
            }
        });
        Revalidator { focus, handle }
    }

    pub fn focus(&self) {
        self.focus.notify_one();
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}
