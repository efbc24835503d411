//! Background TTL eviction for session stores.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::traits::SessionStore;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn a task that calls [`SessionStore::sweep_expired`] every `interval`.
///
/// The task runs until the returned handle is aborted. A zero `interval` is
/// raised to one millisecond.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.sweep_expired().await;
            if removed > 0 {
                tracing::info!(removed, store = store.name(), "Swept expired sessions");
            } else {
                tracing::debug!(store = store.name(), "Session sweep found nothing to evict");
            }
        }
    })
}
