//! Session management: tracks case conversations and their exchange history.

pub mod in_memory;
pub mod sweeper;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use sweeper::spawn_sweeper;
pub use traits::{
    Exchange, Session, SessionError, SessionFilter, SessionId, SessionResult, SessionStore,
    SessionSummary,
};

use crate::config::SessionsConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Create the session store described by `config`.
pub fn create_session_store(config: &SessionsConfig) -> Arc<dyn SessionStore> {
    Arc::new(InMemorySessionStore::from_config(config))
}

/// Create the store and, when TTL eviction is enabled, its background sweeper.
///
/// Must be called from within a tokio runtime if a sweeper is started.
pub fn start_session_store(
    config: &SessionsConfig,
) -> (Arc<dyn SessionStore>, Option<JoinHandle<()>>) {
    let store = create_session_store(config);
    let sweeper = (config.ttl_secs > 0 && config.sweep_interval_secs > 0).then(|| {
        tracing::info!(
            ttl_secs = config.ttl_secs,
            interval_secs = config.sweep_interval_secs,
            "Starting session sweeper"
        );
        spawn_sweeper(
            Arc::clone(&store),
            Duration::from_secs(config.sweep_interval_secs),
        )
    });
    (store, sweeper)
}
