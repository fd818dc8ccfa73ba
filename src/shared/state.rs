use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alerts::AlertQueue;
use crate::config::AppConfig;
use crate::shared::utils::DbPool;

/// Shared application state handed to every handler.
///
/// Requests are stateless apart from this: the pool, the config, and the
/// in-memory alert queue (ephemeral, lost on restart).
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub alerts: AlertQueue,
    pub alert_watchers: Arc<RwLock<HashSet<Uuid>>>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        Self {
            conn,
            config,
            alerts: AlertQueue::default(),
            alert_watchers: Arc::new(RwLock::new(HashSet::new())),
        }
    }
}
