use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use server_api::ApiContext;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) viewers: ViewerRegistry,
    pub(crate) started_at: Instant,
    pub(crate) tick_interval_ms: u64,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, tick_interval_ms: u64) -> Self {
        Self {
            api,
            viewers: ViewerRegistry::default(),
            started_at: Instant::now(),
            tick_interval_ms,
        }
    }
}

/// Live WebSocket viewers keyed by connection id.
#[derive(Clone, Default)]
pub(crate) struct ViewerRegistry {
    inner: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
}

impl ViewerRegistry {
    pub(crate) async fn connect(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, Utc::now());
        id
    }

    pub(crate) async fn disconnect(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    pub(crate) async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
