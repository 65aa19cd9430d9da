//! Last-computed aggregation, for callers that serve reads separately from
//! refreshes.

use crate::aggregate::{AggregationResult, Aggregator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub news: AggregationResult,
}

/// Shared holder for the most recent [`Snapshot`].
///
/// Cloning shares the same slot. Readers never wait on a running refresh:
/// the write lock is only taken to swap in a finished snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    latest: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs an aggregation pass and stores its result.
    pub async fn refresh(&self, aggregator: &Aggregator) -> Arc<Snapshot> {
        let news = aggregator.aggregate().await;
        let snapshot = Arc::new(Snapshot {
            fetched_at: Utc::now(),
            news,
        });

        *self.latest.write().await = Some(Arc::clone(&snapshot));
        tracing::debug!(sources = snapshot.news.len(), "Snapshot refreshed");
        snapshot
    }

    /// The previously computed snapshot, if any refresh has completed.
    pub async fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().await.clone()
    }
}
