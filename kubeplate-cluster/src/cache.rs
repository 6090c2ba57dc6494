//! Per-cycle memoization of resource queries.
//!
//! A [`ResourceCache`] sits between the template functions and a
//! [`ClusterClient`]. Within one cycle every distinct query (same kind,
//! namespace and selector) reaches the client at most once; the orchestrator
//! calls [`ResourceCache::flush`] at the start of each cycle. Failed lookups
//! are never stored.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::kind::{ResourceList, ResourceQuery};

type Entry = Arc<OnceCell<Arc<ResourceList>>>;

pub struct ResourceCache {
    client: Arc<dyn ClusterClient>,
    /// One cell per query key. The map lock is only held to find or insert a
    /// cell, never across a fetch.
    entries: RwLock<HashMap<String, Entry>>,
}

impl ResourceCache {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every memoized result.
    pub async fn flush(&self) {
        let mut entries = self.entries.write().await;
        tracing::debug!(entries = entries.len(), "flushing resource cache");
        entries.clear();
    }

    /// Number of memoized results.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Answer `query` from the memo, or ask the client and remember a success.
    ///
    /// Concurrent lookups of the same query share one fetch; lookups of other
    /// queries are not held up by it.
    pub async fn list(&self, query: &ResourceQuery) -> Result<Arc<ResourceList>, ClusterError> {
        let key = query.cache_key();
        let cell = self.entry(&key).await;
        if let Some(hit) = cell.get() {
            tracing::trace!(%key, "resource cache hit");
            return Ok(Arc::clone(hit));
        }

        let list = cell
            .get_or_try_init(|| async {
                let list = Arc::new(self.client.list(query).await?);
                tracing::debug!(%key, count = list.len(), "resource cache fill");
                Ok::<_, ClusterError>(list)
            })
            .await?;
        Ok(Arc::clone(list))
    }

    async fn entry(&self, key: &str) -> Entry {
        if let Some(cell) = self.entries.read().await.get(key) {
            return Arc::clone(cell);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(key.to_string()).or_default())
    }
}
