//! In-memory [`ClusterClient`] for tests.
//!
//! Enabled in this crate's own tests and, for other crates, through the
//! `testing` feature. Queries are answered the same way the cached access
//! mode answers them: namespace and selector filtered locally, sorted by name.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

use crate::client::ClusterClient;
use crate::error::ClusterError;
use crate::kind::{ResourceKind, ResourceList, ResourceQuery};
use crate::selector::Selector;

#[derive(Default)]
pub struct FakeClusterClient {
    objects: Mutex<HashMap<ResourceKind, ResourceList>>,
    fetches: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<ResourceKind>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, objects: impl Into<ResourceList>) -> Self {
        self.insert(objects);
        self
    }

    /// Add objects; they are appended to any already present of the same kind.
    pub fn insert(&self, objects: impl Into<ResourceList>) {
        let objects = objects.into();
        let mut all = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        match all.get_mut(&objects.kind()) {
            Some(existing) => {
                // same kind by construction
                let _ = existing.extend(objects);
            }
            None => {
                all.insert(objects.kind(), objects);
            }
        }
    }

    /// Replace every object of the list's kind.
    pub fn replace(&self, objects: impl Into<ResourceList>) {
        let objects = objects.into();
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(objects.kind(), objects);
    }

    /// Make every query for `kind` fail until [`heal`](Self::heal) is called.
    pub fn fail(&self, kind: ResourceKind) {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner).insert(kind);
    }

    pub fn heal(&self, kind: ResourceKind) {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner).remove(&kind);
    }

    /// How many times the query with this cache key reached the client.
    pub fn fetches(&self, key: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap_or_else(PoisonError::into_inner).values().sum()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn list(&self, query: &ResourceQuery) -> Result<ResourceList, ClusterError> {
        *self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(query.cache_key())
            .or_default() += 1;

        if self.failing.lock().unwrap_or_else(PoisonError::into_inner).contains(&query.kind) {
            return Err(ClusterError::CacheSyncFailed { kind: query.kind });
        }

        let selector =
            Selector::parse(&query.selector).map_err(|source| ClusterError::InvalidSelector {
                selector: query.selector.clone(),
                source,
            })?;
        let mut list = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&query.kind)
            .cloned()
            .unwrap_or_else(|| ResourceList::empty(query.kind));
        list.retain_matching(query.namespace.as_deref(), &selector);
        list.sort();
        Ok(list)
    }
}

/// An object of type `K` with only its metadata filled in.
pub fn object<K>(name: &str, namespace: Option<&str>, labels: &[(&str, &str)]) -> K
where
    K: Resource + Default,
{
    let mut obj = K::default();
    *obj.meta_mut() = ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: (!labels.is_empty()).then(|| {
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        }),
        ..ObjectMeta::default()
    };
    obj
}
