//! Access to the orchestration API server.
//!
//! # Access modes
//!
//! ```text
//! Direct  — every list goes to the API server, selector applied server-side
//! Cached  — per-kind local mirror fed by list+watch, started on first use;
//!           lists are answered from the mirror, selector applied locally
//! ```
//!
//! Cached mode is chosen when periodic polling is enabled, so repeated
//! cycles do not hammer the API server.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource};
use kubeplate_core::ClusterConfig;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::error::{config_err, ClusterError};
use crate::kind::{list_from_api, Mirror, ResourceKind, ResourceList, ResourceQuery};
use crate::selector::Selector;

// ---------------------------------------------------------------------------
// 1. ClusterClient
// ---------------------------------------------------------------------------

/// Answers resource queries. The result is sorted by object name.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list(&self, query: &ResourceQuery) -> Result<ResourceList, ClusterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Direct,
    Cached,
}

impl AccessMode {
    /// Cached when polling is enabled.
    pub fn for_polling(polling_enabled: bool) -> Self {
        if polling_enabled {
            AccessMode::Cached
        } else {
            AccessMode::Direct
        }
    }
}

// ---------------------------------------------------------------------------
// 2. KubeClusterClient
// ---------------------------------------------------------------------------

/// [`ClusterClient`] backed by a real API server connection.
pub struct KubeClusterClient {
    client: Client,
    mode: AccessMode,
    /// Stops every mirror this client started and unblocks sync waits.
    stop: CancellationToken,
    mirrors: Mutex<HashMap<ResourceKind, Arc<OnceCell<Mirror>>>>,
}

impl KubeClusterClient {
    pub fn new(client: Client, mode: AccessMode, stop: CancellationToken) -> Self {
        Self {
            client,
            mode,
            stop,
            mirrors: Mutex::new(HashMap::new()),
        }
    }

    /// Build the connection described by `cluster`.
    pub async fn connect(
        cluster: &ClusterConfig,
        mode: AccessMode,
        stop: CancellationToken,
    ) -> Result<Self, ClusterError> {
        let config = client_config(cluster).await?;
        tracing::debug!(url = %config.cluster_url, ?mode, "connecting to API server");
        let client = Client::try_from(config).map_err(config_err)?;
        Ok(Self::new(client, mode, stop))
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    async fn list_direct(&self, query: &ResourceQuery) -> Result<ResourceList, ClusterError> {
        tracing::debug!(%query, "listing from API server");
        let mut list = list_from_api(&self.client, query)
            .await
            .map_err(|source| ClusterError::Api {
                kind: query.kind,
                source,
            })?;
        list.sort();
        Ok(list)
    }

    async fn list_cached(
        &self,
        query: &ResourceQuery,
        selector: &Selector,
    ) -> Result<ResourceList, ClusterError> {
        let cell = {
            let mut mirrors = self.mirrors.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(mirrors.entry(query.kind).or_default())
        };
        let mirror = cell.get_or_try_init(|| self.start_mirror(query.kind)).await?;

        let mut list = mirror.snapshot();
        list.retain_matching(query.namespace.as_deref(), selector);
        list.sort();
        Ok(list)
    }

    /// Start the mirror for `kind` and wait for its initial list, or for stop.
    async fn start_mirror(&self, kind: ResourceKind) -> Result<Mirror, ClusterError> {
        tracing::info!(%kind, "starting local mirror");
        let mirror = Mirror::start(kind, self.client.clone(), self.stop.clone());
        let synced = tokio::select! {
            ready = mirror.wait_until_ready() => ready,
            _ = self.stop.cancelled() => false,
        };
        if !synced {
            return Err(ClusterError::CacheSyncFailed { kind });
        }
        tracing::debug!(%kind, "local mirror synced");
        Ok(mirror)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list(&self, query: &ResourceQuery) -> Result<ResourceList, ClusterError> {
        let selector =
            Selector::parse(&query.selector).map_err(|source| ClusterError::InvalidSelector {
                selector: query.selector.clone(),
                source,
            })?;
        match self.mode {
            AccessMode::Direct => self.list_direct(query).await,
            AccessMode::Cached => self.list_cached(query, &selector).await,
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Connection settings
// ---------------------------------------------------------------------------

/// In-cluster service account, then kubeconfig file (optionally with the
/// master URL overriding its server), then bare master URL, then kube's
/// standard inference.
async fn client_config(cluster: &ClusterConfig) -> Result<kube::Config, ClusterError> {
    if cluster.in_cluster {
        tracing::debug!("using in-cluster configuration");
        return kube::Config::incluster().map_err(config_err);
    }
    if let Some(path) = &cluster.kube_config {
        tracing::debug!(path = %path.display(), "using kubeconfig file");
        let kubeconfig = Kubeconfig::read_from(path).map_err(config_err)?;
        let mut config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(config_err)?;
        if let Some(master) = &cluster.master {
            config.cluster_url = master.parse().map_err(config_err)?;
        }
        return Ok(config);
    }
    if let Some(master) = &cluster.master {
        return Ok(kube::Config::new(master.parse().map_err(config_err)?));
    }
    kube::Config::infer().await.map_err(config_err)
}

// ---------------------------------------------------------------------------
// 4. Per-type plumbing, instantiated by the kind table
// ---------------------------------------------------------------------------

fn list_params(query: &ResourceQuery) -> ListParams {
    let params = ListParams::default();
    if query.selector.is_empty() {
        params
    } else {
        params.labels(&query.selector)
    }
}

pub(crate) async fn list_namespaced<K>(
    client: &Client,
    query: &ResourceQuery,
) -> Result<Vec<K>, kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<K> = match query.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Api::namespaced(client.clone(), ns),
        _ => Api::all(client.clone()),
    };
    Ok(api.list(&list_params(query)).await?.items)
}

pub(crate) async fn list_cluster<K>(
    client: &Client,
    query: &ResourceQuery,
) -> Result<Vec<K>, kube::Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let api: Api<K> = Api::all(client.clone());
    Ok(api.list(&list_params(query)).await?.items)
}

/// Spawn a reflector over every object of type `K`, running until `stop`.
pub(crate) fn spawn_mirror<K>(client: Client, stop: CancellationToken, kind: ResourceKind) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store::<K>();
    let api: Api<K> = Api::all(client);
    let stream =
        reflector::reflector(writer, watcher::watcher(api, watcher::Config::default())).default_backoff();

    tokio::spawn(async move {
        let events = stream.for_each(|event| async move {
            if let Err(err) = event {
                tracing::warn!(%kind, error = %err, "watch error");
            }
        });
        tokio::select! {
            _ = stop.cancelled() => tracing::debug!(%kind, "local mirror stopped"),
            _ = events => tracing::warn!(%kind, "watch stream ended"),
        }
    });
    reader
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A client whose every request fails to connect, so no mirror ever syncs.
    fn unreachable(mode: AccessMode, stop: CancellationToken) -> Arc<KubeClusterClient> {
        let config = kube::Config::new("http://127.0.0.1:1".parse().expect("url"));
        let client = Client::try_from(config).expect("client");
        Arc::new(KubeClusterClient::new(client, mode, stop))
    }

    fn spawn_list(
        kube: &Arc<KubeClusterClient>,
        query: &ResourceQuery,
    ) -> tokio::task::JoinHandle<Result<ResourceList, ClusterError>> {
        let kube = Arc::clone(kube);
        let query = query.clone();
        tokio::spawn(async move { kube.list(&query).await })
    }

    #[test]
    fn polling_selects_cached_mode() {
        assert_eq!(AccessMode::for_polling(true), AccessMode::Cached);
        assert_eq!(AccessMode::for_polling(false), AccessMode::Direct);
    }

    #[test]
    fn empty_selector_sends_no_label_filter() {
        let q = ResourceQuery::new(ResourceKind::Pods, None, "");
        assert!(list_params(&q).label_selector.is_none());
        let q = ResourceQuery::new(ResourceKind::Pods, None, "app=web");
        assert_eq!(list_params(&q).label_selector.as_deref(), Some("app=web"));
    }

    #[tokio::test]
    async fn cached_list_waits_for_sync_until_stopped() {
        let stop = CancellationToken::new();
        let kube = unreachable(AccessMode::Cached, stop.clone());
        let query = ResourceQuery::new(ResourceKind::Pods, Some("default"), "app=web");

        let first = spawn_list(&kube, &query);
        let second = spawn_list(&kube, &query);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!first.is_finished(), "list must wait for the initial sync");
        assert!(!second.is_finished(), "list must wait for the initial sync");
        assert_eq!(kube.mirrors.lock().expect("mirrors").len(), 1);

        stop.cancel();
        for task in [first, second] {
            let result = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("stop unblocks the sync wait")
                .expect("join");
            assert!(
                matches!(result, Err(ClusterError::CacheSyncFailed { kind: ResourceKind::Pods })),
                "got: {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn cached_mode_starts_one_mirror_per_kind() {
        let stop = CancellationToken::new();
        let kube = unreachable(AccessMode::Cached, stop.clone());

        let tasks = vec![
            spawn_list(&kube, &ResourceQuery::new(ResourceKind::Pods, Some("a"), "")),
            spawn_list(&kube, &ResourceQuery::new(ResourceKind::Pods, Some("b"), "tier=web")),
            spawn_list(&kube, &ResourceQuery::new(ResourceKind::Nodes, None, "")),
        ];
        tokio::time::sleep(Duration::from_millis(200)).await;
        {
            let mirrors = kube.mirrors.lock().expect("mirrors");
            assert_eq!(mirrors.len(), 2);
            assert!(mirrors.contains_key(&ResourceKind::Pods));
            assert!(mirrors.contains_key(&ResourceKind::Nodes));
        }

        stop.cancel();
        for task in tasks {
            let result = task.await.expect("join");
            assert!(matches!(result, Err(ClusterError::CacheSyncFailed { .. })), "got: {result:?}");
        }
    }

    #[tokio::test]
    async fn cached_mode_rejects_bad_selectors_before_starting_a_mirror() {
        let kube = unreachable(AccessMode::Cached, CancellationToken::new());
        let err = kube
            .list(&ResourceQuery::new(ResourceKind::Pods, None, "app in (web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidSelector { .. }), "got: {err}");
        assert!(kube.mirrors.lock().expect("mirrors").is_empty());
    }

    #[tokio::test]
    async fn master_url_builds_a_client_config() {
        let cluster = ClusterConfig {
            master: Some("http://127.0.0.1:8080".to_string()),
            ..ClusterConfig::default()
        };
        let config = client_config(&cluster).await.expect("config");
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(8080));
    }

    #[tokio::test]
    async fn unreadable_kubeconfig_is_a_config_error() {
        let cluster = ClusterConfig {
            kube_config: Some("/nonexistent/kubeconfig".into()),
            ..ClusterConfig::default()
        };
        let err = client_config(&cluster).await.unwrap_err();
        assert!(matches!(err, ClusterError::ClientConfig { .. }), "got: {err}");
    }
}
