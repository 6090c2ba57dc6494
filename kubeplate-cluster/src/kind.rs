//! The resource kinds templates can query, and typed lists of them.
//!
//! Every kind is declared once in the `resource_kinds!` table at the bottom
//! of this file. The table generates:
//!
//! - [`ResourceKind`] — the kind identifiers, with name and scope
//! - [`ResourceList`] — one typed `Vec` per kind
//! - the API server and mirror dispatch used by [`crate::KubeClusterClient`]
//! - one typed accessor per kind on [`crate::ResourceCache`]

use std::fmt;

use k8s_openapi::api::core::v1::{
    ComponentStatus, ConfigMap, Endpoints, Event, LimitRange, Namespace, Node, PersistentVolume,
    PersistentVolumeClaim, Pod, PodTemplate, ReplicationController, ResourceQuota, Secret, Service,
    ServiceAccount,
};
use kube::runtime::reflector::Store;
use kube::{Resource, ResourceExt};

use crate::cache::ResourceCache;
use crate::error::ClusterError;
use crate::selector::Selector;

/// Namespace used when a namespaced query does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Namespaced,
    Cluster,
}

// ---------------------------------------------------------------------------
// 1. ResourceQuery
// ---------------------------------------------------------------------------

/// One lookup: a kind, a namespace for namespaced kinds, and a label selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceQuery {
    pub kind: ResourceKind,
    /// Always `None` for cluster-scoped kinds. `Some("")` means all namespaces.
    pub namespace: Option<String>,
    /// Raw selector text, trimmed. Empty selects everything.
    pub selector: String,
}

impl ResourceQuery {
    /// Build a query, applying the namespace rules for `kind`:
    /// namespaced kinds default to [`DEFAULT_NAMESPACE`], cluster-scoped kinds
    /// ignore any namespace given.
    pub fn new(kind: ResourceKind, namespace: Option<&str>, selector: &str) -> Self {
        let namespace = match kind.scope() {
            Scope::Namespaced => Some(namespace.unwrap_or(DEFAULT_NAMESPACE).to_string()),
            Scope::Cluster => None,
        };
        Self {
            kind,
            namespace,
            selector: selector.trim().to_string(),
        }
    }

    /// Memoization key: `pods(default,app=web)` or `nodes(role=edge)`.
    pub fn cache_key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}({},{})", self.kind, ns, self.selector),
            None => format!("{}({})", self.kind, self.selector),
        }
    }
}

impl fmt::Display for ResourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

// ---------------------------------------------------------------------------
// 2. Generic helpers shared by every kind
// ---------------------------------------------------------------------------

fn sort_by_name<K: Resource>(items: &mut [K]) {
    items.sort_by(|a, b| {
        let (a, b) = (a.meta(), b.meta());
        a.name
            .cmp(&b.name)
            .then_with(|| a.namespace.cmp(&b.namespace))
    });
}

fn retain_matching<K: Resource>(items: &mut Vec<K>, namespace: Option<&str>, selector: &Selector) {
    items.retain(|item| {
        let in_namespace = match namespace {
            Some(ns) if !ns.is_empty() => item.meta().namespace.as_deref() == Some(ns),
            _ => true,
        };
        in_namespace && selector.matches(item.labels())
    });
}

fn snapshot<K: Resource<DynamicType = ()> + Clone + 'static>(store: &Store<K>) -> Vec<K> {
    store.state().iter().map(|obj| obj.as_ref().clone()).collect()
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// 3. Per-scope expansions
// ---------------------------------------------------------------------------

macro_rules! api_list {
    (Namespaced, $ty:ty, $client:expr, $query:expr) => {
        crate::client::list_namespaced::<$ty>($client, $query).await
    };
    (Cluster, $ty:ty, $client:expr, $query:expr) => {
        crate::client::list_cluster::<$ty>($client, $query).await
    };
}

macro_rules! typed_accessor {
    (Namespaced, $variant:ident, $ty:ty, $method:ident, $name:literal) => {
        #[doc = concat!("`", $name, "` in `namespace` matching `selector`, through the cache.")]
        pub async fn $method(&self, namespace: &str, selector: &str) -> Result<Vec<$ty>, ClusterError> {
            let query = ResourceQuery::new(ResourceKind::$variant, Some(namespace), selector);
            match &*self.list(&query).await? {
                ResourceList::$variant(items) => Ok(items.clone()),
                other => Err(ClusterError::UnexpectedKind {
                    expected: ResourceKind::$variant,
                    actual: other.kind(),
                }),
            }
        }
    };
    (Cluster, $variant:ident, $ty:ty, $method:ident, $name:literal) => {
        #[doc = concat!("`", $name, "` matching `selector`, through the cache.")]
        pub async fn $method(&self, selector: &str) -> Result<Vec<$ty>, ClusterError> {
            let query = ResourceQuery::new(ResourceKind::$variant, None, selector);
            match &*self.list(&query).await? {
                ResourceList::$variant(items) => Ok(items.clone()),
                other => Err(ClusterError::UnexpectedKind {
                    expected: ResourceKind::$variant,
                    actual: other.kind(),
                }),
            }
        }
    };
}

// ---------------------------------------------------------------------------
// 4. The kind table
// ---------------------------------------------------------------------------

macro_rules! resource_kinds {
    ($( $variant:ident($ty:ty) => $name:literal, $method:ident, $scope:ident; )+) => {
        /// A queryable resource kind. Its [`name`](ResourceKind::name) is also the
        /// template function name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ResourceKind {
            $( $variant, )+
        }

        impl ResourceKind {
            pub const ALL: &'static [ResourceKind] = &[ $( ResourceKind::$variant, )+ ];

            pub fn name(self) -> &'static str {
                match self {
                    $( ResourceKind::$variant => $name, )+
                }
            }

            pub fn scope(self) -> Scope {
                match self {
                    $( ResourceKind::$variant => Scope::$scope, )+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(ResourceKind::$variant), )+
                    _ => None,
                }
            }
        }

        /// Objects of one kind, sorted by name (then namespace) once produced
        /// by a client.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ResourceList {
            $( $variant(Vec<$ty>), )+
        }

        $(
            impl From<Vec<$ty>> for ResourceList {
                fn from(items: Vec<$ty>) -> Self {
                    ResourceList::$variant(items)
                }
            }
        )+

        impl ResourceList {
            pub fn empty(kind: ResourceKind) -> Self {
                match kind {
                    $( ResourceKind::$variant => ResourceList::$variant(Vec::new()), )+
                }
            }

            pub fn kind(&self) -> ResourceKind {
                match self {
                    $( ResourceList::$variant(_) => ResourceKind::$variant, )+
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $( ResourceList::$variant(items) => items.len(), )+
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Object names in list order.
            pub fn names(&self) -> Vec<String> {
                match self {
                    $( ResourceList::$variant(items) => items.iter().map(|o| o.name_any()).collect(), )+
                }
            }

            /// The list as plain data for the template context: an array of
            /// objects carrying the API's field names (`metadata.name`,
            /// `status.podIP`, …).
            pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
                match self {
                    $( ResourceList::$variant(items) => serde_json::to_value(items), )+
                }
            }

            /// Append every object of `other` if it is the same kind.
            pub fn extend(&mut self, other: ResourceList) -> Result<(), ClusterError> {
                match (self, other) {
                    $( (ResourceList::$variant(items), ResourceList::$variant(more)) => {
                        items.extend(more);
                        Ok(())
                    } )+
                    (this, other) => Err(ClusterError::UnexpectedKind {
                        expected: this.kind(),
                        actual: other.kind(),
                    }),
                }
            }

            pub(crate) fn sort(&mut self) {
                match self {
                    $( ResourceList::$variant(items) => sort_by_name(items), )+
                }
            }

            pub(crate) fn retain_matching(&mut self, namespace: Option<&str>, selector: &Selector) {
                match self {
                    $( ResourceList::$variant(items) => retain_matching(items, namespace, selector), )+
                }
            }
        }

        /// Single list request against the API server.
        pub(crate) async fn list_from_api(
            client: &kube::Client,
            query: &ResourceQuery,
        ) -> Result<ResourceList, kube::Error> {
            match query.kind {
                $( ResourceKind::$variant => {
                    let items = api_list!($scope, $ty, client, query)?;
                    Ok(ResourceList::$variant(items))
                } )+
            }
        }

        /// A watch-driven local copy of every object of one kind.
        pub(crate) enum Mirror {
            $( $variant(Store<$ty>), )+
        }

        impl Mirror {
            pub(crate) fn start(
                kind: ResourceKind,
                client: kube::Client,
                stop: tokio_util::sync::CancellationToken,
            ) -> Self {
                match kind {
                    $( ResourceKind::$variant => {
                        Mirror::$variant(crate::client::spawn_mirror::<$ty>(client, stop, kind))
                    } )+
                }
            }

            /// `false` when the mirror's writer went away before the initial list.
            pub(crate) async fn wait_until_ready(&self) -> bool {
                match self {
                    $( Mirror::$variant(store) => store.wait_until_ready().await.is_ok(), )+
                }
            }

            pub(crate) fn snapshot(&self) -> ResourceList {
                match self {
                    $( Mirror::$variant(store) => ResourceList::$variant(snapshot(store)), )+
                }
            }
        }

        impl ResourceCache {
            $( typed_accessor!($scope, $variant, $ty, $method, $name); )+
        }
    };
}

resource_kinds! {
    Pods(Pod)                                       => "pods", pods, Namespaced;
    Services(Service)                               => "services", services, Namespaced;
    ReplicationControllers(ReplicationController)   => "replicationcontrollers", replication_controllers, Namespaced;
    Events(Event)                                   => "events", events, Namespaced;
    Endpoints(Endpoints)                            => "endpoints", endpoints, Namespaced;
    ConfigMaps(ConfigMap)                           => "configmaps", config_maps, Namespaced;
    LimitRanges(LimitRange)                         => "limitranges", limit_ranges, Namespaced;
    PersistentVolumeClaims(PersistentVolumeClaim)   => "persistentvolumeclaims", persistent_volume_claims, Namespaced;
    PodTemplates(PodTemplate)                       => "podtemplates", pod_templates, Namespaced;
    ResourceQuotas(ResourceQuota)                   => "resourcequotas", resource_quotas, Namespaced;
    Secrets(Secret)                                 => "secrets", secrets, Namespaced;
    ServiceAccounts(ServiceAccount)                 => "serviceaccounts", service_accounts, Namespaced;
    Nodes(Node)                                     => "nodes", nodes, Cluster;
    Namespaces(Namespace)                           => "namespaces", namespaces, Cluster;
    ComponentStatuses(ComponentStatus)              => "componentstatuses", component_statuses, Cluster;
    PersistentVolumes(PersistentVolume)             => "persistentvolumes", persistent_volumes, Cluster;
}
