//! Rendering templates against an in-memory cluster.

use std::sync::Arc;

use kubeplate_cluster::fake::{object, FakeClusterClient};
use kubeplate_cluster::k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service};
use kubeplate_cluster::{ClusterClient, ResourceCache, ResourceKind};
use kubeplate_renderer::{EngineSettings, FunctionError, FunctionTable, RenderError, TemplateEngine};
use rstest::rstest;

struct Harness {
    runtime: tokio::runtime::Runtime,
    fake: Arc<FakeClusterClient>,
    cache: Arc<ResourceCache>,
}

impl Harness {
    fn new(fake: FakeClusterClient) -> Self {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let fake = Arc::new(fake);
        let cache = Arc::new(ResourceCache::new(Arc::clone(&fake) as Arc<dyn ClusterClient>));
        Harness { runtime, fake, cache }
    }

    fn functions(&self) -> FunctionTable {
        FunctionTable::new(Arc::clone(&self.cache), self.runtime.handle().clone())
    }

    fn compile(&self, source: &str) -> TemplateEngine {
        TemplateEngine::compile("t.tmpl", source, &EngineSettings::default(), &self.functions())
            .expect("compile")
    }

    fn render(&self, source: &str) -> Result<String, RenderError> {
        self.compile(source).render()
    }

    fn flush(&self) {
        self.runtime.block_on(self.cache.flush());
    }
}

fn cluster() -> FakeClusterClient {
    FakeClusterClient::new()
        .with(vec![object::<Pod>("pod1", Some("default"), &[("app", "foo")])])
        .with(vec![
            object::<Service>("web", Some("default"), &[("tier", "front")]),
            object::<Service>("db", Some("backend"), &[("tier", "back")]),
        ])
        .with(vec![
            object::<Node>("node-b", None, &[("role", "worker")]),
            object::<Node>("node-a", None, &[("role", "edge")]),
        ])
        .with(vec![object::<Namespace>("default", None, &[])])
        .with(vec![object::<ConfigMap>("settings", Some("default"), &[])])
}

// ---------------------------------------------------------------------------
// 1. Golden output
// ---------------------------------------------------------------------------

const POD_SUMMARY: &str = r#"{% set ps = pods(selector="app=foo") %}{% for p in ps %}{{ p.metadata.name }}{% endfor %} has {{ ps | length }} pods"#;

#[test]
fn pod_summary_renders_deterministically() {
    let h = Harness::new(cluster());
    let first = h.render(POD_SUMMARY).expect("render");
    h.flush();
    let second = h.render(POD_SUMMARY).expect("render");
    assert_eq!(first, "pod1 has 1 pods");
    assert_eq!(first, second);
}

#[test]
fn lists_are_name_sorted() {
    let h = Harness::new(cluster());
    let out = h
        .render(r#"{% for n in nodes() %}{{ n.metadata.name }}={{ n.metadata.labels.role }};{% endfor %}"#)
        .expect("render");
    assert_eq!(out, "node-a=edge;node-b=worker;");
}

// ---------------------------------------------------------------------------
// 2. Namespace and selector arguments
// ---------------------------------------------------------------------------

#[rstest]
#[case(r#"{{ services() | length }}"#, "1")]
#[case(r#"{{ services(selector="", namespace="backend") | length }}"#, "1")]
#[case(r#"{{ services(selector="", namespace="") | length }}"#, "2")]
#[case(r#"{{ services(selector="tier=back", namespace="") | length }}"#, "1")]
#[case(r#"{{ services(namespace="nowhere") | length }}"#, "0")]
#[case(r#"{{ nodes(selector="role in (edge, worker)") | length }}"#, "2")]
fn namespace_and_selector_arguments(#[case] source: &str, #[case] expected: &str) {
    let h = Harness::new(cluster());
    assert_eq!(h.render(source).expect("render"), expected);
}

#[test]
fn every_kind_is_callable() {
    let h = Harness::new(cluster());
    for kind in ResourceKind::ALL {
        let source = format!("{{{{ {}() | length }}}}", kind.name());
        h.render(&source)
            .unwrap_or_else(|e| panic!("{} failed: {e}", kind.name()));
    }
}

// ---------------------------------------------------------------------------
// 3. Memoization through the function table
// ---------------------------------------------------------------------------

#[test]
fn repeated_query_in_one_render_fetches_once() {
    let h = Harness::new(cluster());
    h.render(r#"{{ pods(selector="app=foo") | length }}{{ pods(selector="app=foo") | length }}"#)
        .expect("render");
    assert_eq!(h.fake.fetches("pods(default,app=foo)"), 1);

    h.render(r#"{{ pods(selector="app=foo") | length }}"#).expect("render");
    assert_eq!(h.fake.fetches("pods(default,app=foo)"), 1);

    h.flush();
    h.render(r#"{{ pods(selector="app=foo") | length }}"#).expect("render");
    assert_eq!(h.fake.fetches("pods(default,app=foo)"), 2);
}

// ---------------------------------------------------------------------------
// 4. Failures abort only the render
// ---------------------------------------------------------------------------

#[test]
fn failed_query_surfaces_as_function_error() {
    let h = Harness::new(cluster());
    h.fake.fail(ResourceKind::ConfigMaps);
    let err = h.render("{{ configmaps() | length }}").unwrap_err();
    assert!(
        matches!(err.function_error(), Some(FunctionError::Query { .. })),
        "got: {err}"
    );

    h.fake.heal(ResourceKind::ConfigMaps);
    assert_eq!(h.render("{{ configmaps() | length }}").expect("render"), "1");
}

#[test]
fn malformed_selector_surfaces_as_function_error() {
    let h = Harness::new(cluster());
    let err = h.render(r#"{{ pods(selector="app in (foo") }}"#).unwrap_err();
    assert!(err.to_string().contains("invalid label selector"), "got: {err}");
}

#[test]
fn engine_can_render_again_after_a_failure() {
    let h = Harness::new(cluster());
    let engine = h.compile("{{ namespaces() | length }}");
    h.fake.fail(ResourceKind::Namespaces);
    assert!(engine.render().is_err());
    h.fake.heal(ResourceKind::Namespaces);
    assert_eq!(engine.render().expect("render"), "1");
}

// ---------------------------------------------------------------------------
// 5. Helpers
// ---------------------------------------------------------------------------

#[rstest]
#[case(r#"{{ "MiXeD" | toLower }}"#, "mixed")]
#[case(r#"{{ "MiXeD" | toUpper }}"#, "MIXED")]
#[case(r#"{{ "hello world" | toTitle }}"#, "Hello World")]
#[case(r#"{{ "  padded  " | trimSpace }}"#, "padded")]
#[case(r#"{{ 7 | add(n=3) }}"#, "10")]
#[case(r#"{{ 7 | sub(n=3) }}"#, "4")]
#[case(r#"{{ 7 | mul(n=3) }}"#, "21")]
#[case(r#"{{ 7 | div(n=2) }}"#, "3")]
#[case(r#"{{ 7 | mod(n=3) }}"#, "1")]
#[case(r#"{{ pods() | length | add(n=1) }}"#, "2")]
fn helper_filters(#[case] source: &str, #[case] expected: &str) {
    let h = Harness::new(cluster());
    assert_eq!(h.render(source).expect("render"), expected);
}

#[test]
fn helper_on_wrong_type_is_a_render_error() {
    let h = Harness::new(cluster());
    assert!(h.render("{{ 3 | toUpper }}").is_err());
}
