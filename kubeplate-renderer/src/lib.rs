//! # kubeplate-renderer
//!
//! Tera-based template engine whose templates query the cluster through
//! functions named after resource kinds.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kubeplate_cluster::{ClusterClient, ResourceCache};
//! use kubeplate_renderer::{EngineSettings, FunctionTable, TemplateEngine};
//!
//! fn render(client: Arc<dyn ClusterClient>, runtime: tokio::runtime::Handle) {
//!     let functions = FunctionTable::new(Arc::new(ResourceCache::new(client)), runtime);
//!     let source = "{% for p in pods(selector=\"app=web\") %}{{ p.status.podIP }}\n{% endfor %}";
//!     if let Ok(engine) = TemplateEngine::compile("upstreams", source, &EngineSettings::default(), &functions) {
//!         if let Ok(text) = engine.render() {
//!             print!("{text}");
//!         }
//!     }
//! }
//! ```

pub mod delimiters;
pub mod engine;
pub mod error;
pub mod functions;

pub use engine::{EngineSettings, TemplateEngine};
pub use error::{FunctionError, RenderError};
pub use functions::FunctionTable;
