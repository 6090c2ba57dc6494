//! Tera rendering engine — [`EngineSettings`] and [`TemplateEngine`].
//!
//! One engine holds exactly one compiled template. The template sees no
//! context variables: everything it renders comes from the function table.

use kubeplate_core::types::{DEFAULT_LEFT_DELIMITER, DEFAULT_RIGHT_DELIMITER};
use kubeplate_core::Config;
use tera::Tera;

use crate::delimiters::{self, Unterminated};
use crate::error::RenderError;
use crate::functions::FunctionTable;

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

/// Compilation settings shared by every template of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub left_delimiter: String,
    pub right_delimiter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            left_delimiter: DEFAULT_LEFT_DELIMITER.to_string(),
            right_delimiter: DEFAULT_RIGHT_DELIMITER.to_string(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            left_delimiter: config.left_delimiter.clone(),
            right_delimiter: config.right_delimiter.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

pub struct TemplateEngine {
    name: String,
    tera: Tera,
}

impl TemplateEngine {
    /// Compile `source` under `name`, binding `functions`.
    pub fn compile(
        name: &str,
        source: &str,
        settings: &EngineSettings,
        functions: &FunctionTable,
    ) -> Result<Self, RenderError> {
        let translated = delimiters::translate(source, &settings.left_delimiter, &settings.right_delimiter)
            .map_err(|Unterminated(offset)| RenderError::UnterminatedAction {
                name: name.to_string(),
                offset,
            })?;

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        functions.register(&mut tera);
        tera.add_raw_template(name, &translated)
            .map_err(|source| RenderError::Compile {
                name: name.to_string(),
                source,
            })?;

        Ok(TemplateEngine {
            name: name.to_string(),
            tera,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template. Blocks while template functions query the cluster.
    pub fn render(&self) -> Result<String, RenderError> {
        self.tera
            .render(&self.name, &tera::Context::new())
            .map_err(|source| RenderError::Render {
                name: self.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kubeplate_cluster::fake::{object, FakeClusterClient};
    use kubeplate_cluster::k8s_openapi::api::core::v1::Pod;
    use kubeplate_cluster::{ClusterClient, ResourceCache};

    use crate::error::FunctionError;

    fn table(runtime: &tokio::runtime::Runtime) -> FunctionTable {
        let fake = FakeClusterClient::new().with(vec![
            object::<Pod>("web-1", Some("default"), &[("app", "web")]),
            object::<Pod>("web-2", Some("default"), &[("app", "web")]),
        ]);
        let cache = ResourceCache::new(Arc::new(fake) as Arc<dyn ClusterClient>);
        FunctionTable::new(Arc::new(cache), runtime.handle().clone())
    }

    fn render(source: &str, settings: &EngineSettings) -> Result<String, RenderError> {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let engine = TemplateEngine::compile("test.tmpl", source, settings, &table(&runtime))?;
        engine.render()
    }

    #[test]
    fn output_is_not_html_escaped() {
        let out = render(r#"{{ "<a & b>" }}"#, &EngineSettings::default()).unwrap();
        assert_eq!(out, "<a & b>");
    }

    #[test]
    fn custom_delimiters_render() {
        let settings = EngineSettings {
            left_delimiter: "[[".to_string(),
            right_delimiter: "]]".to_string(),
        };
        let src = "{{literal}} [[% for p in pods() %]][[ p.metadata.name ]] [[% endfor %]]";
        assert_eq!(render(src, &settings).unwrap(), "{{literal}} web-1 web-2 ");
    }

    #[test]
    fn syntax_error_fails_compilation() {
        let err = render("{% if %}", &EngineSettings::default()).unwrap_err();
        assert!(matches!(err, RenderError::Compile { .. }), "got: {err}");
    }

    #[test]
    fn unterminated_custom_action_fails_compilation() {
        let settings = EngineSettings {
            left_delimiter: "<<".to_string(),
            right_delimiter: ">>".to_string(),
        };
        let err = render("a << pods()", &settings).unwrap_err();
        assert!(matches!(err, RenderError::UnterminatedAction { offset: 2, .. }), "got: {err}");
    }

    #[test]
    fn too_many_arguments_is_a_render_error() {
        let err = render(
            r#"{{ nodes(selector="", namespace="x") }}"#,
            &EngineSettings::default(),
        )
        .unwrap_err();
        assert!(
            matches!(err.function_error(), Some(FunctionError::TooManyArguments { .. })),
            "got: {err}"
        );
        assert!(err.to_string().contains("too many arguments"), "got: {err}");
    }
}
