//! Template units — one compiled template bound to its descriptor.
//!
//! ## `process` outcomes
//!
//! | render | vs last output | dry-run | effect                                   |
//! |--------|----------------|---------|------------------------------------------|
//! | error  | —              | —       | error, state untouched                   |
//! | ok     | equal          | —       | `Unchanged`                              |
//! | ok     | different      | yes     | `Changed`, last output advanced, no write |
//! | ok     | different      | no      | write; on success `Changed` and advance, on failure error and no advance |

use std::path::Path;

use kubeplate_core::TemplateDescriptor;
use kubeplate_renderer::{EngineSettings, FunctionTable, TemplateEngine};

use crate::error::SyncError;
use crate::writer::atomic_write;

/// Result of one successful [`TemplateUnit::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Unchanged,
    /// The rendered output differs from the last output; `content` is the new text.
    Changed { content: String },
}

impl Processed {
    pub fn changed(&self) -> bool {
        matches!(self, Processed::Changed { .. })
    }
}

pub struct TemplateUnit {
    descriptor: TemplateDescriptor,
    engine: TemplateEngine,
    last_output: String,
}

impl TemplateUnit {
    /// Read and compile the template source, and load the current output file
    /// as the last output (empty when missing or unreadable).
    pub fn new(
        descriptor: TemplateDescriptor,
        settings: &EngineSettings,
        functions: &FunctionTable,
    ) -> Result<Self, SyncError> {
        let source = std::fs::read_to_string(&descriptor.source).map_err(|source| {
            SyncError::ReadTemplate {
                path: descriptor.source.clone(),
                source,
            }
        })?;
        let name = template_name(&descriptor.source);
        let engine = TemplateEngine::compile(&name, &source, settings, functions)?;
        let last_output = read_existing_output(&descriptor.output);

        tracing::debug!(template = %name, output = %descriptor.output.display(), "template loaded");
        Ok(TemplateUnit {
            descriptor,
            engine,
            last_output,
        })
    }

    /// Base file name of the template source.
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn descriptor(&self) -> &TemplateDescriptor {
        &self.descriptor
    }

    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    /// Render without touching any state.
    pub fn render(&self) -> Result<String, SyncError> {
        Ok(self.engine.render()?)
    }

    /// Render, compare with the last output, and persist a change unless `dry_run`.
    pub fn process(&mut self, dry_run: bool) -> Result<Processed, SyncError> {
        let content = self.render()?;
        if content == self.last_output {
            tracing::debug!(template = %self.name(), "not changed");
            return Ok(Processed::Unchanged);
        }

        if !dry_run {
            atomic_write(&self.descriptor.output, &content)?;
            tracing::info!(
                template = %self.name(),
                output = %self.descriptor.output.display(),
                "output updated"
            );
        }
        self.last_output.clone_from(&content);
        Ok(Processed::Changed { content })
    }
}

fn template_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}

fn read_existing_output(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "can't read existing output, treating as empty");
            String::new()
        }
    }
}
