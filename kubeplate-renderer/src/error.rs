//! Error types for kubeplate-renderer.

use std::error::Error as StdError;

use kubeplate_cluster::ClusterError;
use thiserror::Error;

/// Errors from compiling or rendering one template.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The configured delimiters open an action that is never closed.
    #[error("template '{name}': unterminated action starting at byte {offset}")]
    UnterminatedAction { name: String, offset: usize },

    /// Template syntax error.
    #[error("failed to compile template '{name}': {}", chain(.source))]
    Compile {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// Evaluation failed, including any failure raised by a template function.
    #[error("failed to render template '{name}': {}", chain(.source))]
    Render {
        name: String,
        #[source]
        source: tera::Error,
    },
}

impl RenderError {
    /// The template-function failure behind this error, if one caused it.
    pub fn function_error(&self) -> Option<&FunctionError> {
        let mut current: Option<&(dyn StdError + 'static)> = match self {
            RenderError::Render { source, .. } => Some(source),
            _ => None,
        };
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<FunctionError>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }
}

/// Failures raised inside a resource-kind template function. They abort the
/// render of the calling template only.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("{function}: too many arguments, accepts at most {max} but got {given}")]
    TooManyArguments {
        function: &'static str,
        max: usize,
        given: usize,
    },

    #[error("{function}: unexpected argument '{name}', accepts {accepted}")]
    UnexpectedArgument {
        function: &'static str,
        name: String,
        accepted: &'static str,
    },

    #[error("{function}: argument '{name}' must be a string")]
    InvalidArgument { function: &'static str, name: String },

    #[error("{function}: {source}")]
    Query {
        function: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error("{function}: couldn't convert result: {source}")]
    Encode {
        function: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// `outer: inner: innermost`. Tera nests the useful message a few sources
/// deep; a source repeating its parent's message is skipped.
fn chain(err: &tera::Error) -> String {
    let mut previous = err.to_string();
    let mut message = previous.clone();
    let mut current = err.source();
    while let Some(inner) = current {
        let text = inner.to_string();
        if text != previous {
            message.push_str(": ");
            message.push_str(&text);
        }
        previous = text;
        current = inner.source();
    }
    message
}
