//! The template function table.
//!
//! # Resource functions
//!
//! Every [`ResourceKind`] is callable under its name. Arguments are optional
//! and count positionally:
//!
//! | call                                         | selector  | namespace  |
//! |----------------------------------------------|-----------|------------|
//! | `pods()`                                     | empty     | `default`  |
//! | `pods(selector="app=web")`                   | `app=web` | `default`  |
//! | `pods(selector="app=web", namespace="prod")` | `app=web` | `prod`     |
//! | `pods(selector="", namespace="")`            | empty     | all        |
//! | `nodes(selector="role=edge")`                | `role=edge` | —        |
//!
//! Namespaced kinds take at most two arguments, cluster-scoped kinds one.
//!
//! # Helpers
//!
//! Filters `toLower`, `toUpper`, `toTitle`, `trimSpace`, and the arithmetic
//! filters `add`, `sub`, `mul`, `div`, `mod` (operand in `n`), on top of
//! tera's built-ins.

use std::collections::HashMap;
use std::sync::Arc;

use kubeplate_cluster::{ResourceCache, ResourceKind, ResourceQuery, Scope};
use tera::{Tera, Value};
use tokio::runtime::Handle;

use crate::error::FunctionError;

const SELECTOR_ARG: &str = "selector";
const NAMESPACE_ARG: &str = "namespace";

/// Binds template functions to one [`ResourceCache`].
///
/// Functions run on the rendering thread and block on `runtime` for cluster
/// lookups, so rendering must happen outside async context (for example in
/// `spawn_blocking`).
#[derive(Clone)]
pub struct FunctionTable {
    cache: Arc<ResourceCache>,
    runtime: Handle,
}

impl FunctionTable {
    pub fn new(cache: Arc<ResourceCache>, runtime: Handle) -> Self {
        Self { cache, runtime }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub(crate) fn register(&self, tera: &mut Tera) {
        for kind in ResourceKind::ALL {
            tera.register_function(
                kind.name(),
                KindFunction {
                    kind: *kind,
                    cache: Arc::clone(&self.cache),
                    runtime: self.runtime.clone(),
                },
            );
        }
        register_helpers(tera);
    }
}

// ---------------------------------------------------------------------------
// 1. Resource functions
// ---------------------------------------------------------------------------

struct KindFunction {
    kind: ResourceKind,
    cache: Arc<ResourceCache>,
    runtime: Handle,
}

impl KindFunction {
    fn query(&self, args: &HashMap<String, Value>) -> Result<ResourceQuery, FunctionError> {
        query_for(self.kind, args)
    }

    fn lookup(&self, args: &HashMap<String, Value>) -> Result<Value, FunctionError> {
        let function = self.kind.name();
        let query = self.query(args)?;
        tracing::trace!(%query, "template function lookup");
        let list = self
            .runtime
            .block_on(self.cache.list(&query))
            .map_err(|source| FunctionError::Query { function, source })?;
        list.to_value()
            .map_err(|source| FunctionError::Encode { function, source })
    }
}

impl tera::Function for KindFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        self.lookup(args)
            .map_err(|err| tera::Error::chain(err.to_string(), err))
    }
}

/// Map named arguments onto `(selector, namespace)` for `kind`.
pub(crate) fn query_for(
    kind: ResourceKind,
    args: &HashMap<String, Value>,
) -> Result<ResourceQuery, FunctionError> {
    let function = kind.name();
    let (max, accepted) = match kind.scope() {
        Scope::Namespaced => (2, "'selector' and 'namespace'"),
        Scope::Cluster => (1, "'selector'"),
    };
    if args.len() > max {
        return Err(FunctionError::TooManyArguments {
            function,
            max,
            given: args.len(),
        });
    }

    let mut selector = None;
    let mut namespace = None;
    for (name, value) in args {
        let slot = match name.as_str() {
            SELECTOR_ARG => &mut selector,
            NAMESPACE_ARG if kind.scope() == Scope::Namespaced => &mut namespace,
            _ => {
                return Err(FunctionError::UnexpectedArgument {
                    function,
                    name: name.clone(),
                    accepted,
                })
            }
        };
        let Some(text) = value.as_str() else {
            return Err(FunctionError::InvalidArgument {
                function,
                name: name.clone(),
            });
        };
        *slot = Some(text);
    }

    Ok(ResourceQuery::new(kind, namespace, selector.unwrap_or_default()))
}

// ---------------------------------------------------------------------------
// 2. Helper filters
// ---------------------------------------------------------------------------

fn register_helpers(tera: &mut Tera) {
    tera.register_filter("toLower", string_filter("toLower", |s| s.to_lowercase()));
    tera.register_filter("toUpper", string_filter("toUpper", |s| s.to_uppercase()));
    tera.register_filter("toTitle", string_filter("toTitle", title_case));
    tera.register_filter("trimSpace", string_filter("trimSpace", |s| s.trim().to_string()));

    tera.register_filter("add", arithmetic_filter("add", Arith::Add));
    tera.register_filter("sub", arithmetic_filter("sub", Arith::Sub));
    tera.register_filter("mul", arithmetic_filter("mul", Arith::Mul));
    tera.register_filter("div", arithmetic_filter("div", Arith::Div));
    tera.register_filter("mod", arithmetic_filter("mod", Arith::Mod));
}

fn string_filter(
    name: &'static str,
    f: impl Fn(&str) -> String + Send + Sync + 'static,
) -> impl tera::Filter {
    move |value: &Value, _: &HashMap<String, Value>| match value.as_str() {
        Some(s) => Ok(Value::String(f(s))),
        None => Err(tera::Error::msg(format!("filter `{name}` expects a string, got {value}"))),
    }
}

/// Upper-cases the first letter of every word, leaving the rest alone.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric() && c != '\'';
    }
    out
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn arithmetic_filter(name: &'static str, op: Arith) -> impl tera::Filter {
    move |value: &Value, args: &HashMap<String, Value>| {
        let operand = args
            .get("n")
            .ok_or_else(|| tera::Error::msg(format!("filter `{name}` expects argument `n`")))?;
        apply(op, value, operand).map_err(|reason| tera::Error::msg(format!("filter `{name}`: {reason}")))
    }
}

fn apply(op: Arith, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        let result = match op {
            Arith::Add => a.checked_add(b),
            Arith::Sub => a.checked_sub(b),
            Arith::Mul => a.checked_mul(b),
            Arith::Div | Arith::Mod if b == 0 => return Err("division by zero".to_string()),
            Arith::Div => a.checked_div(b),
            Arith::Mod => a.checked_rem(b),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| "integer overflow".to_string());
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(format!("expected numbers, got {lhs} and {rhs}"));
    };
    let result = match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div | Arith::Mod if b == 0.0 => return Err("division by zero".to_string()),
        Arith::Div => a / b,
        Arith::Mod => a % b,
    };
    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| format!("result {result} is not a finite number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn zero_arguments_use_defaults() {
        let q = query_for(ResourceKind::Pods, &args(&[])).unwrap();
        assert_eq!(q.cache_key(), "pods(default,)");
    }

    #[test]
    fn selector_then_namespace() {
        let q = query_for(
            ResourceKind::Services,
            &args(&[("selector", json!("app=web")), ("namespace", json!("prod"))]),
        )
        .unwrap();
        assert_eq!(q.cache_key(), "services(prod,app=web)");
    }

    #[test]
    fn namespaced_kind_rejects_a_third_argument() {
        let err = query_for(
            ResourceKind::Pods,
            &args(&[
                ("selector", json!("")),
                ("namespace", json!("")),
                ("extra", json!("")),
            ]),
        )
        .unwrap_err();
        assert!(
            matches!(err, FunctionError::TooManyArguments { max: 2, given: 3, .. }),
            "got: {err}"
        );
    }

    #[test]
    fn cluster_kind_rejects_a_second_argument() {
        let err = query_for(
            ResourceKind::Nodes,
            &args(&[("selector", json!("")), ("namespace", json!("x"))]),
        )
        .unwrap_err();
        assert!(matches!(err, FunctionError::TooManyArguments { max: 1, .. }), "got: {err}");

        let err = query_for(ResourceKind::Nodes, &args(&[("namespace", json!("x"))])).unwrap_err();
        assert!(matches!(err, FunctionError::UnexpectedArgument { .. }), "got: {err}");
    }

    #[test]
    fn non_string_argument_is_rejected() {
        let err = query_for(ResourceKind::Pods, &args(&[("selector", json!(3))])).unwrap_err();
        assert!(matches!(err, FunctionError::InvalidArgument { .. }), "got: {err}");
    }

    #[test]
    fn title_case_matches_word_starts() {
        assert_eq!(title_case("hello wORLD-wide web"), "Hello WORLD-Wide Web");
        assert_eq!(title_case("don't stop"), "Don't Stop");
    }

    #[test]
    fn integer_and_float_arithmetic() {
        assert_eq!(apply(Arith::Add, &json!(2), &json!(3)).unwrap(), json!(5));
        assert_eq!(apply(Arith::Mod, &json!(7), &json!(3)).unwrap(), json!(1));
        assert_eq!(apply(Arith::Div, &json!(1.0), &json!(4)).unwrap(), json!(0.25));
        assert!(apply(Arith::Div, &json!(1), &json!(0)).is_err());
        assert!(apply(Arith::Sub, &json!("a"), &json!(1)).is_err());
    }
}
