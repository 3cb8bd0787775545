use std::collections::HashSet;

use crate::ComponentKey;

/// Type alias for boxed errors that can be sent across threads.
///
/// Construction recipes, field setters and injectable methods report their
/// failures with this type.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while binding, finalizing or resolving components.
///
/// Every variant carries the offending keys so callers can inspect failures
/// without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A binder call violated its contract: illegitimate qualifier, several
    /// scopes, or an unregistered scope.
    #[error("illegal binding for {key}: {reason}")]
    IllegalBinding { key: ComponentKey, reason: String },

    /// The injection metadata of a component type is unusable.
    #[error("illegal component {component}: {reason}")]
    IllegalComponent {
        component: ComponentKey,
        reason: String,
    },

    /// A declared dependency has no binding.
    #[error("dependency {dependency} of {component} not found")]
    DependencyNotFound {
        component: ComponentKey,
        dependency: ComponentKey,
    },

    /// Components depend on each other through direct edges.
    #[error("cyclic dependencies found between {}", format_keys(.components))]
    CyclicDependency { components: HashSet<ComponentKey> },

    /// Constructing or populating a component failed.
    #[error("failed to construct {component}: {source}")]
    Construction {
        component: ComponentKey,
        #[source]
        source: StdError,
    },

    /// A lazy handle was invoked after its context was dropped.
    #[error("context of lazy {component} was dropped")]
    ContextDropped { component: ComponentKey },

    /// A provider produced a value of another type than the one requested.
    #[error("component {component} is not a {expected}")]
    TypeMismatch {
        component: ComponentKey,
        expected: &'static str,
    },
}

fn format_keys(keys: &HashSet<ComponentKey>) -> String {
    let mut names: Vec<_> = keys.iter().map(ToString::to_string).collect();
    names.sort();
    names.join(", ")
}
