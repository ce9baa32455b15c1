//! Source of the ambient evaluation context and the merge of every context layer.
use crate::ContextSet;

/// Supplies the ambient context for the current call (e.g., the context attached to the request
/// being served).
///
/// Implemented for any `Fn() -> ContextSet`.
///
/// # Examples
/// ```
/// # use reforge::{Context, ContextSet, ContextProvider};
/// let provider = || ContextSet::from(Context::new("request").with("path", "/home"));
/// assert!(!provider.ambient_context().is_empty());
/// ```
pub trait ContextProvider {
    /// Return the ambient context. An empty set means there is none.
    fn ambient_context(&self) -> ContextSet;
}

/// Provider that never has an ambient context.
pub struct NoopContextProvider;

impl ContextProvider for NoopContextProvider {
    fn ambient_context(&self) -> ContextSet {
        ContextSet::new()
    }
}

impl<T: Fn() -> ContextSet> ContextProvider for T {
    fn ambient_context(&self) -> ContextSet {
        self()
    }
}

/// Merge every context layer into the set used for one evaluation.
///
/// Precedence, lowest to highest: server default, global, ambient, explicit.
pub(crate) fn merge_contexts(
    server_default: Option<&ContextSet>,
    global: &ContextSet,
    ambient: &ContextSet,
    explicit: &ContextSet,
) -> ContextSet {
    let mut merged = server_default.cloned().unwrap_or_default();
    merged.merge(global);
    merged.merge(ambient);
    merged.merge(explicit);
    merged
}
