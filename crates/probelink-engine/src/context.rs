//! Execution context passed into every invocation
//!
//! The context is an explicit object constructed once per agent and passed
//! by reference into [`ScriptEngine::execute`](crate::ScriptEngine::execute),
//! never ambient global state. Bindings mirror host-managed named entities
//! and are refreshed by an explicit [`rescan`](ExecutionContext::rescan).

use std::collections::BTreeMap;

/// Host-environment collaborator surface: enumerates named entities the
/// context should expose to executed snippets.
pub trait ContextProvider: Send {
    /// Produce the current set of (name, value) bindings. Names are
    /// sanitized before insertion.
    fn scan(&self) -> Vec<(String, i64)>;
}

/// Name-to-value environment injected into executed snippets.
///
/// Bindings are kept ordered so template rendering is deterministic for a
/// given binding set.
#[derive(Default)]
pub struct ExecutionContext {
    bindings: BTreeMap<String, i64>,
    provider: Option<Box<dyn ContextProvider>>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("bindings", &self.bindings)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl ExecutionContext {
    /// Create an empty context with no provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that refreshes its bindings from `provider` on
    /// [`rescan`](ExecutionContext::rescan)
    pub fn with_provider(provider: Box<dyn ContextProvider>) -> Self {
        Self {
            bindings: BTreeMap::new(),
            provider: Some(provider),
        }
    }

    /// Insert or overwrite a binding. The name is sanitized to a safe
    /// identifier form.
    pub fn bind(&mut self, name: impl AsRef<str>, value: i64) {
        self.bindings.insert(sanitize_name(name.as_ref()), value);
    }

    /// Look up a binding by (sanitized) name
    pub fn get(&self, name: &str) -> Option<i64> {
        self.bindings.get(&sanitize_name(name)).copied()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the context has no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterate bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.bindings.iter()
    }

    /// Re-enumerate host entities through the provider, inserting or
    /// updating bindings. Bindings absent from the scan are kept; the scan
    /// supplements, it does not replace.
    pub fn rescan(&mut self) {
        if let Some(provider) = &self.provider {
            for (name, value) in provider.scan() {
                self.bindings.insert(sanitize_name(&name), value);
            }
        }
    }
}

/// Replace characters outside `[A-Za-z0-9_]` with underscores so binding
/// names are valid snippet identifiers.
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Vec<(String, i64)>);

    impl ContextProvider for FixedProvider {
        fn scan(&self) -> Vec<(String, i64)> {
            self.0.clone()
        }
    }

    #[test]
    fn test_bind_and_get() {
        let mut ctx = ExecutionContext::new();
        ctx.bind("score", 7);
        assert_eq!(ctx.get("score"), Some(7));
        assert_eq!(ctx.get("missing"), None);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_name_sanitization() {
        let mut ctx = ExecutionContext::new();
        ctx.bind("Main Camera", 1);
        ctx.bind("player-2", 2);
        assert_eq!(ctx.get("Main_Camera"), Some(1));
        assert_eq!(ctx.get("player_2"), Some(2));
    }

    #[test]
    fn test_rescan_supplements_bindings() {
        let provider = FixedProvider(vec![("pid".to_string(), 42)]);
        let mut ctx = ExecutionContext::with_provider(Box::new(provider));
        ctx.bind("manual", 1);
        assert_eq!(ctx.get("pid"), None);

        ctx.rescan();
        assert_eq!(ctx.get("pid"), Some(42));
        // Manual bindings survive the rescan.
        assert_eq!(ctx.get("manual"), Some(1));
    }

    #[test]
    fn test_rescan_without_provider_is_noop() {
        let mut ctx = ExecutionContext::new();
        ctx.bind("x", 1);
        ctx.rescan();
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_deterministic_iteration_order() {
        let mut ctx = ExecutionContext::new();
        ctx.bind("b", 2);
        ctx.bind("a", 1);
        let names: Vec<&String> = ctx.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
