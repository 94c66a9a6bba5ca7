use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::functions::Registry;

/// A failure that matching swallowed and treated as "no match".
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Raw text of the path segment being evaluated.
    pub segment: String,
    pub message: String,
}

pub type DiagnosticHook = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Evaluation knobs shared by every query on a tree.
#[derive(Clone)]
pub struct Context {
    registry: Registry,
    hook: Option<DiagnosticHook>,
}

impl Default for Context {
    fn default() -> Self {
        Self { registry: Registry::with_builtins(), hook: None }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Context {
    pub fn new(registry: Registry) -> Self {
        Self { registry, hook: None }
    }

    /// Calls `hook` for every formula or operation failure.
    pub fn on_diagnostic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn report(&self, segment: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic { segment: segment.to_string(), message: message.into() };
        tracing::debug!(segment = %diagnostic.segment, "suppressed: {}", diagnostic.message);
        if let Some(hook) = &self.hook {
            hook(&diagnostic);
        }
    }
}
