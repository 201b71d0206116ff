//! Provider registry.

use crate::{
    Backend, BackendError, BackendKind, BoxedBackend, CodexBackend, CommandRunner, GeminiBackend,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps provider tags to adapters.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, BoxedBackend>,
    default: BackendKind,
}

impl BackendRegistry {
    pub fn new(default: BackendKind) -> Self {
        Self {
            backends: HashMap::new(),
            default,
        }
    }

    /// Registry with both built-in adapters sharing one runner.
    pub fn with_defaults(runner: Arc<dyn CommandRunner>, default: BackendKind) -> Self {
        let mut registry = Self::new(default);
        registry.register(Arc::new(GeminiBackend::new(runner.clone())));
        registry.register(Arc::new(CodexBackend::new(runner)));
        registry
    }

    /// Add or replace the adapter for its kind.
    pub fn register(&mut self, backend: BoxedBackend) {
        let kind = backend.kind();
        debug!(provider = %kind, "Registering backend");
        self.backends.insert(kind, backend);
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.backends.contains_key(k))
            .collect()
    }

    /// The adapter for `kind`, without checking availability.
    pub fn lookup(&self, kind: BackendKind) -> Option<BoxedBackend> {
        self.backends.get(&kind).cloned()
    }

    /// The adapter for `kind`, provided its CLI is installed.
    pub async fn get(&self, kind: BackendKind) -> Result<BoxedBackend> {
        let backend = self
            .lookup(kind)
            .ok_or_else(|| BackendError::UnknownProvider(kind.to_string()))?;
        if !backend.is_available().await {
            warn!(provider = %kind, "Backend binary not found");
            return Err(BackendError::NotAvailable(kind.to_string()));
        }
        Ok(backend)
    }

    /// Resolve an optional provider tag, falling back to the default.
    pub async fn resolve(&self, tag: Option<&str>) -> Result<BoxedBackend> {
        let kind = match tag {
            Some(tag) => tag.parse()?,
            None => self.default,
        };
        self.get(kind).await
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .field("default", &self.default)
            .finish()
    }
}
