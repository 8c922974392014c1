//! Channel handlers and their registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, WorkerError};
use crate::task::Task;

/// Delivers tasks for one channel.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Channel this handler serves; the registry key.
    fn name(&self) -> &'static str;

    /// Deliver one task.
    async fn execute(&self, task: &Task) -> Result<()>;
}

/// Handlers keyed by channel name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its [`name`](Handler::name), replacing any
    /// handler already registered for that channel.
    #[must_use]
    pub fn with(mut self, handler: impl Handler) -> Self {
        self.register(Arc::new(handler));
        self
    }

    /// Register a shared handler.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        let name = handler.name();
        if self.handlers.insert(name, handler).is_some() {
            tracing::warn!(channel = name, "replacing registered handler");
        }
    }

    /// Handler for `channel`.
    pub fn get(&self, channel: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(channel)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownChannel(channel.to_string()))
    }

    /// Registered channel names, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
