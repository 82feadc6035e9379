//! Message handler capability and the message-type registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::context::MessageContext;

/// Handles one message type (capability interface).
///
/// A handler is plugin code registered against a message-type string. It
/// signals failure in one of two ways:
///
/// - **Returning an error**: any `anyhow::Error`; the processor logs it and
///   reschedules the message.
/// - **Marking the context failed**: `ctx.fail_with(status, detail)` then
///   returning `Ok(())`; treated exactly like an error, but carries a status
///   code into the message's `lastError`.
///
/// Both paths are retried up to the message's attempt budget regardless of the
/// status code recorded; there is no fast path to the dead-letter store.
///
/// ## Thread Safety
///
/// Handlers are shared across concurrent deliveries (`Send + Sync`). Each call
/// gets its own `MessageContext`, so per-message state never needs locking.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &mut MessageContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<H> MessageHandler for Arc<H>
where
    H: MessageHandler + ?Sized,
{
    async fn handle(&self, ctx: &mut MessageContext) -> anyhow::Result<()> {
        (**self).handle(ctx).await
    }
}

/// Adapter turning a synchronous closure into a [`MessageHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> core::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Build a handler from a closure.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut MessageContext) -> anyhow::Result<()> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&mut MessageContext) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut MessageContext) -> anyhow::Result<()> {
        (self.f)(ctx)
    }
}

/// Message-type name -> handler mapping.
///
/// Registration replaces any previous handler for the same name (last write
/// wins). Lookups clone the `Arc`, so a handler replaced mid-flight keeps
/// serving the deliveries that already resolved it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the handler for `message_type`.
    pub fn register<H>(&self, message_type: impl Into<String>, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.register_arc(message_type, Arc::new(handler));
    }

    pub fn register_arc(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let message_type = message_type.into();
        tracing::debug!(message_type = %message_type, "registering message handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message_type, handler);
    }

    pub fn get(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(message_type)
            .cloned()
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(message_type)
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
