//! Side effects attached to the ingestion pipeline.
//!
//! Two kinds of handlers are registered at startup:
//!
//! - forward handlers, keyed by message type, take over transient messages
//!   (typing signals and the like) that must never be stored;
//! - generic handlers run for every stored message, in registration order,
//!   each isolated from the failures of the others.

mod mentions;
mod summary;
mod typing;

pub use mentions::MentionsNotifier;
pub use summary::{LastMessageTracker, MentionCounter};
pub use typing::UserTypingForwarder;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, warn};

use colloquy_types::models::IncomingEvent;

use crate::error::HandlerError;

/// Runs after a message has been stored and announced.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &IncomingEvent) -> Result<(), HandlerError>;
}

/// Takes over a message type entirely: no authorization, no persistence.
#[async_trait]
pub trait ForwardHandler: Send + Sync {
    async fn forward(&self, event: IncomingEvent) -> Result<(), HandlerError>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    forward: HashMap<String, Arc<dyn ForwardHandler>>,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the forward handler for `kind`. Last writer wins: an existing
    /// registration is replaced and returned.
    pub fn add_forward_handler<H>(
        &mut self,
        kind: impl Into<String>,
        handler: H,
    ) -> Option<Arc<dyn ForwardHandler>>
    where
        H: ForwardHandler + 'static,
    {
        let kind = kind.into();
        let previous = self.forward.insert(kind.clone(), Arc::new(handler));
        if previous.is_some() {
            debug!("Forward handler for '{}' replaced", kind);
        }
        previous
    }

    /// Appends a generic handler. No de-duplication.
    pub fn add_handler<H>(&mut self, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn forward_handler(&self, kind: &str) -> Option<Arc<dyn ForwardHandler>> {
        self.forward.get(kind).cloned()
    }

    pub fn is_forwardable(&self, kind: &str) -> bool {
        self.forward.contains_key(kind)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs every generic handler with `event`. Errors and panics are logged
    /// and never stop the remaining handlers. Returns the number of failures.
    pub async fn dispatch(&self, event: &IncomingEvent) -> usize {
        let mut failures = 0;

        for handler in &self.handlers {
            let outcome = AssertUnwindSafe(handler.handle(event))
                .catch_unwind()
                .await
                .unwrap_or(Err(HandlerError::Panicked));

            if let Err(e) = outcome {
                failures += 1;
                warn!(
                    "Message handler '{}' failed on message in {}: {}",
                    handler.name(),
                    event.message.channel,
                    e
                );
            }
        }

        failures
    }
}
