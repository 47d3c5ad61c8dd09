use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use colloquy_types::events::ClusterEvent;
use colloquy_types::models::IncomingEvent;

use super::ForwardHandler;
use crate::bus::ClusterBus;
use crate::error::HandlerError;

/// Relays "user is typing" signals straight to the cluster bus.
pub struct UserTypingForwarder {
    bus: Arc<dyn ClusterBus>,
}

impl UserTypingForwarder {
    pub fn new(bus: Arc<dyn ClusterBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ForwardHandler for UserTypingForwarder {
    async fn forward(&self, event: IncomingEvent) -> Result<(), HandlerError> {
        trace!(
            "{} typing in {}",
            event.message.creator, event.message.channel
        );
        self.bus.publish(ClusterEvent::UserTyping(event)).await?;
        Ok(())
    }
}
