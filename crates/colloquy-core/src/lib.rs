//! Message ingestion and the collaborators it is wired from.
//!
//! A submitted message flows through [`pipeline::MessagePipeline`]: forward
//! handlers short-circuit transient types, everything else is authorized,
//! persisted, announced on the [`bus::ClusterBus`] and finally handed to the
//! generic handlers in [`handlers::HandlerRegistry`].

pub mod bus;
pub mod conversations;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod store;
pub mod subscriptions;

#[cfg(test)]
mod testing;

pub use error::{BusError, ConversationError, HandlerError, PipelineError, StoreError};
