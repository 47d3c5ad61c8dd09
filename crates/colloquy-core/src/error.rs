use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("direct message membership is fixed at creation")]
    DirectMessageImmutable,

    #[error("a direct message needs exactly two distinct members, got {0}")]
    InvalidDirectMessage(usize),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("local queue closed")]
    LocalClosed,

    #[error("bus transport failure: {0}")]
    Transport(String),
}

/// Raised by a message handler. Always caught at the dispatch boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{0}")]
    Failed(String),

    #[error("handler panicked")]
    Panicked,
}

/// Terminal failures of the ingestion pipeline. None of them are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No such user {0}")]
    NoSuchUser(Uuid),

    #[error("No such conversation {0}")]
    NoSuchConversation(Uuid),

    #[error("User {user} can not write message in the conversation {conversation}")]
    WriteNotPermitted { user: Uuid, conversation: Uuid },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("publish failure: {0}")]
    Publish(#[from] BusError),
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("No such conversation {0}")]
    NotFound(Uuid),

    #[error("User {user} is not allowed into conversation {conversation}")]
    Forbidden { user: Uuid, conversation: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}
