//! Error → HTTP status mapping shared by the handlers.

use axum::http::StatusCode;
use tracing::error;

use colloquy_core::{ConversationError, PipelineError, StoreError};

pub fn store_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::DirectMessageImmutable => StatusCode::CONFLICT,
        StoreError::InvalidDirectMessage(_) => StatusCode::BAD_REQUEST,
        StoreError::Backend(e) => {
            error!("store failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn conversation_status(e: ConversationError) -> StatusCode {
    match e {
        ConversationError::NotFound(_) => StatusCode::NOT_FOUND,
        ConversationError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ConversationError::Store(e) => store_status(e),
    }
}

pub fn pipeline_status(e: PipelineError) -> StatusCode {
    match e {
        PipelineError::NoSuchUser(_) => StatusCode::UNAUTHORIZED,
        PipelineError::NoSuchConversation(_) => StatusCode::NOT_FOUND,
        PipelineError::WriteNotPermitted { .. } => StatusCode::FORBIDDEN,
        PipelineError::Store(e) => store_status(e),
        PipelineError::Publish(e) => {
            error!("publish failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
