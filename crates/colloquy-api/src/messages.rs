use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use colloquy_core::pipeline::Ingested;
use colloquy_core::store::{MessageStore, can_read};
use colloquy_types::api::{Claims, SendMessageRequest};
use colloquy_types::models::{IncomingEvent, IncomingMessage, StoredMessage};

use crate::auth::AppState;
use crate::error::{conversation_status, pipeline_status, store_status};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<StoredMessage>>, StatusCode> {
    let conversation = state
        .conversations
        .get(id)
        .await
        .map_err(conversation_status)?;
    if !can_read(claims.sub, &conversation) {
        return Err(StatusCode::FORBIDDEN);
    }

    let messages = MessageStore::list(&state.store, id, query.limit.min(200), query.offset)
        .await
        .map_err(store_status)?;
    Ok(Json(messages))
}

/// Runs the message through the ingestion pipeline and answers with the stored
/// form. Forwarded types are not stored and answer `202 Accepted`.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, StatusCode> {
    let event = IncomingEvent {
        room: None,
        message: IncomingMessage {
            kind: req.kind,
            subtype: req.subtype,
            channel: id,
            creator: claims.sub,
            text: req.text,
            date: Utc::now(),
            attachments: req.attachments,
            user_mentions: req.user_mentions,
            extra: Default::default(),
        },
    };

    match state
        .pipeline
        .handle_incoming(event)
        .await
        .map_err(pipeline_status)?
    {
        Ingested::Stored(message) => Ok((StatusCode::CREATED, Json(message)).into_response()),
        Ingested::Forwarded => Ok(StatusCode::ACCEPTED.into_response()),
    }
}
