use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use colloquy_core::store::can_read;
use colloquy_types::api::{Claims, StorePrivateConversationsRequest, UpdateTopicRequest};
use colloquy_types::models::{Conversation, ConversationType, NewConversation};

use crate::auth::AppState;
use crate::error::{conversation_status, store_status};

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    /// Comma separated member ids
    pub members: Option<String>,
    #[serde(default)]
    pub exact: bool,
}

/// Open channels, or confidential groups by members when `?members=` is given.
/// The caller is always part of the searched members.
pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    let Some(members) = query.members else {
        let channels = state
            .conversations
            .list_channels()
            .await
            .map_err(conversation_status)?;
        return Ok(Json(channels));
    };

    let mut members = members
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse::<Uuid>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    if !members.contains(&claims.sub) {
        members.push(claims.sub);
    }

    let groups = state
        .conversations
        .find_group_by_members(&members, query.exact)
        .await
        .map_err(conversation_status)?;
    Ok(Json(groups))
}

/// The caller always ends up a member of the conversation they create.
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<NewConversation>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.kind != ConversationType::Open && !req.members.contains(&claims.sub) {
        req.members.push(claims.sub);
    }

    let conversation = state
        .conversations
        .create(req)
        .await
        .map_err(conversation_status)?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Conversation>, StatusCode> {
    let conversation = state
        .conversations
        .get(id)
        .await
        .map_err(conversation_status)?;

    if !can_read(claims.sub, &conversation) {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(conversation))
}

pub async fn join(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    state
        .conversations
        .join(id, claims.sub)
        .await
        .map_err(conversation_status)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    state
        .conversations
        .leave(id, claims.sub)
        .await
        .map_err(conversation_status)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTopicRequest>,
) -> Result<Json<Conversation>, StatusCode> {
    let conversation = state
        .conversations
        .get(id)
        .await
        .map_err(conversation_status)?;
    if !can_read(claims.sub, &conversation) {
        return Err(StatusCode::FORBIDDEN);
    }

    let updated = state
        .conversations
        .update_topic(id, req.value, claims.sub)
        .await
        .map_err(conversation_status)?;
    Ok(Json(updated))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    state
        .conversations
        .mark_read(id, claims.sub)
        .await
        .map_err(conversation_status)?;
    debug!("{} read {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    let conversations = state
        .conversations
        .list_for_user(claims.sub)
        .await
        .map_err(conversation_status)?;
    Ok(Json(conversations))
}

/// Direct messages the caller follows, resolved to full conversations.
/// Ids whose conversation has gone away or that the caller can no longer
/// read are skipped.
pub async fn my_private_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    let record = state
        .private_conversations
        .get(claims.sub)
        .await
        .map_err(store_status)?;

    let mut conversations = Vec::with_capacity(record.conversations.len());
    for id in record.conversations {
        match state.conversations.get(id).await {
            Ok(c) if can_read(claims.sub, &c) => conversations.push(c),
            Ok(_) => debug!("Skipping unreadable private conversation {}", id),
            Err(colloquy_core::ConversationError::NotFound(_)) => {
                debug!("Skipping vanished private conversation {}", id);
            }
            Err(e) => return Err(conversation_status(e)),
        }
    }
    Ok(Json(conversations))
}

/// Only direct messages the caller belongs to are accepted. One bad id
/// rejects the whole request.
pub async fn store_private_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StorePrivateConversationsRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    for &id in &req.conversation_ids {
        let conversation = state
            .conversations
            .get(id)
            .await
            .map_err(conversation_status)?;
        if conversation.kind != ConversationType::DirectMessage
            || conversation.member(claims.sub).is_none()
        {
            return Err(StatusCode::FORBIDDEN);
        }
    }

    let record = state
        .private_conversations
        .store(claims.sub, &req.conversation_ids)
        .await
        .map_err(store_status)?;
    Ok(Json(record))
}
