//! Router harness for the handler tests: an in-memory database behind the
//! real pipeline and a memory bus.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, header};
use uuid::Uuid;

use colloquy_core::bus::MemoryBus;
use colloquy_core::conversations::ConversationService;
use colloquy_core::handlers::HandlerRegistry;
use colloquy_core::pipeline::{Collaborators, MessagePipeline};
use colloquy_core::subscriptions::PrivateConversationIndex;
use colloquy_db::{Database, SqliteStore};
use colloquy_types::models::{ConversationType, NewConversation};

use crate::auth::{AppState, AppStateInner, create_token};

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub state: AppState,
    pub bus: Arc<MemoryBus>,
}

pub fn app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = SqliteStore::new(db.clone());
    let shared = Arc::new(store.clone());
    let bus = Arc::new(MemoryBus::new());

    let pipeline = MessagePipeline::new(
        Collaborators {
            users: shared.clone(),
            conversations: shared.clone(),
            messages: shared.clone(),
            subscriptions: shared.clone(),
            bus: bus.clone(),
        },
        HandlerRegistry::new(),
    );

    let state = Arc::new(AppStateInner {
        db,
        conversations: ConversationService::new(shared.clone(), bus.clone()),
        private_conversations: PrivateConversationIndex::new(shared),
        pipeline: Arc::new(pipeline),
        store,
        jwt_secret: SECRET.into(),
    });
    TestApp { state, bus }
}

/// A registered user and a bearer token for them.
pub fn user(app: &TestApp, name: &str) -> (Uuid, String) {
    let id = Uuid::new_v4();
    app.state
        .db
        .create_user(&id.to_string(), name, "hash")
        .unwrap();
    (id, create_token(SECRET, id, name).unwrap())
}

pub async fn conversation(app: &TestApp, kind: ConversationType, members: Vec<Uuid>) -> Uuid {
    app.state
        .conversations
        .create(NewConversation {
            kind,
            name: None,
            members,
        })
        .await
        .unwrap()
        .id
}

pub fn request(method: &str, uri: &str, token: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn post(id: Uuid, token: &str, body: &str) -> Request<Body> {
    request(
        "POST",
        &format!("/conversations/{}/messages", id),
        token,
        Some(body),
    )
}
