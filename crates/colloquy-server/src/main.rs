mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use colloquy_api::auth::{AppState, AppStateInner};
use colloquy_api::middleware::decode_token;
use colloquy_core::bus::{ClusterBus, LocalQueue, MemoryBus, Submitter};
use colloquy_core::conversations::ConversationService;
use colloquy_core::handlers::{
    HandlerRegistry, LastMessageTracker, MentionCounter, MentionsNotifier, UserTypingForwarder,
};
use colloquy_core::pipeline::{Collaborators, MessagePipeline};
use colloquy_core::subscriptions::PrivateConversationIndex;
use colloquy_db::{Database, SqliteStore};
use colloquy_gateway::connection::{self, ConnectionContext};
use colloquy_gateway::dispatcher::Dispatcher;
use colloquy_gateway::fanout::FanOut;
use colloquy_types::topics::USER_TYPING_TYPE;

use crate::config::ServerConfig;

#[derive(Clone)]
struct GatewayState {
    ctx: ConnectionContext,
    jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if config.uses_dev_secret() {
        warn!("COLLOQUY_JWT_SECRET is not set, using the development secret");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let store = SqliteStore::new(db.clone());
    let shared = Arc::new(store.clone());

    // Topic bus
    let bus: Arc<dyn ClusterBus> = Arc::new(MemoryBus::with_capacity(config.bus_capacity));
    let (local, local_rx) = LocalQueue::channel();

    // Handlers
    let mut handlers = HandlerRegistry::new();
    handlers.add_forward_handler(USER_TYPING_TYPE, UserTypingForwarder::new(bus.clone()));
    handlers.add_handler(MentionsNotifier::new(bus.clone(), shared.clone()));
    handlers.add_handler(MentionCounter::new(shared.clone()));
    handlers.add_handler(LastMessageTracker::new(shared.clone()));

    let pipeline = Arc::new(MessagePipeline::new(
        Collaborators {
            users: shared.clone(),
            conversations: shared.clone(),
            messages: shared.clone(),
            subscriptions: shared.clone(),
            bus: bus.clone(),
        },
        handlers,
    ));
    pipeline.clone().spawn(local_rx);

    // Gateway
    let dispatcher = Dispatcher::new(config.namespace.clone(), bus.clone());
    FanOut::new(dispatcher.clone(), shared.clone()).spawn(bus.as_ref());

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        conversations: ConversationService::new(shared.clone(), bus.clone()),
        private_conversations: PrivateConversationIndex::new(shared),
        pipeline,
        store,
        jwt_secret: config.jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        ctx: ConnectionContext {
            dispatcher,
            submitter: Submitter::new(local, bus),
            heartbeat: config.heartbeat,
        },
        jwt_secret: config.jwt_secret.clone(),
    };

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = Router::new()
        .merge(colloquy_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!(
        "Colloquy server listening on {} (namespace {})",
        addr, config.namespace
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The JWT is validated before the upgrade; connections never identify
/// themselves over the socket.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims = decode_token(&state.jwt_secret, &query.token).ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.ctx, claims.sub)
    }))
}
