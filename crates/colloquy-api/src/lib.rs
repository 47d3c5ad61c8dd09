pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;

#[cfg(test)]
mod testing;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use auth::AppState;

/// REST routes. Everything but `/auth/*` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/conversations",
            get(conversations::list_channels).post(conversations::create),
        )
        .route("/conversations/{id}", get(conversations::get))
        .route(
            "/conversations/{id}/members",
            put(conversations::join).delete(conversations::leave),
        )
        .route(
            "/conversations/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/conversations/{id}/topic", put(conversations::update_topic))
        .route("/conversations/{id}/readed", post(conversations::mark_read))
        .route("/user/conversations", get(conversations::my_conversations))
        .route(
            "/user/conversations/private",
            get(conversations::my_private_conversations)
                .put(conversations::store_private_conversations),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
