mod auth;
mod chats;
mod gateway;
mod health;
mod messages;
mod users;

use axum::middleware as axum_mw;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Build the full application router. Consumes the state so middleware
/// layers that need `State<AppState>` (e.g. rate limiter) can be wired up.
pub fn router(state: AppState) -> Router {
    let api = api_routes(&state);

    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(crate::gateway::ws_upgrade))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Auth (register/login are public, logout requires auth)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/users/@me", get(users::get_current_user))
        // Chats
        .route("/chats", post(chats::create_chat).get(chats::list_chats))
        .route(
            "/chats/{chat_id}",
            get(chats::get_chat)
                .patch(chats::update_chat)
                .delete(chats::delete_chat),
        )
        .route("/chats/{chat_id}/members", post(chats::add_member))
        .route(
            "/chats/{chat_id}/members/{user_id}",
            delete(chats::remove_member),
        )
        .route("/chats/{chat_id}/leave", post(chats::leave_chat))
        // Messages
        .route(
            "/chats/{chat_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        // Gateway stats and build info
        .route("/gateway", get(gateway::get_gateway))
        .route("/version", get(health::version))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
}
