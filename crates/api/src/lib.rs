pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Chat routes; path segments follow the platform's Portuguese API.
    let chat_routes = Router::new()
        .route("/", get(routes::chat::list))
        .route("/", post(routes::chat::create))
        .route("/geral", get(routes::chat::general))
        .route("/privado/{user_id}", get(routes::chat::private))
        .route("/{chat_id}", get(routes::chat::get))
        .route("/{chat_id}", patch(routes::chat::update))
        .route("/{chat_id}", delete(routes::chat::delete))
        .route("/{chat_id}/participantes", post(routes::chat::add_participant))
        .route(
            "/{chat_id}/participantes/{user_id}",
            delete(routes::chat::remove_participant),
        )
        .route("/{chat_id}/leitura", post(routes::chat::mark_read))
        .route("/{chat_id}/mensagens", get(routes::message::list))
        .route("/{chat_id}/mensagens", post(routes::message::create))
        .route("/{chat_id}/mensagens/{message_id}", patch(routes::message::update));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/chats", chat_routes)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
