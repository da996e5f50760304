pub mod agent;
pub mod command;
pub mod error;
pub mod routes;
pub mod runtime;
pub mod sink;
pub mod speaker;
pub mod state;
pub mod youtube;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use runtime::{run_stream, StreamFlags, StreamRuntime};

/// Build the axum Router with the display websocket and the JSON API.
/// Used by the runtime and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Display + chat
        .route("/ws", get(routes::ws::ws_handler))
        .route("/api/chat", post(routes::chat::post_chat))
        // Scheduler
        .route("/api/status", get(routes::status::get_status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
