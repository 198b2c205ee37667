pub mod handlers;

use crate::state::AppState;
use axum::{middleware, routing::get, Router};

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/all-media", get(handlers::all_media))
        .route("/server-status", get(handlers::server_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::track_activity));

    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(handlers::websocket))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .with_state(state)
}
