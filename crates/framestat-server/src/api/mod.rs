//! HTTP query surface over the server's sessions.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use crate::ids::SessionId;
use crate::server::Server;
use crate::session::SessionData;
use crate::util::http::json_error;

mod sessions;
mod threads;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
}

impl AppState {
    fn session(&self, raw_id: u64) -> Result<Arc<SessionData>, Response> {
        SessionId::from_raw(raw_id)
            .and_then(|id| self.server.session(id))
            .ok_or_else(|| {
                json_error(StatusCode::NOT_FOUND, format!("unknown session id: {raw_id}"))
            })
    }
}

pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(sessions::api_sessions))
        .route(
            "/api/sessions/{session_id}",
            axum::routing::delete(sessions::api_remove_session),
        )
        .route(
            "/api/sessions/{session_id}/close",
            post(sessions::api_close_session),
        )
        .route(
            "/api/sessions/{session_id}/collectors",
            get(sessions::api_collectors),
        )
        .route(
            "/api/sessions/{session_id}/threads",
            get(threads::api_threads),
        )
        .route(
            "/api/sessions/{session_id}/threads/{thread}/frames/{frame_number}",
            get(threads::api_frame),
        )
        .route(
            "/api/sessions/{session_id}/threads/{thread}/at/{time}",
            get(threads::api_frame_at_time),
        )
        .with_state(AppState { server })
}

async fn health() -> impl IntoResponse {
    "ok"
}
