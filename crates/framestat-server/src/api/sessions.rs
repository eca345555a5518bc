use axum::extract::{Path as AxumPath, State};
use axum::response::{IntoResponse, Response};
use framestat_types::{
    CloseSessionResponse, CollectorInfo, CollectorsResponse, SessionInfo, SessionsResponse,
};
use tracing::info;

use super::AppState;
use crate::util::http::json_ok;

pub async fn api_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<SessionInfo> = state
        .server
        .sessions()
        .iter()
        .map(|session| {
            let client = session.client_info();
            SessionInfo {
                session_id: session.id().get(),
                alive: session.is_alive(),
                hostname: client.as_ref().map(|hello| hello.hostname.clone()),
                progname: client.as_ref().map(|hello| hello.progname.clone()),
                pid: client.as_ref().map(|hello| hello.pid),
                num_collectors: session.num_collectors(),
                num_threads: session.num_threads(),
            }
        })
        .collect();

    json_ok(&SessionsResponse {
        live_sessions: sessions.iter().filter(|s| s.alive).count(),
        sessions,
    })
}

pub async fn api_collectors(
    State(state): State<AppState>,
    AxumPath(session_id): AxumPath<u64>,
) -> Response {
    let session = match state.session(session_id) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let collectors = session
        .collectors()
        .into_iter()
        .map(|def| CollectorInfo {
            full_name: session.collector_fullname(def.index),
            index: def.index,
            name: def.name,
            parent_index: def.parent_index,
            level_units: def.level_units,
        })
        .collect();
    json_ok(&CollectorsResponse {
        session_id,
        collectors,
    })
}

pub async fn api_close_session(
    State(state): State<AppState>,
    AxumPath(session_id): AxumPath<u64>,
) -> Response {
    let session = match state.session(session_id) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let was_alive = state.server.close_session(session.id()).unwrap_or(false);
    info!(session_id, was_alive, "session close requested via API");
    json_ok(&CloseSessionResponse {
        session_id,
        was_alive,
    })
}

pub async fn api_remove_session(
    State(state): State<AppState>,
    AxumPath(session_id): AxumPath<u64>,
) -> Response {
    let session = match state.session(session_id) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let was_alive = session.is_alive();
    state.server.remove_session(session.id());
    info!(session_id, was_alive, "session removed via API");
    json_ok(&CloseSessionResponse {
        session_id,
        was_alive,
    })
}
