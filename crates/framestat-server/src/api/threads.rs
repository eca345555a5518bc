use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Response;
use framestat_types::{FrameNumber, FrameResponse, ThreadIndex, ThreadSummary, ThreadsResponse};

use super::AppState;
use crate::history::DEFAULT_FRAME_RATE_WINDOW_SECS;
use crate::registry::ThreadData;
use crate::util::http::{json_error, json_ok};

pub async fn api_threads(
    State(state): State<AppState>,
    AxumPath(session_id): AxumPath<u64>,
) -> Response {
    let session = match state.session(session_id) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let threads = session
        .named_threads()
        .into_iter()
        .map(|(thread_index, name, data)| {
            let history = data.read();
            ThreadSummary {
                thread_index,
                name,
                is_empty: history.is_empty(),
                oldest_frame_number: history.oldest_frame_number(),
                latest_frame_number: history.latest_frame_number(),
                oldest_time: history.oldest_time(),
                latest_time: history.latest_time(),
                history_secs: history.history(),
                frame_rate: history.frame_rate(DEFAULT_FRAME_RATE_WINDOW_SECS),
            }
        })
        .collect();
    json_ok(&ThreadsResponse {
        session_id,
        threads,
    })
}

pub async fn api_frame(
    State(state): State<AppState>,
    AxumPath((session_id, thread, frame_number)): AxumPath<(u64, ThreadIndex, FrameNumber)>,
) -> Response {
    let data = match thread_data(&state, session_id, thread) {
        Ok(data) => data,
        Err(response) => return response,
    };
    let history = data.read();
    if !history.has_frame(frame_number) {
        return json_error(
            StatusCode::NOT_FOUND,
            format!("frame {frame_number} of thread {thread} is not retained"),
        );
    }
    json_ok(&FrameResponse {
        session_id,
        thread_index: thread,
        frame_number,
        frame: history.frame(frame_number).clone(),
    })
}

pub async fn api_frame_at_time(
    State(state): State<AppState>,
    AxumPath((session_id, thread, time)): AxumPath<(u64, ThreadIndex, f64)>,
) -> Response {
    let data = match thread_data(&state, session_id, thread) {
        Ok(data) => data,
        Err(response) => return response,
    };
    let history = data.read();
    let Some(frame_number) = history.frame_number_at_time(time, None) else {
        return json_error(
            StatusCode::NOT_FOUND,
            format!("thread {thread} has no frames yet"),
        );
    };
    json_ok(&FrameResponse {
        session_id,
        thread_index: thread,
        frame_number,
        frame: history.frame(frame_number).clone(),
    })
}

/// Only threads the client has named are visible over HTTP, so a query
/// never creates a thread slot.
fn thread_data(state: &AppState, session_id: u64, thread: ThreadIndex) -> Result<ThreadData, Response> {
    let session = state.session(session_id)?;
    if !session.has_thread(thread) {
        return Err(json_error(
            StatusCode::NOT_FOUND,
            format!("unknown thread {thread} in session {session_id}"),
        ));
    }
    session.thread_data(thread).ok_or_else(|| {
        json_error(
            StatusCode::NOT_FOUND,
            format!("unknown thread {thread} in session {session_id}"),
        )
    })
}
