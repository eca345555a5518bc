use facet::Facet;

use crate::{CollectorIndex, FrameData, FrameNumber, ThreadIndex};

/// API response for `/api/sessions`.
#[derive(Facet)]
pub struct SessionsResponse {
    pub live_sessions: usize,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Facet)]
pub struct SessionInfo {
    pub session_id: u64,
    pub alive: bool,
    #[facet(skip_unless_truthy)]
    pub hostname: Option<String>,
    #[facet(skip_unless_truthy)]
    pub progname: Option<String>,
    pub pid: Option<u32>,
    pub num_collectors: usize,
    pub num_threads: usize,
}

#[derive(Facet)]
pub struct CollectorsResponse {
    pub session_id: u64,
    pub collectors: Vec<CollectorInfo>,
}

#[derive(Facet)]
pub struct CollectorInfo {
    pub index: CollectorIndex,
    pub name: String,
    pub full_name: String,
    pub parent_index: CollectorIndex,
    pub level_units: String,
}

#[derive(Facet)]
pub struct ThreadsResponse {
    pub session_id: u64,
    pub threads: Vec<ThreadSummary>,
}

/// Window bounds and rate for one thread's retained frames.
#[derive(Facet)]
pub struct ThreadSummary {
    pub thread_index: ThreadIndex,
    pub name: String,
    pub is_empty: bool,
    pub oldest_frame_number: Option<FrameNumber>,
    pub latest_frame_number: Option<FrameNumber>,
    pub oldest_time: f64,
    pub latest_time: f64,
    pub history_secs: f64,
    pub frame_rate: f64,
}

#[derive(Facet)]
pub struct FrameResponse {
    pub session_id: u64,
    pub thread_index: ThreadIndex,
    pub frame_number: FrameNumber,
    pub frame: FrameData,
}

#[derive(Facet)]
pub struct CloseSessionResponse {
    pub session_id: u64,
    pub was_alive: bool,
}

#[derive(Facet)]
pub struct ApiError {
    pub error: String,
}
