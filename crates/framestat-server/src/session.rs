//! Everything the server knows about one connected client.
//!
//! A session has exactly one producer (its reader) calling
//! `add_collector`, `define_thread`, `record_new_frame` and
//! `connection_closed`. Any number of consumers may read concurrently.
//! Producer calls hold the state lock across the whole update, so a
//! consumer never sees a history halfway through insert-and-trim, and a
//! `close()` that returns has ordered itself after every accepted update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use framestat_types::{ClientHello, CollectorDef, CollectorIndex, FrameData, FrameNumber, ThreadIndex};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::error::RegistryError;
use crate::history::{DEFAULT_HISTORY_SECS, RecordOutcome, clamp_history};
use crate::ids::SessionId;
use crate::registry::{CollectorRegistry, ThreadData, ThreadRegistry};

/// Non-owning link from a session to the task reading its connection.
/// The session can only ask the reader to stop; the reader owns itself.
#[derive(Debug, Clone, Default)]
pub struct ReaderHandle {
    close: Arc<Notify>,
}

impl ReaderHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once close has been requested, including a request made
    /// before the reader started waiting.
    pub async fn closed(&self) {
        self.close.notified().await;
    }

    fn request_close(&self) {
        self.close.notify_one();
    }
}

#[derive(Debug)]
struct SessionState {
    collectors: CollectorRegistry,
    threads: ThreadRegistry,
    history_secs: f64,
}

#[derive(Debug)]
pub struct SessionData {
    id: SessionId,
    state: RwLock<SessionState>,
    alive: AtomicBool,
    reader: Mutex<Option<ReaderHandle>>,
    client: RwLock<Option<ClientHello>>,
}

impl SessionData {
    pub fn new(id: SessionId) -> Self {
        Self::with_history(id, DEFAULT_HISTORY_SECS)
    }

    pub fn with_history(id: SessionId, history_secs: f64) -> Self {
        Self {
            id,
            state: RwLock::new(SessionState {
                collectors: CollectorRegistry::new(),
                threads: ThreadRegistry::new(),
                history_secs: clamp_history(history_secs),
            }),
            alive: AtomicBool::new(true),
            reader: Mutex::new(None),
            client: RwLock::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn attach_reader(&self, handle: ReaderHandle) {
        *self.reader.lock() = Some(handle);
    }

    // Producer side.

    /// Returns `Ok(false)` when the session is already dead and nothing
    /// was stored.
    pub fn add_collector(&self, def: CollectorDef) -> Result<bool, RegistryError> {
        let mut state = self.state.write();
        if !self.is_alive() {
            return Ok(false);
        }
        state.collectors.add_collector(def)?;
        Ok(true)
    }

    pub fn define_thread(&self, index: ThreadIndex, name: &str) -> Result<bool, RegistryError> {
        let mut state = self.state.write();
        if !self.is_alive() {
            return Ok(false);
        }
        let history_secs = state.history_secs;
        state.threads.define(index, name, history_secs)?;
        Ok(true)
    }

    /// Returns `Ok(None)` when the session is already dead.
    pub fn record_new_frame(
        &self,
        thread: ThreadIndex,
        frame_number: FrameNumber,
        data: FrameData,
    ) -> Result<Option<RecordOutcome>, RegistryError> {
        let mut state = self.state.write();
        if !self.is_alive() {
            return Ok(None);
        }
        let history_secs = state.history_secs;
        let thread_data = state.threads.history_for(thread, history_secs)?;
        let outcome = thread_data.write().record_new_frame(frame_number, data);
        Ok(Some(outcome))
    }

    pub(crate) fn set_client(&self, hello: ClientHello) {
        *self.client.write() = Some(hello);
    }

    /// The transport is gone. The reader is already finishing, so it is
    /// released without being signalled.
    pub fn connection_closed(&self) {
        let _state = self.state.write();
        self.alive.store(false, Ordering::Release);
        self.reader.lock().take();
    }

    /// Marks the session dead and asks its reader to stop. Returns whether
    /// the session was alive. Safe to call any number of times, from any
    /// task.
    pub fn close(&self) -> bool {
        let was_alive = {
            let _state = self.state.write();
            self.alive.swap(false, Ordering::AcqRel)
        };
        if let Some(reader) = self.reader.lock().take() {
            reader.request_close();
        }
        was_alive
    }

    // Consumer side.

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn client_info(&self) -> Option<ClientHello> {
        self.client.read().clone()
    }

    pub fn is_client_known(&self) -> bool {
        self.client.read().is_some()
    }

    /// Collector index slots allocated, including holes.
    pub fn num_collectors(&self) -> usize {
        self.state.read().collectors.len()
    }

    /// Thread index slots allocated, including holes.
    pub fn num_threads(&self) -> usize {
        self.state.read().threads.len()
    }

    pub fn has_collector(&self, index: CollectorIndex) -> bool {
        self.state.read().collectors.has(index)
    }

    pub fn has_thread(&self, index: ThreadIndex) -> bool {
        self.state.read().threads.has(index)
    }

    /// The collector's definition, or the "Unknown" definition.
    pub fn collector_def(&self, index: CollectorIndex) -> CollectorDef {
        self.state.read().collectors.get(index).clone()
    }

    pub fn collector_fullname(&self, index: CollectorIndex) -> String {
        self.state.read().collectors.full_name(index)
    }

    pub fn child_distance(&self, parent: CollectorIndex, child: CollectorIndex) -> i32 {
        self.state.read().collectors.child_distance(parent, child)
    }

    pub fn collectors(&self) -> Vec<CollectorDef> {
        self.state.read().collectors.iter().cloned().collect()
    }

    pub fn thread_name(&self, index: ThreadIndex) -> Option<String> {
        self.state.read().threads.name(index).map(str::to_owned)
    }

    /// The thread's history, creating an empty unnamed one if the client
    /// has not mentioned this thread yet. `None` only for indices outside
    /// the accepted range.
    pub fn thread_data(&self, index: ThreadIndex) -> Option<ThreadData> {
        let existing = self.state.read().threads.get(index).cloned();
        if existing.is_some() {
            return existing;
        }
        let mut state = self.state.write();
        let history_secs = state.history_secs;
        state.threads.history_for(index, history_secs).ok().cloned()
    }

    /// Named threads, in index order.
    pub fn named_threads(&self) -> Vec<(ThreadIndex, String, ThreadData)> {
        let state = self.state.read();
        state
            .threads
            .iter()
            .filter_map(|(index, name, data)| Some((index, name?.to_owned(), data?.clone())))
            .collect()
    }

    /// Applies to every existing thread and to threads created later.
    pub fn set_history(&self, secs: f64) {
        let secs = clamp_history(secs);
        let mut state = self.state.write();
        state.history_secs = secs;
        state.threads.set_history(secs);
    }

    pub fn history(&self) -> f64 {
        self.state.read().history_secs
    }
}
