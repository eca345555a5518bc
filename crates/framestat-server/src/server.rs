//! Session table and connection dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use framestat_wire::{ClientMessage, DEFAULT_MAX_FRAME_BYTES};
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::error::ReaderError;
use crate::history::DEFAULT_HISTORY_SECS;
use crate::ids::SessionId;
use crate::monitor::{Monitor, MonitorFactory};
use crate::reader::{FrameReader, Reader};
use crate::session::{ReaderHandle, SessionData};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ended sessions kept queryable before the oldest are evicted.
pub const DEFAULT_MAX_DEAD_SESSIONS: usize = 64;

/// Decoded messages buffered per connection in cooperative mode.
const COOPERATIVE_QUEUE_DEPTH: usize = 256;

/// Messages applied per connection per `poll`, so one busy client cannot
/// starve the others.
const MAX_MESSAGES_PER_POLL: usize = 1024;

/// How connections are serviced, fixed when the server starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Each connection's task decodes and applies its own messages.
    #[default]
    Threaded,
    /// Connection tasks only decode; `Server::poll` applies every
    /// connection's messages in turn on the caller's task.
    Cooperative,
}

impl DispatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Threaded => "threaded",
            Self::Cooperative => "cooperative",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threaded" => Ok(Self::Threaded),
            "cooperative" => Ok(Self::Cooperative),
            other => Err(format!(
                "unknown dispatch mode {other:?} (expected \"threaded\" or \"cooperative\")"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub dispatch: DispatchMode,
    pub history_secs: f64,
    pub max_frame_bytes: usize,
    pub poll_interval: Duration,
    pub max_dead_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            history_secs: DEFAULT_HISTORY_SECS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_dead_sessions: DEFAULT_MAX_DEAD_SESSIONS,
        }
    }
}

struct SessionEntry {
    session: Arc<SessionData>,
    /// Dropped once the connection is over, which frees the factory's slot.
    monitor: Option<Arc<dyn Monitor>>,
}

struct CooperativeSource {
    reader: Reader,
    messages: mpsc::Receiver<Result<ClientMessage, ReaderError>>,
}

pub struct Server {
    settings: ServerSettings,
    factory: Arc<dyn MonitorFactory>,
    sessions: Mutex<BTreeMap<SessionId, SessionEntry>>,
    next_session_id: Mutex<SessionId>,
    cooperative: Mutex<Vec<CooperativeSource>>,
    me: Weak<Server>,
}

impl Server {
    pub fn new(settings: ServerSettings, factory: Arc<dyn MonitorFactory>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            settings,
            factory,
            sessions: Mutex::new(BTreeMap::new()),
            next_session_id: Mutex::new(SessionId::ONE),
            cooperative: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn dispatch(&self) -> DispatchMode {
        self.settings.dispatch
    }

    pub fn make_monitor(&self) -> Option<Arc<dyn Monitor>> {
        self.factory.make_monitor()
    }

    /// Registers a fresh session watched by `monitor`.
    pub fn open_session(&self, monitor: Arc<dyn Monitor>) -> Arc<SessionData> {
        let id = {
            let mut next = self.next_session_id.lock();
            let id = *next;
            *next = id.next();
            id
        };
        let session = Arc::new(SessionData::with_history(id, self.settings.history_secs));
        self.sessions.lock().insert(
            id,
            SessionEntry {
                session: Arc::clone(&session),
                monitor: Some(monitor),
            },
        );
        session
    }

    /// Starts servicing `stream` for the reader's session, in this
    /// server's dispatch mode.
    pub fn add_reader<S>(&self, reader: Reader, stream: S)
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let handle = ReaderHandle::new();
        reader.session().attach_reader(handle.clone());
        let mut frames = FrameReader::new(stream, self.settings.max_frame_bytes);

        match self.settings.dispatch {
            DispatchMode::Threaded => {
                let server = self.me.clone();
                tokio::spawn(async move {
                    let mut reader = reader;
                    let result = tokio::select! {
                        result = reader.run(&mut frames) => result,
                        () = handle.closed() => Ok(()),
                    };
                    match server.upgrade() {
                        Some(server) => server.reader_finished(&reader, result),
                        None => reader.finish(),
                    }
                });
            }
            DispatchMode::Cooperative => {
                let (tx, rx) = mpsc::channel(COOPERATIVE_QUEUE_DEPTH);
                tokio::spawn(async move {
                    loop {
                        let next = tokio::select! {
                            next = frames.next_message() => next,
                            () = handle.closed() => break,
                        };
                        match next {
                            Ok(Some(message)) => {
                                if tx.send(Ok(message)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                break;
                            }
                        }
                    }
                });
                self.cooperative.lock().push(CooperativeSource {
                    reader,
                    messages: rx,
                });
            }
        }
    }

    /// Applies pending messages from every cooperative connection, then
    /// runs idle callbacks. In threaded mode only the idle step does work.
    pub fn poll(&self) {
        let sources = std::mem::take(&mut *self.cooperative.lock());
        let mut still_open = Vec::with_capacity(sources.len());

        for mut source in sources {
            let mut finished = None;
            for _ in 0..MAX_MESSAGES_PER_POLL {
                match source.messages.try_recv() {
                    Ok(Ok(message)) => {
                        if let Err(e) = source.reader.handle_message(message) {
                            finished = Some(Err(e));
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        finished = Some(Err(e));
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = Some(Ok(()));
                        break;
                    }
                }
            }
            match finished {
                Some(result) => self.reader_finished(&source.reader, result),
                None => still_open.push(source),
            }
        }

        self.cooperative.lock().extend(still_open);
        self.run_idle();
    }

    /// Calls `poll` every poll interval, forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll();
        }
    }

    /// All known sessions, live or dead, in id order.
    pub fn sessions(&self) -> Vec<Arc<SessionData>> {
        self.sessions
            .lock()
            .values()
            .map(|entry| Arc::clone(&entry.session))
            .collect()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<SessionData>> {
        self.sessions
            .lock()
            .get(&id)
            .map(|entry| Arc::clone(&entry.session))
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|entry| entry.session.is_alive())
            .count()
    }

    /// Closes the session's connection and keeps its data. Returns whether
    /// it was alive, or `None` for an unknown id.
    pub fn close_session(&self, id: SessionId) -> Option<bool> {
        let session = self.session(id)?;
        let was_alive = session.close();
        if was_alive {
            info!(session_id = %id, "session closed by server");
        }
        Some(was_alive)
    }

    /// Forgets the session entirely, closing it first if needed.
    pub fn remove_session(&self, id: SessionId) -> Option<Arc<SessionData>> {
        let entry = self.sessions.lock().remove(&id)?;
        entry.session.close();
        debug!(session_id = %id, "session removed");
        Some(entry.session)
    }

    fn reader_finished(&self, reader: &Reader, result: Result<(), ReaderError>) {
        let id = reader.session().id();
        match result {
            Err(ReaderError::BadVersion { .. }) => {
                self.remove_session(id);
                return;
            }
            Err(e) => warn!(session_id = %id, %e, "session connection failed"),
            Ok(()) => {}
        }
        reader.finish();
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(&id) {
            entry.monitor = None;
        }
        self.evict_dead_sessions(&mut sessions);
    }

    /// Drops the oldest sessions whose connection is over once more than
    /// `max_dead_sessions` of them are held.
    fn evict_dead_sessions(&self, sessions: &mut BTreeMap<SessionId, SessionEntry>) {
        let dead: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, entry)| entry.monitor.is_none() && !entry.session.is_alive())
            .map(|(id, _)| *id)
            .collect();
        let excess = dead.len().saturating_sub(self.settings.max_dead_sessions);
        for id in &dead[..excess] {
            sessions.remove(id);
            debug!(session_id = %id, "evicted ended session");
        }
    }

    fn run_idle(&self) {
        let idle: Vec<(Arc<SessionData>, Arc<dyn Monitor>)> = self
            .sessions
            .lock()
            .values()
            .filter(|entry| entry.session.is_alive())
            .filter_map(|entry| {
                let monitor = entry.monitor.as_ref()?;
                monitor
                    .has_idle()
                    .then(|| (Arc::clone(&entry.session), Arc::clone(monitor)))
            })
            .collect();
        for (session, monitor) in idle {
            monitor.idle(&session);
        }
    }
}
