use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use framestat_types::{CollectorIndex, FrameNumber, ThreadIndex};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::history::DEFAULT_FRAME_RATE_WINDOW_SECS;
use crate::session::SessionData;

/// Observer for one session's events. Every hook runs on the context that
/// caused the event and must not block.
pub trait Monitor: Send + Sync {
    fn monitor_name(&self) -> &str {
        "monitor"
    }

    /// The session exists and its reader is about to start.
    fn initialized(&self, _session: &SessionData) {}

    fn got_hello(&self, _session: &SessionData) {}

    /// The client speaks a protocol revision this server cannot serve. The
    /// session is discarded right after this returns.
    fn got_bad_version(&self, _session: &SessionData, _client_major: u32, _client_minor: u32) {}

    fn new_collector(&self, _session: &SessionData, _index: CollectorIndex) {}

    fn new_thread(&self, _session: &SessionData, _index: ThreadIndex) {}

    fn new_data(&self, _session: &SessionData, _thread: ThreadIndex, _frame_number: FrameNumber) {}

    fn lost_connection(&self, _session: &SessionData) {}

    /// Whether `idle` should be called every poll period.
    fn has_idle(&self) -> bool {
        false
    }

    fn idle(&self, _session: &SessionData) {}
}

/// Hands out one monitor per accepted connection. Returning `None`
/// refuses the connection.
pub trait MonitorFactory: Send + Sync {
    fn make_monitor(&self) -> Option<Arc<dyn Monitor>>;
}

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Main thread index reported in the periodic status line.
const STATUS_THREAD: ThreadIndex = 0;

pub struct TracingMonitorFactory {
    max_sessions: usize,
    status_interval: Duration,
    active: Arc<AtomicUsize>,
}

impl TracingMonitorFactory {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            status_interval: DEFAULT_STATUS_INTERVAL,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Monitors handed out and not yet dropped.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl MonitorFactory for TracingMonitorFactory {
    fn make_monitor(&self) -> Option<Arc<dyn Monitor>> {
        let max = self.max_sessions;
        let reserved = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            warn!(max_sessions = max, "session limit reached, refusing monitor");
            return None;
        }
        let monitor: Arc<dyn Monitor> = Arc::new(TracingMonitor {
            active: Arc::clone(&self.active),
            status_interval: self.status_interval,
            last_status: Mutex::new(None),
        });
        Some(monitor)
    }
}

/// Logs session events and a periodic frame-rate line for the main thread.
pub struct TracingMonitor {
    active: Arc<AtomicUsize>,
    status_interval: Duration,
    last_status: Mutex<Option<Instant>>,
}

impl Drop for TracingMonitor {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Monitor for TracingMonitor {
    fn monitor_name(&self) -> &str {
        "tracing"
    }

    fn initialized(&self, session: &SessionData) {
        debug!(session_id = %session.id(), "session initialized");
    }

    fn got_hello(&self, session: &SessionData) {
        if let Some(hello) = session.client_info() {
            info!(
                session_id = %session.id(),
                hostname = %hello.hostname,
                progname = %hello.progname,
                pid = hello.pid,
                version = %format_args!("{}.{}", hello.major_version, hello.minor_version),
                "client connected"
            );
        }
    }

    fn got_bad_version(&self, session: &SessionData, client_major: u32, client_minor: u32) {
        warn!(
            session_id = %session.id(),
            client = %format_args!("{client_major}.{client_minor}"),
            server = %format_args!(
                "{}.{}",
                framestat_wire::SERVER_MAJOR_VERSION,
                framestat_wire::SERVER_MINOR_VERSION
            ),
            "client protocol version not supported"
        );
    }

    fn new_collector(&self, session: &SessionData, index: CollectorIndex) {
        debug!(
            session_id = %session.id(),
            collector = index,
            name = %session.collector_fullname(index),
            "new collector"
        );
    }

    fn new_thread(&self, session: &SessionData, index: ThreadIndex) {
        debug!(
            session_id = %session.id(),
            thread = index,
            name = session.thread_name(index).as_deref().unwrap_or(""),
            "new thread"
        );
    }

    fn new_data(&self, session: &SessionData, thread: ThreadIndex, frame_number: FrameNumber) {
        trace!(session_id = %session.id(), thread, frame_number, "frame");
    }

    fn lost_connection(&self, session: &SessionData) {
        info!(session_id = %session.id(), "client disconnected");
    }

    fn has_idle(&self) -> bool {
        true
    }

    fn idle(&self, session: &SessionData) {
        {
            let mut last = self.last_status.lock();
            let now = Instant::now();
            if last.is_some_and(|at| now.duration_since(at) < self.status_interval) {
                return;
            }
            *last = Some(now);
        }
        if !session.has_thread(STATUS_THREAD) {
            return;
        }
        let Some(data) = session.thread_data(STATUS_THREAD) else {
            return;
        };
        let rate = data.read().frame_rate(DEFAULT_FRAME_RATE_WINDOW_SECS);
        if let Some(text) = format_frame_rate(rate) {
            info!(session_id = %session.id(), rate = %text, "frame rate");
        }
    }
}

/// `"16.7 ms / 60.0 Hz"`, or `None` while the rate is undefined.
pub fn format_frame_rate(rate: f64) -> Option<String> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    let ms = 1000.0 / rate;
    Some(format!("{ms:.1} ms / {rate:.1} Hz"))
}
