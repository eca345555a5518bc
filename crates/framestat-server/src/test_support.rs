use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use framestat_types::{
    ClientHello, CollectorIndex, FrameData, FrameNumber, ThreadIndex, TimeSample,
};
use framestat_wire::{ClientMessage, encode_client_message_default, encode_protocol_magic};
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::monitor::{Monitor, MonitorFactory};
use crate::session::SessionData;

pub(crate) fn timed(start: f64) -> FrameData {
    FrameData {
        times: vec![
            TimeSample {
                collector: 0,
                time: start,
            },
            TimeSample {
                collector: 0,
                time: start + 0.005,
            },
        ],
        levels: Vec::new(),
    }
}

pub(crate) fn hello(major_version: u32, minor_version: u32) -> ClientMessage {
    ClientMessage::Hello(ClientHello {
        hostname: "render-box".into(),
        progname: "asteroids".into(),
        pid: 42,
        major_version,
        minor_version,
    })
}

pub(crate) async fn write_magic<W: AsyncWrite + Unpin>(writer: &mut W) {
    writer
        .write_all(&encode_protocol_magic())
        .await
        .expect("magic should be written");
}

pub(crate) async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &ClientMessage) {
    let frame = encode_client_message_default(message).expect("message should encode");
    writer.write_all(&frame).await.expect("frame should be written");
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not hold within 2s");
}

/// Remembers every event it sees, except idle calls, which are counted.
#[derive(Default)]
pub(crate) struct RecordingMonitor {
    events: Mutex<Vec<String>>,
    idles: AtomicUsize,
}

impl RecordingMonitor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn idles(&self) -> usize {
        self.idles.load(Ordering::Acquire)
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl Monitor for RecordingMonitor {
    fn monitor_name(&self) -> &str {
        "recording"
    }

    fn got_hello(&self, _session: &SessionData) {
        self.push("hello".into());
    }

    fn got_bad_version(&self, _session: &SessionData, client_major: u32, client_minor: u32) {
        self.push(format!("bad_version {client_major}.{client_minor}"));
    }

    fn new_collector(&self, _session: &SessionData, index: CollectorIndex) {
        self.push(format!("collector {index}"));
    }

    fn new_thread(&self, _session: &SessionData, index: ThreadIndex) {
        self.push(format!("thread {index}"));
    }

    fn new_data(&self, _session: &SessionData, thread: ThreadIndex, frame_number: FrameNumber) {
        self.push(format!("data {thread}/{frame_number}"));
    }

    fn lost_connection(&self, _session: &SessionData) {
        self.push("lost".into());
    }

    fn has_idle(&self) -> bool {
        true
    }

    fn idle(&self, _session: &SessionData) {
        self.idles.fetch_add(1, Ordering::AcqRel);
    }
}

/// Hands out recording monitors and keeps them for inspection.
#[derive(Default)]
pub(crate) struct RecordingFactory {
    monitors: Mutex<Vec<Arc<RecordingMonitor>>>,
    refuse: AtomicBool,
}

impl RecordingFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refuse_all(&self) {
        self.refuse.store(true, Ordering::Release);
    }

    pub(crate) fn monitors(&self) -> Vec<Arc<RecordingMonitor>> {
        self.monitors.lock().clone()
    }
}

impl MonitorFactory for RecordingFactory {
    fn make_monitor(&self) -> Option<Arc<dyn Monitor>> {
        if self.refuse.load(Ordering::Acquire) {
            return None;
        }
        let monitor = RecordingMonitor::new();
        self.monitors.lock().push(Arc::clone(&monitor));
        Some(monitor as Arc<dyn Monitor>)
    }
}
