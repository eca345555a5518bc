//! Per-thread frame history.
//!
//! Only frames that actually arrived are stored, ordered by frame number.
//! Numbers the client skipped (or has not sent yet) take no space; looking
//! one up yields the shared empty frame. The window is trimmed from the
//! front on every insert so that it only holds frames within
//! `history_secs` of the newest frame's time, and never more than
//! `MAX_RETAINED_FRAMES` of them.

use std::collections::VecDeque;

use framestat_types::{FrameData, FrameNumber};
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_SECS: f64 = 60.0;
pub const DEFAULT_FRAME_RATE_WINDOW_SECS: f64 = 3.0;

/// Longest retained history a caller may configure.
pub const MAX_HISTORY_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Largest forward jump in frame numbers accepted as a gap. A bigger jump
/// is treated as a restart of the client's numbering.
pub const MAX_FRAME_GAP: i64 = 65_536;

/// Hard ceiling on frames held per thread, whatever their timestamps.
pub const MAX_RETAINED_FRAMES: usize = 1 << 20;

static NULL_FRAME: FrameData = FrameData::EMPTY;

/// What `record_new_frame` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// A frame with the same number was already held and was overwritten.
    Replaced,
    /// Not the newest frame, and its time is outside the history span.
    Expired,
    /// The frame has no time samples, so it cannot be placed in time.
    Untimed,
    /// The frame number jumped past `MAX_FRAME_GAP`; the window restarted.
    Restarted,
}

#[derive(Debug)]
pub struct FrameHistory {
    frames: VecDeque<(FrameNumber, FrameData)>,
    history_secs: f64,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SECS)
    }
}

impl FrameHistory {
    pub fn new(history_secs: f64) -> Self {
        Self {
            frames: VecDeque::new(),
            history_secs: clamp_history(history_secs),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames actually held.
    pub fn retained_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn oldest_frame_number(&self) -> Option<FrameNumber> {
        self.frames.front().map(|(number, _)| *number)
    }

    pub fn latest_frame_number(&self) -> Option<FrameNumber> {
        self.frames.back().map(|(number, _)| *number)
    }

    pub fn has_frame(&self, frame_number: FrameNumber) -> bool {
        self.position(frame_number).is_ok()
    }

    /// The frame with this number, or an empty frame if it was skipped,
    /// expired, or never arrived.
    pub fn frame(&self, frame_number: FrameNumber) -> &FrameData {
        match self.position(frame_number) {
            Ok(index) => &self.frames[index].1,
            Err(_) => &NULL_FRAME,
        }
    }

    pub fn latest_frame(&self) -> &FrameData {
        self.frames.back().map_or(&NULL_FRAME, |(_, frame)| frame)
    }

    /// Start time of the newest frame, `0.0` when empty.
    pub fn latest_time(&self) -> f64 {
        self.latest_frame().start()
    }

    /// Start time of the oldest retained frame, `0.0` when empty.
    pub fn oldest_time(&self) -> f64 {
        self.frames.front().map_or(0.0, |(_, frame)| frame.start())
    }

    /// The frame nearest at-or-before `time`, clamped to the window.
    pub fn frame_at_time(&self, time: f64) -> &FrameData {
        match self.frame_number_at_time(time, None) {
            Some(number) => self.frame(number),
            None => &NULL_FRAME,
        }
    }

    /// Number of the frame nearest at-or-before `time`, clamped to the
    /// window. `hint` is a frame number known to be at-or-before `time`,
    /// typically the previous answer during playback; the search scans
    /// forward from it when it is still usable.
    pub fn frame_number_at_time(&self, time: f64, hint: Option<FrameNumber>) -> Option<FrameNumber> {
        if self.frames.is_empty() {
            return None;
        }

        if let Some(index) = hint.and_then(|h| self.position(h).ok())
            && self.frames[index].1.start() <= time
        {
            let mut best = index;
            for (i, (_, frame)) in self.frames.iter().enumerate().skip(index + 1) {
                if frame.start() > time {
                    break;
                }
                best = i;
            }
            return Some(self.frames[best].0);
        }

        let after = self.frames.partition_point(|(_, frame)| frame.start() <= time);
        Some(self.frames[after.saturating_sub(1)].0)
    }

    /// Frames per second over the trailing `window_secs` of client time,
    /// counting only frames actually received. `0.0` until at least two
    /// frames fall in the window.
    pub fn frame_rate(&self, window_secs: f64) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        let latest = self.latest_time();
        let earliest_allowed = latest - window_secs;

        let mut count: u32 = 0;
        let mut first = latest;
        for (_, frame) in self.frames.iter().rev() {
            let start = frame.start();
            if start < earliest_allowed {
                break;
            }
            if start > latest {
                continue;
            }
            count += 1;
            first = start;
        }

        let span = latest - first;
        if count < 2 || span <= 0.0 {
            return 0.0;
        }
        f64::from(count - 1) / span
    }

    /// Changes the retained span. Takes effect at the next insert.
    pub fn set_history(&mut self, secs: f64) {
        self.history_secs = clamp_history(secs);
    }

    pub fn history(&self) -> f64 {
        self.history_secs
    }

    /// Received frames in frame-number order.
    pub fn frames(&self) -> impl Iterator<Item = (FrameNumber, &FrameData)> {
        self.frames.iter().map(|(number, frame)| (*number, frame))
    }

    pub fn record_new_frame(&mut self, frame_number: FrameNumber, data: FrameData) -> RecordOutcome {
        if !data.is_timed() {
            return RecordOutcome::Untimed;
        }

        let Some(&(latest_number, _)) = self.frames.back() else {
            self.frames.push_back((frame_number, data));
            return RecordOutcome::Inserted;
        };

        let outcome = if frame_number > latest_number {
            if i64::from(frame_number) - i64::from(latest_number) > MAX_FRAME_GAP {
                warn!(
                    frame_number,
                    latest_number, "frame number jumped too far, restarting history"
                );
                self.frames.clear();
                self.frames.push_back((frame_number, data));
                return RecordOutcome::Restarted;
            }
            self.frames.push_back((frame_number, data));
            RecordOutcome::Inserted
        } else {
            match self.position(frame_number) {
                Ok(index) => {
                    debug!(frame_number, "repeated frame data, keeping the newer copy");
                    self.frames[index].1 = data;
                    RecordOutcome::Replaced
                }
                Err(index) => {
                    let too_far_back = index == 0
                        && self.frames.front().is_some_and(|(oldest, _)| {
                            i64::from(*oldest) - i64::from(frame_number) > MAX_FRAME_GAP
                        });
                    if too_far_back || !self.in_span(self.latest_time(), data.start()) {
                        return RecordOutcome::Expired;
                    }
                    self.frames.insert(index, (frame_number, data));
                    RecordOutcome::Inserted
                }
            }
        };

        self.trim();
        outcome
    }

    fn trim(&mut self) {
        let excess = self.frames.len().saturating_sub(MAX_RETAINED_FRAMES);
        self.frames.drain(..excess);

        let latest = self.latest_time();
        while let Some((_, front)) = self.frames.front() {
            if self.in_span(latest, front.start()) {
                break;
            }
            self.frames.pop_front();
        }
    }

    /// Whether a frame starting at `start` belongs in a window whose newest
    /// frame starts at `latest`. Checked both ways so that a client clock
    /// running backwards still ages frames out.
    fn in_span(&self, latest: f64, start: f64) -> bool {
        (latest - start).abs() <= self.history_secs
    }

    fn position(&self, frame_number: FrameNumber) -> Result<usize, usize> {
        self.frames.binary_search_by_key(&frame_number, |(number, _)| *number)
    }
}

pub(crate) fn clamp_history(secs: f64) -> f64 {
    if secs.is_nan() {
        return 0.0;
    }
    secs.clamp(0.0, MAX_HISTORY_SECS)
}
