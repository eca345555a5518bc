use facet::Facet;

use crate::CollectorIndex;

/// A start or stop mark for a timed collector, in client seconds.
///
/// Marks for one collector alternate start/stop in the order they appear
/// in [`FrameData::times`].
#[derive(Facet, Clone, Copy, Debug, PartialEq)]
pub struct TimeSample {
    pub collector: CollectorIndex,
    pub time: f64,
}

/// Current value of a level collector at the end of a frame.
#[derive(Facet, Clone, Copy, Debug, PartialEq)]
pub struct LevelSample {
    pub collector: CollectorIndex,
    pub value: f64,
}

/// One thread's measurements for one frame.
///
/// The payload is passed through untouched; only the first and last time
/// samples matter to the history window.
#[derive(Facet, Clone, Debug, Default, PartialEq)]
pub struct FrameData {
    pub times: Vec<TimeSample>,
    pub levels: Vec<LevelSample>,
}

impl FrameData {
    pub const EMPTY: FrameData = FrameData {
        times: Vec::new(),
        levels: Vec::new(),
    };

    pub fn is_empty(&self) -> bool {
        self.times.is_empty() && self.levels.is_empty()
    }

    /// Whether the frame carries a timestamp at all.
    pub fn is_timed(&self) -> bool {
        !self.times.is_empty()
    }

    /// Time of the first mark in the frame, or `0.0` if there is none.
    pub fn start(&self) -> f64 {
        self.times.first().map_or(0.0, |s| s.time)
    }

    /// Time of the last mark in the frame, or `0.0` if there is none.
    pub fn end(&self) -> f64 {
        self.times.last().map_or(0.0, |s| s.time)
    }

    pub fn net_time(&self) -> f64 {
        self.end() - self.start()
    }

    pub fn level(&self, collector: CollectorIndex) -> Option<f64> {
        self.levels
            .iter()
            .rev()
            .find(|s| s.collector == collector)
            .map(|s| s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(times: &[(CollectorIndex, f64)]) -> FrameData {
        FrameData {
            times: times
                .iter()
                .map(|&(collector, time)| TimeSample { collector, time })
                .collect(),
            levels: Vec::new(),
        }
    }

    #[test]
    fn start_and_end_follow_first_and_last_marks() {
        let data = frame(&[(0, 1.5), (3, 1.6), (3, 1.7), (0, 1.75)]);
        assert_eq!(data.start(), 1.5);
        assert_eq!(data.end(), 1.75);
        assert!((data.net_time() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn empty_frame_has_zero_bounds() {
        assert!(FrameData::EMPTY.is_empty());
        assert!(!FrameData::EMPTY.is_timed());
        assert_eq!(FrameData::EMPTY.start(), 0.0);
        assert_eq!(FrameData::EMPTY.end(), 0.0);
    }

    #[test]
    fn level_returns_latest_sample_for_collector() {
        let data = FrameData {
            times: Vec::new(),
            levels: vec![
                LevelSample { collector: 4, value: 10.0 },
                LevelSample { collector: 5, value: 2.0 },
                LevelSample { collector: 4, value: 12.0 },
            ],
        };
        assert!(!data.is_empty());
        assert_eq!(data.level(4), Some(12.0));
        assert_eq!(data.level(9), None);
    }
}
