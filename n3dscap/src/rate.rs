//! Frames-per-second reporting.
//!
//! The rate is the cumulative average since streaming started, sampled on a
//! fixed cadence. Only the report timer is reset after a report.

use std::time::{Duration, Instant};

pub const DEFAULT_CADENCE: Duration = Duration::from_secs(1);

pub struct RateTracker {
    cadence: Duration,
    frames: u64,
    session_start: Instant,
    last_report: Instant,
}

impl RateTracker {
    pub fn new(cadence: Duration, now: Instant) -> Self {
        Self {
            cadence,
            frames: 0,
            session_start: now,
            last_report: now,
        }
    }

    /// Starts a new streaming session at `now`.
    pub fn start(&mut self, now: Instant) {
        self.frames = 0;
        self.session_start = now;
        self.last_report = now;
    }

    pub fn on_frame(&mut self) {
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn maybe_report(&mut self, now: Instant) -> Option<f64> {
        if now.saturating_duration_since(self.last_report) < self.cadence {
            return None;
        }
        self.last_report = now;

        let elapsed = now.saturating_duration_since(self.session_start).as_secs_f64();
        if elapsed > 0.0 {
            Some(self.frames as f64 / elapsed)
        } else {
            Some(0.0)
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CADENCE, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_fps_over_two_seconds() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(DEFAULT_CADENCE, start);
        for _ in 0..120 {
            tracker.on_frame();
        }

        let fps = tracker.maybe_report(start + Duration::from_secs(2)).unwrap();
        assert!((59.0..=61.0).contains(&fps), "fps={fps}");
    }

    #[test]
    fn no_frames_reports_zero() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(DEFAULT_CADENCE, start);
        assert_eq!(tracker.maybe_report(start + Duration::from_secs(2)), Some(0.0));
    }

    #[test]
    fn zero_cadence_at_start_does_not_divide_by_zero() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(Duration::ZERO, start);
        tracker.on_frame();
        assert_eq!(tracker.maybe_report(start), Some(0.0));
    }

    #[test]
    fn quiet_until_cadence_elapses() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(DEFAULT_CADENCE, start);
        tracker.on_frame();
        assert_eq!(tracker.maybe_report(start + Duration::from_millis(500)), None);
        assert!(tracker.maybe_report(start + Duration::from_millis(1000)).is_some());
        // timer was reset by the report
        assert_eq!(tracker.maybe_report(start + Duration::from_millis(1500)), None);
    }

    #[test]
    fn average_is_cumulative() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(DEFAULT_CADENCE, start);
        for _ in 0..60 {
            tracker.on_frame();
        }
        let first = tracker.maybe_report(start + Duration::from_secs(1)).unwrap();
        assert!((first - 60.0).abs() < 1e-9);

        // no frames in the second second halves the average
        let second = tracker.maybe_report(start + Duration::from_secs(2)).unwrap();
        assert!((second - 30.0).abs() < 1e-9);
        assert_eq!(tracker.frames(), 60);
    }

    #[test]
    fn start_resets_session() {
        let start = Instant::now();
        let mut tracker = RateTracker::new(DEFAULT_CADENCE, start);
        tracker.on_frame();
        tracker.start(start + Duration::from_secs(5));
        assert_eq!(tracker.frames(), 0);
        assert_eq!(tracker.maybe_report(start + Duration::from_secs(6)), Some(0.0));
    }
}
