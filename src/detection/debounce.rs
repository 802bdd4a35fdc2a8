//! Per-sensor debounce with asymmetric windows.
//!
//! A raw signal must hold continuously for the detection window before the
//! stable state flips true, and must stay quiet for the release window before
//! it flips false. Transitions are anchored at the start of the raw run that
//! produced them, so downstream hysteresis can measure from the moment the
//! input actually changed rather than from the moment the filter confirmed it.

use crate::sensor::SensorId;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorState {
    pub sensor_id: SensorId,
    pub stable_occupied: bool,
    /// Start of the raw run behind the last confirmed transition, `None`
    /// until the first transition.
    pub last_transition: Option<SystemTime>,
}

#[derive(Debug)]
pub struct DebounceFilter {
    sensor_id: SensorId,
    detect_window: Duration,
    release_window: Duration,
    stable: bool,
    active_since: Option<SystemTime>,
    inactive_since: Option<SystemTime>,
    last_sample: Option<SystemTime>,
    last_transition: Option<SystemTime>,
}

impl DebounceFilter {
    pub fn new(sensor_id: SensorId, detect_window: Duration, release_window: Duration) -> Self {
        Self {
            sensor_id,
            detect_window,
            release_window,
            stable: false,
            active_since: None,
            inactive_since: None,
            last_sample: None,
            last_transition: None,
        }
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    pub fn state(&self) -> SensorState {
        SensorState {
            sensor_id: self.sensor_id,
            stable_occupied: self.stable,
            last_transition: self.last_transition,
        }
    }

    /// Feed one raw sample. Returns the stable occupancy after the update.
    pub fn update(&mut self, active: bool, now: SystemTime) -> bool {
        if let Some(last) = self.last_sample {
            let gap = now.duration_since(last).unwrap_or(Duration::ZERO);
            // Continuity across a gap longer than the release window is
            // unknown; both run clocks restart.
            if gap > self.release_window {
                self.active_since = None;
                self.inactive_since = None;
            }
        }

        if active {
            self.inactive_since = None;
            let since = *self.active_since.get_or_insert(now);
            if !self.stable {
                let held = now.duration_since(since).unwrap_or(Duration::ZERO);
                if held >= self.detect_window {
                    self.stable = true;
                    self.last_transition = Some(since);
                }
            }
        } else {
            self.active_since = None;
            let since = *self.inactive_since.get_or_insert(now);
            if self.stable {
                let quiet = now.duration_since(since).unwrap_or(Duration::ZERO);
                if quiet >= self.release_window {
                    self.stable = false;
                    self.last_transition = Some(since);
                }
            }
        }

        self.last_sample = Some(now);
        self.stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const DETECT: Duration = Duration::from_millis(10_000);
    const RELEASE: Duration = Duration::from_millis(30_000);
    const STEP_MS: u64 = 500;

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn filter() -> DebounceFilter {
        DebounceFilter::new(1, DETECT, RELEASE)
    }

    #[test]
    fn short_blip_is_rejected() {
        let mut filter = filter();

        let mut ms = 0;
        while ms < 5_000 {
            assert!(!filter.update(true, at(ms)));
            ms += STEP_MS;
        }
        while ms < 40_000 {
            assert!(!filter.update(false, at(ms)));
            ms += STEP_MS;
        }

        assert!(!filter.state().stable_occupied);
        assert_eq!(filter.state().last_transition, None);
    }

    #[test]
    fn flips_true_exactly_when_threshold_crossed() {
        let mut filter = filter();

        let mut flips = 0;
        let mut flipped_at = None;
        let mut previous = false;
        for step in 0..=40 {
            let ms = step * STEP_MS;
            let stable = filter.update(true, at(ms));
            if stable && !previous {
                flips += 1;
                flipped_at = Some(ms);
            }
            previous = stable;
        }

        assert_eq!(flips, 1);
        assert_eq!(flipped_at, Some(10_000));
        // Anchor points at the start of the raw run.
        assert_eq!(filter.state().last_transition, Some(at(0)));
    }

    #[test]
    fn releases_only_after_full_quiet_window() {
        let mut filter = filter();
        let mut ms = 0;
        while ms <= 10_000 {
            filter.update(true, at(ms));
            ms += STEP_MS;
        }
        assert!(filter.state().stable_occupied);

        // Raw goes quiet at 10_500; stable must hold until 40_500.
        while ms < 40_500 {
            assert!(filter.update(false, at(ms)));
            ms += STEP_MS;
        }
        assert!(!filter.update(false, at(40_500)));
        assert_eq!(filter.state().last_transition, Some(at(10_500)));
    }

    #[test]
    fn brief_inactivity_does_not_release() {
        let mut filter = filter();
        let mut ms = 0;
        while ms <= 10_000 {
            filter.update(true, at(ms));
            ms += STEP_MS;
        }

        while ms < 30_000 {
            assert!(filter.update(false, at(ms)));
            ms += STEP_MS;
        }
        // Activity resumes before the release window elapses.
        assert!(filter.update(true, at(30_000)));
        assert!(filter.update(false, at(30_500)));
    }

    #[test]
    fn gap_shorter_than_release_window_keeps_the_run() {
        let mut filter = filter();
        filter.update(true, at(0));
        // Missed polls for 9 seconds, then the signal is still active.
        filter.update(true, at(9_000));
        assert!(filter.update(true, at(10_000)));
    }

    #[test]
    fn gap_longer_than_release_window_restarts_the_run() {
        let mut filter = filter();
        filter.update(true, at(0));
        assert!(!filter.update(true, at(31_000)));
        assert!(!filter.update(true, at(40_500)));
        assert!(filter.update(true, at(41_000)));
    }
}
