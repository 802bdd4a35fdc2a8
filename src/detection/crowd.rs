//! Crowd-level classification with transition hysteresis.
//!
//! The classifier consumes the debounced per-sensor states plus the latest
//! range sample and maintains the EMPTY/MOVEMENT/CROWDED verdict. Activity and
//! absence clocks are backdated to the transition anchors the debounce layer
//! records, so the detection and reset windows measure from the moment raw
//! input changed.

use crate::detection::debounce::SensorState;
use crate::sensor::RangeSample;
use serde::Serialize;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrowdLevel {
    Empty,
    Movement,
    Crowded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrowdVerdict {
    pub level: CrowdLevel,
    /// When the current level was entered; changes only on level transitions.
    pub since: SystemTime,
    /// Last instant the input re-confirmed the current level.
    pub last_confirmed: SystemTime,
}

#[derive(Debug)]
pub struct CrowdClassifier {
    detect_window: Duration,
    reset_window: Duration,
    distance_threshold_cm: u16,
    verdict: CrowdVerdict,
    activity_since: Option<SystemTime>,
    quiet_since: Option<SystemTime>,
    last_range: Option<RangeSample>,
    last_close: Option<SystemTime>,
}

impl CrowdClassifier {
    pub fn new(
        detect_window: Duration,
        reset_window: Duration,
        distance_threshold_cm: u16,
        start: SystemTime,
    ) -> Self {
        Self {
            detect_window,
            reset_window,
            distance_threshold_cm,
            verdict: CrowdVerdict {
                level: CrowdLevel::Empty,
                since: start,
                last_confirmed: start,
            },
            activity_since: None,
            quiet_since: None,
            last_range: None,
            last_close: None,
        }
    }

    pub fn verdict(&self) -> CrowdVerdict {
        self.verdict
    }

    /// Classify the current tick. Level transitions advance one step at a
    /// time, so sustained occupancy always passes through MOVEMENT.
    pub fn classify(
        &mut self,
        states: &[SensorState],
        range: Option<&RangeSample>,
        now: SystemTime,
    ) -> CrowdVerdict {
        if let Some(sample) = range {
            self.last_range = Some(*sample);
        }

        let close_range = self
            .last_range
            .map(|sample| sample.echo.is_valid() && sample.distance_cm < self.distance_threshold_cm)
            .unwrap_or(false);
        let any_occupied = states.iter().any(|state| state.stable_occupied);
        let active = any_occupied || close_range;

        if close_range {
            self.last_close = Some(now);
        }

        if active {
            self.quiet_since = None;
            if self.activity_since.is_none() {
                self.activity_since = Some(self.activity_anchor(states, now));
            }
        } else {
            self.activity_since = None;
            if self.quiet_since.is_none() {
                self.quiet_since = Some(self.quiet_anchor(states, now));
            }
        }

        match self.verdict.level {
            CrowdLevel::Empty => {
                if active {
                    self.transition(CrowdLevel::Movement, now);
                } else {
                    self.verdict.last_confirmed = now;
                }
            }
            CrowdLevel::Movement => {
                if active {
                    if self.activity_held(now) >= self.detect_window {
                        self.transition(CrowdLevel::Crowded, now);
                    } else {
                        self.verdict.last_confirmed = now;
                    }
                } else if self.quiet_held(now) >= self.reset_window {
                    self.transition(CrowdLevel::Empty, now);
                }
            }
            CrowdLevel::Crowded => {
                if active {
                    self.verdict.last_confirmed = now;
                } else if self.quiet_held(now) >= self.reset_window {
                    self.transition(CrowdLevel::Empty, now);
                }
            }
        }

        self.verdict
    }

    fn transition(&mut self, level: CrowdLevel, now: SystemTime) {
        self.verdict = CrowdVerdict {
            level,
            since: now,
            last_confirmed: now,
        };
    }

    /// Earliest raw onset among the currently occupied sensors; `now` when the
    /// range condition is the only contributor.
    fn activity_anchor(&self, states: &[SensorState], now: SystemTime) -> SystemTime {
        states
            .iter()
            .filter(|state| state.stable_occupied)
            .filter_map(|state| state.last_transition)
            .min()
            .map(|anchor| anchor.min(now))
            .unwrap_or(now)
    }

    /// Latest instant raw detection was still present: release anchors of the
    /// now-quiet sensors, or the last close-range observation.
    fn quiet_anchor(&self, states: &[SensorState], now: SystemTime) -> SystemTime {
        let sensor_quiet = states
            .iter()
            .filter(|state| !state.stable_occupied)
            .filter_map(|state| state.last_transition)
            .max();

        match (sensor_quiet, self.last_close) {
            (Some(sensor), Some(close)) => sensor.max(close),
            (Some(sensor), None) => sensor,
            (None, Some(close)) => close,
            (None, None) => now,
        }
        .min(now)
    }

    fn activity_held(&self, now: SystemTime) -> Duration {
        self.activity_since
            .and_then(|since| now.duration_since(since).ok())
            .unwrap_or(Duration::ZERO)
    }

    fn quiet_held(&self, now: SystemTime) -> Duration {
        self.quiet_since
            .and_then(|since| now.duration_since(since).ok())
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::EchoStatus;
    use std::time::UNIX_EPOCH;

    const DETECT: Duration = Duration::from_millis(15_000);
    const RESET: Duration = Duration::from_millis(30_000);
    const THRESHOLD_CM: u16 = 50;

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn classifier() -> CrowdClassifier {
        CrowdClassifier::new(DETECT, RESET, THRESHOLD_CM, at(0))
    }

    fn occupied(anchor_ms: u64) -> SensorState {
        SensorState {
            sensor_id: 1,
            stable_occupied: true,
            last_transition: Some(at(anchor_ms)),
        }
    }

    fn vacant(anchor_ms: Option<u64>) -> SensorState {
        SensorState {
            sensor_id: 1,
            stable_occupied: false,
            last_transition: anchor_ms.map(at),
        }
    }

    fn range(distance_cm: u16, echo: EchoStatus, ms: u64) -> RangeSample {
        RangeSample {
            distance_cm,
            echo,
            timestamp: at(ms),
        }
    }

    #[test]
    fn starts_empty() {
        let classifier = classifier();
        assert_eq!(classifier.verdict().level, CrowdLevel::Empty);
        assert_eq!(classifier.verdict().since, at(0));
    }

    #[test]
    fn first_occupancy_enters_movement() {
        let mut classifier = classifier();

        let verdict = classifier.classify(&[occupied(0)], None, at(10_000));

        assert_eq!(verdict.level, CrowdLevel::Movement);
        assert_eq!(verdict.since, at(10_000));
    }

    #[test]
    fn sustained_occupancy_promotes_through_movement() {
        let mut classifier = classifier();
        let mut levels = Vec::new();

        // Debounce confirms at 10s with the raw run anchored at 0.
        let mut ms = 10_000;
        while ms <= 20_000 {
            let verdict = classifier.classify(&[occupied(0)], None, at(ms));
            levels.push((ms, verdict.level));
            ms += 500;
        }

        assert_eq!(levels.first().map(|(_, l)| *l), Some(CrowdLevel::Movement));
        // Promotion lands when the raw run has held for the full window.
        assert!(
            levels
                .iter()
                .find(|(_, level)| *level == CrowdLevel::Crowded)
                .map(|(ms, _)| *ms)
                == Some(15_000)
        );
        assert!(!levels.iter().any(|(ms, level)| *ms < 15_000 && *level == CrowdLevel::Crowded));
    }

    #[test]
    fn close_range_alone_drives_the_verdict() {
        let mut classifier = classifier();
        let states = [vacant(None)];

        let mut ms = 0;
        let mut verdict = classifier.verdict();
        while ms <= 15_000 {
            let sample = range(30, EchoStatus::Valid, ms);
            verdict = classifier.classify(&states, Some(&sample), at(ms));
            ms += 500;
        }

        assert_eq!(verdict.level, CrowdLevel::Crowded);
    }

    #[test]
    fn echo_timeout_never_counts_as_close() {
        let mut classifier = classifier();
        let states = [vacant(None)];

        let mut ms = 0;
        let mut verdict = classifier.verdict();
        while ms <= 20_000 {
            let sample = range(10, EchoStatus::Timeout, ms);
            verdict = classifier.classify(&states, Some(&sample), at(ms));
            ms += 500;
        }

        assert_eq!(verdict.level, CrowdLevel::Empty);
    }

    #[test]
    fn crowded_holds_through_gaps_shorter_than_reset() {
        let mut classifier = classifier();
        classifier.classify(&[occupied(0)], None, at(10_000));
        classifier.classify(&[occupied(0)], None, at(15_000));
        assert_eq!(classifier.verdict().level, CrowdLevel::Crowded);

        // Sensors release at 60s, anchored to raw quiet at 40s.
        let verdict = classifier.classify(&[vacant(Some(40_000))], None, at(60_000));
        assert_eq!(verdict.level, CrowdLevel::Crowded);

        // Activity returns before the reset window runs out.
        let verdict = classifier.classify(&[occupied(62_000)], None, at(62_000));
        assert_eq!(verdict.level, CrowdLevel::Crowded);
        assert_eq!(verdict.since, at(15_000));
    }

    #[test]
    fn quiet_for_reset_window_returns_to_empty() {
        let mut classifier = classifier();
        classifier.classify(&[occupied(0)], None, at(10_000));
        classifier.classify(&[occupied(0)], None, at(15_000));
        assert_eq!(classifier.verdict().level, CrowdLevel::Crowded);

        // Raw detection ceased at 20s; the release fires at 50s and the
        // backdated anchor makes the reset window complete immediately.
        let verdict = classifier.classify(&[vacant(Some(20_000))], None, at(50_000));
        assert_eq!(verdict.level, CrowdLevel::Empty);
        assert_eq!(verdict.since, at(50_000));
    }

    #[test]
    fn since_changes_only_on_transitions() {
        let mut classifier = classifier();

        let first = classifier.classify(&[occupied(0)], None, at(10_000));
        let second = classifier.classify(&[occupied(0)], None, at(10_500));

        assert_eq!(first.level, CrowdLevel::Movement);
        assert_eq!(second.level, CrowdLevel::Movement);
        assert_eq!(second.since, first.since);
        assert_eq!(second.last_confirmed, at(10_500));
    }

    #[test]
    fn level_serializes_screaming_snake_case() {
        let json = serde_json::to_value(CrowdLevel::Movement).expect("serialize level");
        assert_eq!(json, serde_json::json!("MOVEMENT"));
    }
}
