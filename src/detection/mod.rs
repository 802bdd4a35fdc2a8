use crate::config::Config;
use crate::error::AppError;
use crate::report::{ReportOutcome, ReportSnapshot, StatusReporter};
use crate::sensor::SensorRig;
use crate::state::AppState;
use crate::store::CrowdStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

pub mod crowd;
pub mod debounce;

use crowd::{CrowdClassifier, CrowdVerdict};
use debounce::DebounceFilter;

/// Owns the full detection pipeline: per-sensor debounce filters, the crowd
/// classifier, and the status reporter. Driven by a single periodic tick.
pub struct Monitor {
    filters: Vec<DebounceFilter>,
    classifier: CrowdClassifier,
    reporter: StatusReporter,
}

impl Monitor {
    pub fn new(config: &Config, start: SystemTime) -> Self {
        let filters = config
            .sensor_configs()
            .iter()
            .map(|sensor| {
                DebounceFilter::new(sensor.sensor_id, config.min_detection(), config.crowd_reset())
            })
            .collect();
        let classifier = CrowdClassifier::new(
            config.crowd_detection(),
            config.crowd_reset(),
            config.distance_threshold_cm(),
            start,
        );
        let reporter = StatusReporter::new(
            config.device_id().to_string(),
            config.store.current_status_path.clone(),
            config.store.history_path.clone(),
            config.report_interval(),
        );
        Self {
            filters,
            classifier,
            reporter,
        }
    }

    pub fn verdict(&self) -> CrowdVerdict {
        self.classifier.verdict()
    }

    /// One tick: poll sensors, debounce, classify, publish, report.
    pub fn run_cycle(
        &mut self,
        rig: &mut dyn SensorRig,
        store: &mut dyn CrowdStore,
        state: &Arc<RwLock<AppState>>,
        now: SystemTime,
    ) -> Result<CrowdVerdict, AppError> {
        let scan = rig.poll(now)?;

        for filter in &mut self.filters {
            let sample = scan
                .presence
                .iter()
                .find(|sample| sample.sensor_id == filter.sensor_id());
            // A sensor missing from the scan is a reading gap; the filter's
            // gap rule deals with it on the next sample.
            if let Some(sample) = sample {
                filter.update(sample.active, now);
            }
        }
        let states: Vec<_> = self.filters.iter().map(DebounceFilter::state).collect();

        let verdict = self.classifier.classify(&states, scan.range.as_ref(), now);

        {
            let mut guard = state.write().map_err(|_| AppError::StateLock)?;
            guard.set_states(states)?;
            if let Some(range) = scan.range {
                guard.set_range(range)?;
            }
            guard.set_verdict(verdict)?;
        }

        let outcome = self.reporter.tick(store, &verdict, now);
        match outcome {
            ReportOutcome::NotDue => {}
            ReportOutcome::Unchanged => {
                debug!("Verdict unchanged since last report; skipping writes");
            }
            ReportOutcome::Sent | ReportOutcome::Failed => {
                let mut guard = state.write().map_err(|_| AppError::StateLock)?;
                guard.set_report(ReportSnapshot {
                    outcome,
                    timestamp: now,
                })?;
            }
        }

        Ok(verdict)
    }
}

/// Spawn the periodic monitor thread driving the detection pipeline.
pub fn spawn_monitor_thread(
    mut monitor: Monitor,
    mut rig: Box<dyn SensorRig + Send>,
    mut store: Box<dyn CrowdStore + Send>,
    state: Arc<RwLock<AppState>>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        info!(interval_ms = interval.as_millis(), "Monitor loop started");

        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            if let Err(e) = monitor.run_cycle(&mut *rig, &mut *store, &state, SystemTime::now()) {
                warn!("Error running monitor cycle: {}", e);
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }

        info!("Monitor loop stopped");
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}
