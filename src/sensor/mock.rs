use crate::error::AppError;
use crate::sensor::{SensorInfo, SensorRig, SensorScan};
use std::collections::VecDeque;
use std::time::SystemTime;

/// Scripted sensor rig for tests: scans are returned in push order, with an
/// empty scan once the script runs out.
pub struct MockSensorRig {
    sensors: Vec<SensorInfo>,
    scans: VecDeque<SensorScan>,
    fail_polls: u32,
}

impl MockSensorRig {
    pub fn new(sensors: Vec<SensorInfo>) -> Self {
        Self {
            sensors,
            scans: VecDeque::new(),
            fail_polls: 0,
        }
    }

    pub fn push_scan(&mut self, scan: SensorScan) {
        self.scans.push_back(scan);
    }

    pub fn fail_next_polls(&mut self, count: u32) {
        self.fail_polls = count;
    }
}

impl SensorRig for MockSensorRig {
    fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    fn poll(&mut self, _now: SystemTime) -> Result<SensorScan, AppError> {
        if self.fail_polls > 0 {
            self.fail_polls -= 1;
            return Err(AppError::Sensor("mock poll failed".to_string()));
        }
        Ok(self.scans.pop_front().unwrap_or_default())
    }
}
