use crate::detection::crowd::CrowdVerdict;
use crate::detection::debounce::SensorState;
use crate::error::AppError;
use crate::report::ReportSnapshot;
use crate::sensor::{RangeSample, SensorInfo};
use tokio::sync::watch;

#[derive(Debug)]
pub struct AppState {
    device_id: String,
    sensors: Vec<SensorInfo>,
    sensors_tx: watch::Sender<Vec<SensorInfo>>,
    _sensors_rx: watch::Receiver<Vec<SensorInfo>>,
    states: Vec<SensorState>,
    states_tx: watch::Sender<Vec<SensorState>>,
    _states_rx: watch::Receiver<Vec<SensorState>>,
    range: Option<RangeSample>,
    range_tx: watch::Sender<Option<RangeSample>>,
    _range_rx: watch::Receiver<Option<RangeSample>>,
    verdict: Option<CrowdVerdict>,
    verdict_tx: watch::Sender<Option<CrowdVerdict>>,
    _verdict_rx: watch::Receiver<Option<CrowdVerdict>>,
    report: Option<ReportSnapshot>,
    report_tx: watch::Sender<Option<ReportSnapshot>>,
    _report_rx: watch::Receiver<Option<ReportSnapshot>>,
}

impl AppState {
    pub fn new(device_id: impl Into<String>) -> Self {
        let (sensors_tx, _sensors_rx) = watch::channel(Vec::new());
        let (states_tx, _states_rx) = watch::channel(Vec::new());
        let (range_tx, _range_rx) = watch::channel(None);
        let (verdict_tx, _verdict_rx) = watch::channel(None);
        let (report_tx, _report_rx) = watch::channel(None);
        Self {
            device_id: device_id.into(),
            sensors: Vec::new(),
            sensors_tx,
            _sensors_rx,
            states: Vec::new(),
            states_tx,
            _states_rx,
            range: None,
            range_tx,
            _range_rx,
            verdict: None,
            verdict_tx,
            _verdict_rx,
            report: None,
            report_tx,
            _report_rx,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    pub fn subscribe_sensors(&self) -> watch::Receiver<Vec<SensorInfo>> {
        self.sensors_tx.subscribe()
    }

    pub fn set_sensors(&mut self, sensors: Vec<SensorInfo>) -> Result<(), AppError> {
        self.sensors = sensors.clone();
        self.sensors_tx
            .send(sensors)
            .map_err(|_| AppError::WatchSend)
    }

    pub fn states(&self) -> &[SensorState] {
        &self.states
    }

    pub fn subscribe_states(&self) -> watch::Receiver<Vec<SensorState>> {
        self.states_tx.subscribe()
    }

    pub fn set_states(&mut self, states: Vec<SensorState>) -> Result<(), AppError> {
        self.states = states.clone();
        self.states_tx.send(states).map_err(|_| AppError::WatchSend)
    }

    pub fn range(&self) -> Option<&RangeSample> {
        self.range.as_ref()
    }

    pub fn subscribe_range(&self) -> watch::Receiver<Option<RangeSample>> {
        self.range_tx.subscribe()
    }

    pub fn set_range(&mut self, range: RangeSample) -> Result<(), AppError> {
        self.range = Some(range);
        self.range_tx
            .send(Some(range))
            .map_err(|_| AppError::WatchSend)
    }

    pub fn verdict(&self) -> Option<&CrowdVerdict> {
        self.verdict.as_ref()
    }

    pub fn subscribe_verdict(&self) -> watch::Receiver<Option<CrowdVerdict>> {
        self.verdict_tx.subscribe()
    }

    pub fn set_verdict(&mut self, verdict: CrowdVerdict) -> Result<(), AppError> {
        self.verdict = Some(verdict);
        self.verdict_tx
            .send(Some(verdict))
            .map_err(|_| AppError::WatchSend)
    }

    pub fn report(&self) -> Option<&ReportSnapshot> {
        self.report.as_ref()
    }

    pub fn subscribe_report(&self) -> watch::Receiver<Option<ReportSnapshot>> {
        self.report_tx.subscribe()
    }

    pub fn set_report(&mut self, report: ReportSnapshot) -> Result<(), AppError> {
        self.report = Some(report);
        self.report_tx
            .send(Some(report))
            .map_err(|_| AppError::WatchSend)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(String::new())
    }
}
