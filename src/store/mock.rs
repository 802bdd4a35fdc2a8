use crate::store::{CrowdStore, StoreError};
use serde_json::Value;
use std::collections::VecDeque;

/// Recording store for tests. Writes are appended in call order; outages are
/// scripted per request, with success once the script runs out.
#[derive(Debug, Default)]
pub struct MockStore {
    sets: Vec<(String, Value)>,
    pushes: Vec<(String, Value)>,
    outages: VecDeque<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of the next request: `true` fails it.
    pub fn script_outage(&mut self, fail: bool) {
        self.outages.push_back(fail);
    }

    /// Fail the next `count` requests, whatever they are.
    pub fn fail_next_requests(&mut self, count: u32) {
        for _ in 0..count {
            self.script_outage(true);
        }
    }

    pub fn sets(&self) -> &[(String, Value)] {
        &self.sets
    }

    pub fn pushes(&self) -> &[(String, Value)] {
        &self.pushes
    }

    fn check_outage(&mut self) -> Result<(), StoreError> {
        if self.outages.pop_front().unwrap_or(false) {
            return Err(StoreError::Http(503, "mock outage".to_string()));
        }
        Ok(())
    }
}

impl CrowdStore for MockStore {
    fn set(&mut self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.check_outage()?;
        self.sets.push((path.to_string(), value.clone()));
        Ok(())
    }

    fn push(&mut self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.check_outage()?;
        self.pushes.push((path.to_string(), value.clone()));
        Ok(())
    }
}
