use crate::detection::crowd::{CrowdLevel, CrowdVerdict};
use crate::store::{CrowdStore, StoreError};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Serialize)]
pub struct StatusRecord {
    pub device_id: String,
    pub level: CrowdLevel,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    NotDue,
    Unchanged,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSnapshot {
    pub outcome: ReportOutcome,
    pub timestamp: SystemTime,
}

/// Periodic status publisher. Writes the current status (idempotent
/// overwrite) before appending to history, so a retried report can never
/// duplicate a history record.
#[derive(Debug)]
pub struct StatusReporter {
    device_id: String,
    status_path: String,
    history_path: String,
    interval: Duration,
    last_attempt: Option<SystemTime>,
    last_sent: Option<(CrowdLevel, SystemTime)>,
    pending: Option<(CrowdLevel, SystemTime)>,
}

impl StatusReporter {
    pub fn new(
        device_id: String,
        status_path: String,
        history_path: String,
        interval: Duration,
    ) -> Self {
        Self {
            device_id,
            status_path,
            history_path,
            interval,
            last_attempt: None,
            last_sent: None,
            pending: None,
        }
    }

    pub fn tick(
        &mut self,
        store: &mut dyn CrowdStore,
        verdict: &CrowdVerdict,
        now: SystemTime,
    ) -> ReportOutcome {
        if let Some((level, since)) = self.pending {
            if level != verdict.level || since != verdict.since {
                // The failed record describes a verdict that no longer holds;
                // it is dropped rather than replayed.
                warn!(
                    level = ?level,
                    "Dropping unreported status after verdict change"
                );
                self.pending = None;
            }
        }

        let due = self.pending.is_some()
            || match self.last_attempt {
                Some(at) => now
                    .duration_since(at)
                    .map(|elapsed| elapsed >= self.interval)
                    .unwrap_or(false),
                None => true,
            };
        if !due {
            return ReportOutcome::NotDue;
        }
        self.last_attempt = Some(now);

        if self.pending.is_none() && self.last_sent == Some((verdict.level, verdict.since)) {
            return ReportOutcome::Unchanged;
        }

        let record = StatusRecord {
            device_id: self.device_id.clone(),
            level: verdict.level,
            timestamp: format_timestamp(now),
        };

        match self.send(store, &record) {
            Ok(()) => {
                debug!(level = ?verdict.level, "Status reported");
                self.last_sent = Some((verdict.level, verdict.since));
                self.pending = None;
                ReportOutcome::Sent
            }
            Err(err) => {
                warn!(error = %err, "Status report failed; retrying next tick");
                self.pending = Some((verdict.level, verdict.since));
                ReportOutcome::Failed
            }
        }
    }

    fn send(&self, store: &mut dyn CrowdStore, record: &StatusRecord) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        store.set(&self.status_path, &value)?;
        store.push(&self.history_path, &value)
    }
}

fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_else(|err| {
            warn!(error = %err, "Failed to format report timestamp");
            FALLBACK_TIMESTAMP.to_string()
        })
}
