use crate::api::responses::{
    CrowdLevelCode, HealthErrorCode, HealthErrorResponse, HealthStatus, HealthSuccessResponse,
    SensorOccupancyResponse, StatusErrorCode, StatusErrorResponse, StatusSuccessResponse,
};
use crate::detection::crowd::CrowdLevel;
use crate::sensor::{SensorInfo, SensorStatus};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

pub enum StatusResponse {
    Success(StatusSuccessResponse),
    Error {
        status: StatusCode,
        body: StatusErrorResponse,
    },
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        match self {
            StatusResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            StatusResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_status(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_status_response(state, SystemTime::now())
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

fn build_status_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> StatusResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return status_internal_error("state lock poisoned while reading status", now);
        }
    };

    let verdict = match guard.verdict() {
        Some(verdict) => *verdict,
        None => {
            drop(guard);
            return StatusResponse::Error {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: StatusErrorResponse {
                    error_code: StatusErrorCode::NoData,
                    error_message: "No crowd verdict available yet".to_string(),
                    timestamp: format_timestamp_lossy(now),
                },
            };
        }
    };

    let sensors = guard
        .states()
        .iter()
        .map(|state| SensorOccupancyResponse {
            sensor_id: format!("sensor-{}", state.sensor_id),
            occupied: state.stable_occupied,
        })
        .collect();
    let distance_cm = guard
        .range()
        .filter(|sample| sample.echo.is_valid())
        .map(|sample| sample.distance_cm);
    let device_id = guard.device_id().to_string();
    drop(guard);

    StatusResponse::Success(StatusSuccessResponse {
        device_id,
        level: verdict.level.into(),
        since: format_timestamp_lossy(verdict.since),
        sensors,
        distance_cm,
        timestamp: format_timestamp_lossy(now),
    })
}

fn status_internal_error(message: &str, now: SystemTime) -> StatusResponse {
    error!(message = message, "Internal error while handling /api/status");
    StatusResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: StatusErrorResponse {
            error_code: StatusErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: format_timestamp_lossy(now),
        },
    }
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            error!("Internal error while handling /api/health: state lock poisoned");
            return HealthResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: HealthErrorResponse {
                    error_code: HealthErrorCode::InternalError,
                    error_message: INTERNAL_ERROR_MESSAGE.to_string(),
                    timestamp: format_timestamp_lossy(now),
                },
            };
        }
    };

    let status = derive_health_status(guard.sensors());
    drop(guard);

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            timestamp: format_timestamp_lossy(now),
        },
    }
}

fn derive_health_status(sensors: &[SensorInfo]) -> HealthStatus {
    let ready = sensors
        .iter()
        .filter(|sensor| matches!(sensor.status, SensorStatus::Ready))
        .count();

    if sensors.is_empty() || ready == 0 {
        HealthStatus::Ko
    } else if ready < sensors.len() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn format_timestamp_lossy(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_else(|err| {
            error!(error = %err, "Failed to format response timestamp");
            FALLBACK_TIMESTAMP.to_string()
        })
}

impl From<CrowdLevel> for CrowdLevelCode {
    fn from(level: CrowdLevel) -> Self {
        match level {
            CrowdLevel::Empty => Self::Empty,
            CrowdLevel::Movement => Self::Movement,
            CrowdLevel::Crowded => Self::Crowded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::crowd::CrowdVerdict;
    use crate::detection::debounce::SensorState;
    use crate::sensor::{EchoStatus, RangeSample};
    use std::time::{Duration, UNIX_EPOCH};

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn sensor(sensor_id: u32, status: SensorStatus) -> SensorInfo {
        SensorInfo {
            sensor_id,
            pin: 2,
            status,
        }
    }

    fn populated_state() -> Arc<RwLock<AppState>> {
        let mut state = AppState::new("crowd-sense-001");
        state
            .set_states(vec![
                SensorState {
                    sensor_id: 1,
                    stable_occupied: true,
                    last_transition: Some(at(1_000)),
                },
                SensorState {
                    sensor_id: 2,
                    stable_occupied: false,
                    last_transition: None,
                },
            ])
            .expect("set states");
        state
            .set_range(RangeSample {
                distance_cm: 120,
                echo: EchoStatus::Valid,
                timestamp: at(10_000),
            })
            .expect("set range");
        state
            .set_verdict(CrowdVerdict {
                level: CrowdLevel::Movement,
                since: at(10_000),
                last_confirmed: at(10_500),
            })
            .expect("set verdict");
        Arc::new(RwLock::new(state))
    }

    #[test]
    fn status_reports_verdict_and_sensor_states() {
        let state = populated_state();

        let response = build_status_response(state, at(11_000));

        let body = match response {
            StatusResponse::Success(body) => body,
            StatusResponse::Error { .. } => panic!("expected success response"),
        };
        assert_eq!(body.device_id, "crowd-sense-001");
        assert_eq!(body.level, CrowdLevelCode::Movement);
        assert_eq!(body.sensors.len(), 2);
        assert_eq!(body.sensors[0].sensor_id, "sensor-1");
        assert!(body.sensors[0].occupied);
        assert!(!body.sensors[1].occupied);
        assert_eq!(body.distance_cm, Some(120));
    }

    #[test]
    fn status_without_verdict_returns_no_data() {
        let state = Arc::new(RwLock::new(AppState::new("crowd-sense-001")));

        let response = build_status_response(state, at(0));

        match response {
            StatusResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, StatusErrorCode::NoData);
            }
            StatusResponse::Success(_) => panic!("expected error response"),
        }
    }

    #[test]
    fn status_hides_distance_after_echo_timeout() {
        let state = populated_state();
        {
            let mut guard = state.write().expect("state lock");
            guard
                .set_range(RangeSample {
                    distance_cm: u16::MAX,
                    echo: EchoStatus::Timeout,
                    timestamp: at(10_500),
                })
                .expect("set range");
        }

        let response = build_status_response(state, at(11_000));

        match response {
            StatusResponse::Success(body) => assert_eq!(body.distance_cm, None),
            StatusResponse::Error { .. } => panic!("expected success response"),
        }
    }

    #[test]
    fn health_reflects_sensor_readiness() {
        assert_eq!(derive_health_status(&[]), HealthStatus::Ko);
        assert_eq!(
            derive_health_status(&[sensor(1, SensorStatus::Ready)]),
            HealthStatus::Ok
        );
        assert_eq!(
            derive_health_status(&[
                sensor(1, SensorStatus::Ready),
                sensor(
                    2,
                    SensorStatus::Error {
                        message: "pin busy".to_string()
                    }
                ),
            ]),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn health_without_sensors_is_ko() {
        let state = Arc::new(RwLock::new(AppState::new("crowd-sense-001")));

        let response = build_health_response(state, at(0));

        match response {
            HealthResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.status, HealthStatus::Ko);
            }
            HealthResponse::Error { .. } => panic!("expected success response"),
        }
    }
}
