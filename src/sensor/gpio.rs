use crate::error::AppError;
use crate::sensor::{SensorInfo, SensorRig, SensorScan};
use std::time::{Duration, SystemTime};

#[cfg(target_os = "linux")]
use crate::sensor::{
    EchoStatus, NO_ECHO_DISTANCE_CM, PresenceSample, RangeSample, SensorConfig, SensorId,
    SensorStatus,
};
#[cfg(target_os = "linux")]
use rppal::gpio::{Gpio, InputPin, OutputPin};
#[cfg(target_os = "linux")]
use std::time::Instant;
#[cfg(target_os = "linux")]
use tracing::{debug, warn};

/// Echo round-trip time to distance: ~58 microseconds per centimeter.
#[cfg(target_os = "linux")]
const ECHO_US_PER_CM: f64 = 58.0;
#[cfg(target_os = "linux")]
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

#[cfg(target_os = "linux")]
pub struct GpioSensorRig {
    sensors: Vec<SensorInfo>,
    inputs: Vec<(SensorId, InputPin)>,
    trigger: OutputPin,
    echo: InputPin,
    echo_timeout: Duration,
    range_interval: Duration,
    last_range_poll: Option<SystemTime>,
}

#[cfg(target_os = "linux")]
impl GpioSensorRig {
    pub fn new(
        presence: &[SensorConfig],
        trigger_pin: u8,
        echo_pin: u8,
        echo_timeout: Duration,
        range_interval: Duration,
    ) -> Result<Self, AppError> {
        let gpio = Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;

        let mut sensors = Vec::with_capacity(presence.len());
        let mut inputs = Vec::with_capacity(presence.len());
        for config in presence {
            // IR modules are open-collector: pulled low on detection.
            match gpio.get(config.pin) {
                Ok(pin) => {
                    inputs.push((config.sensor_id, pin.into_input_pullup()));
                    sensors.push(SensorInfo {
                        sensor_id: config.sensor_id,
                        pin: config.pin,
                        status: SensorStatus::Ready,
                    });
                }
                Err(err) => {
                    warn!(
                        sensor_id = config.sensor_id,
                        pin = config.pin,
                        error = %err,
                        "Failed to claim IR sensor pin"
                    );
                    sensors.push(SensorInfo {
                        sensor_id: config.sensor_id,
                        pin: config.pin,
                        status: SensorStatus::Error {
                            message: err.to_string(),
                        },
                    });
                }
            }
        }

        if inputs.is_empty() {
            return Err(AppError::Gpio(
                "no presence sensor pins could be claimed".to_string(),
            ));
        }

        let trigger = gpio
            .get(trigger_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_output_low();
        let echo = gpio
            .get(echo_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_input();

        Ok(Self {
            sensors,
            inputs,
            trigger,
            echo,
            echo_timeout,
            range_interval,
            last_range_poll: None,
        })
    }

    fn range_due(&self, now: SystemTime) -> bool {
        match self.last_range_poll {
            Some(last) => now
                .duration_since(last)
                .map(|elapsed| elapsed >= self.range_interval)
                .unwrap_or(true),
            None => true,
        }
    }

    fn measure_range(&mut self, now: SystemTime) -> RangeSample {
        self.trigger.set_high();
        std::thread::sleep(TRIGGER_PULSE);
        self.trigger.set_low();

        let wait_start = Instant::now();
        while self.echo.is_low() {
            if wait_start.elapsed() >= self.echo_timeout {
                debug!("No echo within timeout");
                return RangeSample {
                    distance_cm: NO_ECHO_DISTANCE_CM,
                    echo: EchoStatus::Timeout,
                    timestamp: now,
                };
            }
        }

        let pulse_start = Instant::now();
        while self.echo.is_high() {
            if pulse_start.elapsed() >= self.echo_timeout {
                return RangeSample {
                    distance_cm: NO_ECHO_DISTANCE_CM,
                    echo: EchoStatus::Timeout,
                    timestamp: now,
                };
            }
        }

        let pulse_us = pulse_start.elapsed().as_micros() as f64;
        RangeSample {
            distance_cm: (pulse_us / ECHO_US_PER_CM) as u16,
            echo: EchoStatus::Valid,
            timestamp: now,
        }
    }
}

#[cfg(target_os = "linux")]
impl SensorRig for GpioSensorRig {
    fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    fn poll(&mut self, now: SystemTime) -> Result<SensorScan, AppError> {
        let mut presence = Vec::with_capacity(self.inputs.len());
        for (sensor_id, pin) in &self.inputs {
            presence.push(PresenceSample {
                sensor_id: *sensor_id,
                active: pin.is_low(),
                timestamp: now,
            });
        }

        let range = if self.range_due(now) {
            self.last_range_poll = Some(now);
            Some(self.measure_range(now))
        } else {
            None
        };

        Ok(SensorScan { presence, range })
    }
}

#[cfg(not(target_os = "linux"))]
pub struct GpioSensorRig;

#[cfg(not(target_os = "linux"))]
impl GpioSensorRig {
    pub fn new(
        _presence: &[crate::sensor::SensorConfig],
        _trigger_pin: u8,
        _echo_pin: u8,
        _echo_timeout: Duration,
        _range_interval: Duration,
    ) -> Result<Self, AppError> {
        Err(AppError::Gpio(
            "GPIO sensor rig requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl SensorRig for GpioSensorRig {
    fn sensors(&self) -> &[SensorInfo] {
        &[]
    }

    fn poll(&mut self, _now: SystemTime) -> Result<SensorScan, AppError> {
        Err(AppError::Gpio(
            "GPIO sensor rig requires Linux/Raspberry Pi".to_string(),
        ))
    }
}
