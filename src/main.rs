use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crowd_sense::sensor::SensorRig;
use crowd_sense::{api, config, detection, sensor, state, store};

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        "crowd-sense starting"
    );
    // Missing or unusable configuration halts startup here.
    let config = config::load_default()?;
    let state = Arc::new(RwLock::new(state::AppState::new(config.device_id())));

    let rig = build_sensor_rig(&config, &state);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let _monitor_handle = match rig {
        Some(rig) => {
            let store = store::rest::RestStore::new(
                config.store.host.clone(),
                config.store.auth.clone(),
                config.store_timeout(),
            );
            let monitor = detection::Monitor::new(&config, SystemTime::now());
            tracing::info!(
                device_id = config.device_id(),
                store_host = %config.store.host,
                "Starting monitor thread"
            );
            Some(detection::spawn_monitor_thread(
                monitor,
                rig,
                Box::new(store),
                Arc::clone(&state),
                config.range_poll_interval(),
                Arc::clone(&stop_flag),
            ))
        }
        None => {
            tracing::warn!("Monitor thread not started - no sensors available");
            None
        }
    };

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    // Signal monitor thread to stop
    stop_flag.store(true, std::sync::atomic::Ordering::Relaxed);

    Ok(())
}

/// Set up the GPIO sensor rig and publish its inventory, if the platform
/// supports it.
fn build_sensor_rig(
    config: &config::Config,
    state: &Arc<RwLock<state::AppState>>,
) -> Option<Box<dyn sensor::SensorRig + Send>> {
    #[cfg(target_os = "linux")]
    {
        use sensor::gpio::GpioSensorRig;

        let configs = config.sensor_configs();
        tracing::info!(
            count = configs.len(),
            ir_pins = ?config.sensors.ir_pins,
            trigger_pin = config.sensors.trigger_pin,
            echo_pin = config.sensors.echo_pin,
            "Initializing GPIO sensor rig"
        );

        match GpioSensorRig::new(
            &configs,
            config.sensors.trigger_pin,
            config.sensors.echo_pin,
            config.echo_timeout(),
            config.range_poll_interval(),
        ) {
            Ok(rig) => {
                let sensors = rig.sensors().to_vec();
                let ready = sensors
                    .iter()
                    .filter(|s| matches!(s.status, sensor::SensorStatus::Ready))
                    .count();
                tracing::info!(
                    total = sensors.len(),
                    ready = ready,
                    errors = sensors.len() - ready,
                    "Sensor setup complete"
                );
                match state.write() {
                    Ok(mut guard) => {
                        if let Err(err) = guard.set_sensors(sensors) {
                            tracing::warn!(error = %err, "Failed to publish sensor inventory");
                        }
                    }
                    Err(_) => tracing::warn!("State lock poisoned while storing sensors"),
                }
                Some(Box::new(rig))
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to initialize GPIO sensor rig");
                None
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = (config, state);
        tracing::warn!("Sensor rig requires Linux/Raspberry Pi - skipping");
        None
    }
}
