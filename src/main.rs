//! trainerlink - Cycling Sensor Telemetry
//!
//! Main entry point: connects the configured sensors, shows the live overlay in the
//! terminal and optionally records the session to a FIT file.

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trainerlink::recording::{FitRecorder, RecorderConfig, SessionRecorder};
use trainerlink::sensors::{BleTransport, SensorAddress, SensorEvent, SensorHub, SensorProxy};
use trainerlink::storage::config::{get_config_path, load_config, load_config_from, AppConfig};
use trainerlink::ui::Overlay;

const USAGE: &str = "Usage: trainerlink [--config <path>] [--record]";

/// Command line options
#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    record: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--record" | "-r" => cli.record = true,
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(cli)
}

/// Build the hub from the configured sensors. Sensors whose transport is unavailable
/// are skipped with a warning.
async fn build_hub(config: &AppConfig) -> SensorHub {
    let mut hub = SensorHub::new();

    let needs_ble = config
        .sensors
        .iter()
        .any(|s| matches!(s.transport, SensorAddress::Ble { .. }));
    let ble = if needs_ble {
        match BleTransport::initialize().await {
            Ok(transport) => Some(Arc::new(transport)),
            Err(e) => {
                tracing::error!(error = %e, "Bluetooth unavailable");
                None
            }
        }
    } else {
        None
    };

    for sensor in &config.sensors {
        match (&sensor.transport, &ble) {
            (SensorAddress::Ble { .. }, Some(ble)) => hub.add(SensorProxy::new(
                sensor.name.clone(),
                sensor.transport.clone(),
                sensor.metrics.clone(),
                ble.clone(),
                sensor.supervisor_config(),
            )),
            (SensorAddress::Ble { .. }, None) => {
                tracing::warn!(sensor = %sensor.name, "Skipping BLE sensor, no adapter");
            }
            (SensorAddress::AntPlus { .. }, _) => {
                tracing::warn!(sensor = %sensor.name, "Skipping ANT+ sensor, no ANT radio driver");
            }
        }
    }

    hub
}

fn log_event(event: SensorEvent) {
    match event {
        SensorEvent::ConnectionChanged { sensor, state } => {
            tracing::debug!(%sensor, %state, "Sensor state");
        }
        SensorEvent::Failed {
            sensor,
            attempts,
            error,
        } => {
            tracing::warn!(%sensor, attempts, %error, "Sensor stopped, last values frozen");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting trainerlink v{}", env!("CARGO_PKG_VERSION"));

    let args = parse_args(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };

    if config.sensors.is_empty() {
        tracing::warn!(
            "No sensors configured; add [[sensors]] entries to {}",
            get_config_path().display()
        );
    }

    let mut hub = build_hub(&config).await;
    let failures = hub.start_all();
    tracing::info!(
        started = hub.len() - failures.len(),
        configured = config.sensors.len(),
        "Sensors started"
    );

    let events = hub.event_receiver();
    let view = hub.view();
    let shutdown = CancellationToken::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                ctrl_c.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let recorder = args.record.then(|| {
        let sink = FitRecorder::in_dir(&config.recording.output_dir, &Local::now());
        tracing::info!(path = %sink.path().display(), "Recording session");
        let recorder = SessionRecorder::new(
            view.clone(),
            RecorderConfig {
                sample_interval: Duration::from_millis(config.recording.sample_interval_ms),
            },
        );
        tokio::spawn(recorder.run(sink, shutdown.child_token()))
    });

    let overlay = Overlay::from_settings(&config.display);
    let started = Instant::now();
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.display.refresh_interval_ms));

    loop {
        let stop = tokio::select! {
            biased;
            _ = shutdown.cancelled() => true,
            _ = ticker.tick() => false,
        };
        if stop {
            break;
        }

        for event in events.try_iter() {
            log_event(event);
        }

        let record = view.sample(Utc::now());
        // Clear screen, cursor home
        println!("\x1B[2J\x1B[H{}", overlay.render(&record, started.elapsed()));
    }

    hub.shutdown().await;

    if let Some(task) = recorder {
        match task.await {
            Ok(Ok(sink)) => tracing::info!(
                path = %sink.path().display(),
                records = sink.record_count(),
                "Session saved"
            ),
            Ok(Err(e)) => tracing::warn!(error = %e, "Session not saved"),
            Err(e) => tracing::error!(error = %e, "Recorder task failed"),
        }
    }

    tracing::info!("trainerlink stopped");
    Ok(())
}
