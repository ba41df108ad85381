//! Unit tests for configuration loading and validation.

use std::time::Duration;
use tempfile::tempdir;
use trainerlink::sensors::{AntDeviceType, Metric, SensorAddress};
use trainerlink::storage::config::{
    load_config_from, save_config_to, AppConfig, ConfigError, SensorSettings, TireSize,
    WheelSettings,
};

const EXAMPLE: &str = r#"
[[sensors]]
name = "chest strap"
metrics = ["heart_rate"]
transport = { kind = "ble", address = "F1:E2:D3:C4:B5:A6" }

[[sensors]]
name = "wheel hub"
metrics = ["speed", "cadence", "distance"]
connection_retries = 5
retry_delay_ms = 500
wheel = { tire = "700x28" }
transport = { kind = "ant_plus", device_id = 12345, device_type = "speed_cadence" }

[recording]
output_dir = "rides"
sample_interval_ms = 2000

[display]
show_distance = false
"#;

#[test]
fn test_parse_example_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, EXAMPLE).unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.sensors.len(), 2);

    let strap = &config.sensors[0];
    assert_eq!(strap.metrics, vec![Metric::HeartRate]);
    assert_eq!(strap.connection_retries, 3);
    assert_eq!(
        strap.transport,
        SensorAddress::Ble {
            address: "F1:E2:D3:C4:B5:A6".to_string()
        }
    );

    let hub = &config.sensors[1];
    assert_eq!(
        hub.transport,
        SensorAddress::AntPlus {
            device_id: 12345,
            device_type: AntDeviceType::SpeedCadence
        }
    );
    assert_eq!(
        hub.wheel,
        WheelSettings::Tire {
            tire: TireSize::Tire700x28
        }
    );

    let supervisor = hub.supervisor_config();
    assert_eq!(supervisor.retry_bound, 5);
    assert_eq!(supervisor.retry_delay, Duration::from_millis(500));
    assert_eq!(supervisor.wheel_circumference_m, 2.127);

    assert_eq!(config.recording.output_dir, std::path::PathBuf::from("rides"));
    assert_eq!(config.recording.sample_interval_ms, 2000);
    assert!(!config.display.show_distance);
    assert!(config.display.show_heart_rate);
    assert_eq!(config.display.refresh_interval_ms, 500);
}

#[test]
fn test_measured_wheel_circumference() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[sensors]]
name = "speed"
metrics = ["speed"]
wheel = { circumference_m = 2.05 }
transport = { kind = "ble", address = "AA:BB:CC:DD:EE:FF" }
"#,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.sensors[0].wheel.circumference_m(), 2.05);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert!(config.sensors.is_empty());
    assert_eq!(config.recording.sample_interval_ms, 1000);
    assert_eq!(config.display.refresh_interval_ms, 500);
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AppConfig::default();
    let mut sensor = SensorSettings::new(
        "power meter",
        vec![Metric::Power, Metric::Cadence],
        SensorAddress::AntPlus {
            device_id: 4242,
            device_type: AntDeviceType::Power,
        },
    );
    sensor.wheel = WheelSettings::Measured {
        circumference_m: 2.1,
    };
    config.sensors.push(sensor);
    config.display.show_time = false;

    save_config_to(&config, &path).unwrap();
    let loaded = load_config_from(&path).unwrap();

    assert_eq!(loaded.sensors, config.sensors);
    assert_eq!(loaded.display, config.display);
    assert_eq!(loaded.recording, config.recording);
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[[sensors]\nname = ").unwrap();

    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_unknown_metric_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[sensors]]
name = "trainer"
metrics = ["torque"]
transport = { kind = "ble", address = "AA:BB:CC:DD:EE:FF" }
"#,
    )
    .unwrap();

    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_duplicate_sensor_names_rejected() {
    let mut config = AppConfig::default();
    for _ in 0..2 {
        config.sensors.push(SensorSettings::new(
            "hr",
            vec![Metric::HeartRate],
            SensorAddress::Ble {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
            },
        ));
    }

    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_sensor_without_metrics_rejected() {
    let mut config = AppConfig::default();
    config.sensors.push(SensorSettings::new(
        "empty",
        Vec::new(),
        SensorAddress::Ble {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        },
    ));

    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_zero_sample_interval_rejected() {
    let mut config = AppConfig::default();
    config.recording.sample_interval_ms = 0;

    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}
