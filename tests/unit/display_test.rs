//! Unit tests for the metric overlay.

use chrono::Utc;
use std::time::Duration;
use trainerlink::recording::MetricRecord;
use trainerlink::sensors::Metric;
use trainerlink::storage::config::DisplaySettings;
use trainerlink::ui::{format_elapsed, metric_line, Overlay};

#[test]
fn test_format_elapsed() {
    assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
    assert_eq!(format_elapsed(Duration::from_secs(59)), "00:00:59");
    assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
    assert_eq!(format_elapsed(Duration::from_millis(1999)), "00:00:01");
}

#[test]
fn test_metric_lines_with_values() {
    assert_eq!(metric_line(Metric::HeartRate, Some(142.0)), "   HR: 142BPM");
    assert_eq!(metric_line(Metric::Power, Some(251.0)), "Power: 251W");
    assert_eq!(metric_line(Metric::Cadence, Some(89.6)), "  Cad: 90RPM");
    assert_eq!(metric_line(Metric::Speed, Some(32.456)), "Speed: 32.46km/h");
    assert_eq!(metric_line(Metric::Distance, Some(12.5)), " Dist: 12.50km");
}

#[test]
fn test_unset_metrics_render_placeholders() {
    for metric in Metric::ALL {
        let line = metric_line(metric, None);
        assert!(line.contains("--"), "{line}");
    }
    assert_eq!(metric_line(Metric::HeartRate, None), "   HR: ---BPM");
}

#[test]
fn test_overlay_lines_in_display_order() {
    let mut record = MetricRecord::empty(Utc::now());
    record.heart_rate_bpm = Some(130);
    record.speed_kmh = Some(28.0);

    let lines = Overlay::new().lines(&record, Duration::from_secs(61));

    assert_eq!(
        lines,
        vec![
            " Time: 00:01:01".to_string(),
            "   HR: 130BPM".to_string(),
            "Power: ---W".to_string(),
            "  Cad: ---RPM".to_string(),
            "Speed: 28.00km/h".to_string(),
            " Dist: ---.--km".to_string(),
        ]
    );
}

#[test]
fn test_overlay_hides_disabled_lines() {
    let settings = DisplaySettings {
        show_time: false,
        show_power: false,
        show_distance: false,
        ..Default::default()
    };
    let overlay = Overlay::from_settings(&settings);

    assert!(!overlay.is_visible(Metric::Power));
    assert!(overlay.is_visible(Metric::HeartRate));

    let rendered = overlay.render(&MetricRecord::empty(Utc::now()), Duration::ZERO);
    assert_eq!(rendered.lines().count(), 3);
    assert!(!rendered.contains("Time"));
    assert!(!rendered.contains("Power"));
}
