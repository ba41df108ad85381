//! Text overlay showing elapsed time and the live metrics.

use crate::recording::types::MetricRecord;
use crate::sensors::types::Metric;
use crate::storage::config::DisplaySettings;
use std::time::Duration;

/// Format elapsed time as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Overlay line for the elapsed time
pub fn time_line(elapsed: Duration) -> String {
    format!(" Time: {}", format_elapsed(elapsed))
}

/// Overlay line for one metric. Unset values render as dashes.
pub fn metric_line(metric: Metric, value: Option<f64>) -> String {
    match (metric, value) {
        (Metric::HeartRate, Some(bpm)) => format!("   HR: {}BPM", bpm.round() as u32),
        (Metric::HeartRate, None) => "   HR: ---BPM".to_string(),
        (Metric::Power, Some(watts)) => format!("Power: {}W", watts.round() as u32),
        (Metric::Power, None) => "Power: ---W".to_string(),
        (Metric::Cadence, Some(rpm)) => format!("  Cad: {}RPM", rpm.round() as u32),
        (Metric::Cadence, None) => "  Cad: ---RPM".to_string(),
        (Metric::Speed, Some(kmh)) => format!("Speed: {:.2}km/h", kmh),
        (Metric::Speed, None) => "Speed: --.-km/h".to_string(),
        (Metric::Distance, Some(km)) => format!(" Dist: {:.2}km", km),
        (Metric::Distance, None) => " Dist: ---.--km".to_string(),
    }
}

/// Which lines the overlay shows.
#[derive(Debug, Clone)]
pub struct Overlay {
    show_time: bool,
    visible: Vec<Metric>,
}

impl Overlay {
    /// Overlay showing the time and every metric
    pub fn new() -> Self {
        Self {
            show_time: true,
            visible: Metric::ALL.to_vec(),
        }
    }

    pub fn from_settings(settings: &DisplaySettings) -> Self {
        let flags = [
            (Metric::HeartRate, settings.show_heart_rate),
            (Metric::Power, settings.show_power),
            (Metric::Cadence, settings.show_cadence),
            (Metric::Speed, settings.show_speed),
            (Metric::Distance, settings.show_distance),
        ];
        Self {
            show_time: settings.show_time,
            visible: flags
                .into_iter()
                .filter_map(|(metric, shown)| shown.then_some(metric))
                .collect(),
        }
    }

    pub fn is_visible(&self, metric: Metric) -> bool {
        self.visible.contains(&metric)
    }

    /// Overlay lines for one sample
    pub fn lines(&self, record: &MetricRecord, elapsed: Duration) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.visible.len() + 1);
        if self.show_time {
            lines.push(time_line(elapsed));
        }
        for &metric in &self.visible {
            let value = match metric {
                Metric::HeartRate => record.heart_rate_bpm.map(f64::from),
                Metric::Power => record.power_watts.map(f64::from),
                Metric::Cadence => record.cadence_rpm,
                Metric::Speed => record.speed_kmh,
                Metric::Distance => record.distance_km,
            };
            lines.push(metric_line(metric, value));
        }
        lines
    }

    /// Lines joined for terminal output
    pub fn render(&self, record: &MetricRecord, elapsed: Duration) -> String {
        self.lines(record, elapsed).join("\n")
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}
