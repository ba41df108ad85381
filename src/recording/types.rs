//! Recording types for session capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of the session recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingStatus {
    /// Not recording
    #[default]
    Idle,
    /// Actively recording
    Recording,
    /// Finishing up (writing the file)
    Finishing,
}

/// One sampled set of metric values. `None` means the metric has no value yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Wall-clock time of the sample
    pub timestamp: DateTime<Utc>,
    /// Heart rate in BPM
    pub heart_rate_bpm: Option<u16>,
    /// Instantaneous power in watts
    pub power_watts: Option<u16>,
    /// Cadence in RPM
    pub cadence_rpm: Option<f64>,
    /// Speed in km/h
    pub speed_kmh: Option<f64>,
    /// Cumulative distance in km
    pub distance_km: Option<f64>,
}

impl MetricRecord {
    /// A record with no values at `timestamp`
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            heart_rate_bpm: None,
            power_watts: None,
            cadence_rpm: None,
            speed_kmh: None,
            distance_km: None,
        }
    }
}

/// Errors that can occur during recording.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Already recording
    #[error("Recording already in progress")]
    AlreadyRecording,

    /// Not currently recording
    #[error("Not currently recording")]
    NotRecording,

    /// No samples recorded
    #[error("No data recorded")]
    NoData,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
