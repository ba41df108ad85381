//! FIT activity file writer.
//!
//! Implements the subset of the FIT (Flexible and Interoperable Data Transfer) binary
//! format needed for a cycling activity:
//! - File header and CRC
//! - File id, file creator and device info
//! - Timer start/stop events around one record message per sample
//! - Lap, session and activity summaries

use crate::recording::types::{MetricRecord, RecorderError, RecordingStatus};
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

/// FIT epoch offset: FIT timestamps are seconds since 1989-12-31 00:00:00 UTC
const FIT_EPOCH_OFFSET: i64 = 631065600;

/// FIT file header size
const FIT_HEADER_SIZE: u8 = 14;

/// FIT protocol version
const FIT_PROTOCOL_VERSION: u8 = 0x20; // 2.0

/// FIT profile version (21.00)
const FIT_PROFILE_VERSION: u16 = 2100;

/// Manufacturer id reserved for development
const MANUFACTURER_DEVELOPMENT: u16 = 255;

/// Product name written to the device info message
pub const DEFAULT_PRODUCT_NAME: &str = "trainerlink";

/// Fixed width of the product name string field
const PRODUCT_NAME_LEN: usize = 16;

/// FIT message types
mod message_type {
    pub const FILE_ID: u16 = 0;
    pub const SESSION: u16 = 18;
    pub const LAP: u16 = 19;
    pub const RECORD: u16 = 20;
    pub const EVENT: u16 = 21;
    pub const DEVICE_INFO: u16 = 23;
    pub const ACTIVITY: u16 = 34;
    pub const FILE_CREATOR: u16 = 49;
}

/// Record message fields
mod field_type {
    pub const TIMESTAMP: u8 = 253;
    pub const HEART_RATE: u8 = 3;
    pub const CADENCE: u8 = 4;
    pub const DISTANCE: u8 = 5;
    pub const SPEED: u8 = 6;
    pub const POWER: u8 = 7;
}

/// FIT base types
mod base_type {
    pub const ENUM: u8 = 0x00;
    pub const UINT8: u8 = 0x02;
    pub const STRING: u8 = 0x07;
    pub const UINT16: u8 = 0x84;
    pub const UINT32: u8 = 0x86;
}

/// Invalid values per base type
const INVALID_U8: u8 = 0xFF;
const INVALID_U16: u16 = 0xFFFF;

/// Local message numbers
mod local {
    pub const FILE_ID: u8 = 0;
    pub const FILE_CREATOR: u8 = 1;
    pub const DEVICE_INFO: u8 = 2;
    pub const EVENT: u8 = 3;
    pub const RECORD: u8 = 4;
    pub const LAP: u8 = 5;
    pub const SESSION: u8 = 6;
    pub const ACTIVITY: u8 = 7;
}

/// Calculate CRC-16 for FIT data
pub fn calculate_crc(data: &[u8]) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];

    data.iter().fold(0u16, |mut crc, byte| {
        for nibble in [byte & 0x0F, byte >> 4] {
            let tmp = CRC_TABLE[(crc & 0xF) as usize];
            crc = (crc >> 4) & 0x0FFF;
            crc = crc ^ tmp ^ CRC_TABLE[nibble as usize];
        }
        crc
    })
}

/// Convert DateTime to FIT timestamp
pub fn fit_timestamp(dt: DateTime<Utc>) -> u32 {
    (dt.timestamp() - FIT_EPOCH_OFFSET).max(0) as u32
}

/// In-memory FIT message encoder
struct FitEncoder {
    buf: Vec<u8>,
}

impl FitEncoder {
    fn new() -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.push(FIT_HEADER_SIZE);
        buf.push(FIT_PROTOCOL_VERSION);
        buf.extend_from_slice(&FIT_PROFILE_VERSION.to_le_bytes());
        // Data size and header CRC are filled in by `finish`
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b".FIT");
        buf.extend_from_slice(&0u16.to_le_bytes());
        Self { buf }
    }

    /// Definition message; `fields` are (field_def_num, size, base_type)
    fn define(&mut self, local_mesg_num: u8, global_mesg_num: u16, fields: &[(u8, u8, u8)]) {
        self.buf.push(0x40 | (local_mesg_num & 0x0F));
        self.buf.push(0); // reserved
        self.buf.push(0); // little endian
        self.u16(global_mesg_num);
        self.buf.push(fields.len() as u8);
        for &(field_num, size, base_type) in fields {
            self.buf.extend_from_slice(&[field_num, size, base_type]);
        }
    }

    fn data(&mut self, local_mesg_num: u8) {
        self.buf.push(local_mesg_num & 0x0F);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Null-padded fixed-width string
    fn string(&mut self, value: &str, width: usize) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(width - 1);
        self.buf.extend_from_slice(&bytes[..len]);
        self.buf.resize(self.buf.len() + (width - len), 0);
    }

    fn finish(mut self) -> Vec<u8> {
        let data_size = (self.buf.len() - FIT_HEADER_SIZE as usize) as u32;
        self.buf[4..8].copy_from_slice(&data_size.to_le_bytes());

        let header_crc = calculate_crc(&self.buf[0..12]);
        self.buf[12..14].copy_from_slice(&header_crc.to_le_bytes());

        let file_crc = calculate_crc(&self.buf);
        self.buf.extend_from_slice(&file_crc.to_le_bytes());
        self.buf
    }
}

/// Running summary of the recorded values
#[derive(Debug, Clone, Default)]
struct SessionStats {
    hr_sum: u64,
    hr_count: u64,
    hr_max: Option<u16>,
    power_sum: u64,
    power_count: u64,
    power_max: Option<u16>,
    cadence_sum: f64,
    cadence_count: u64,
    distance_km: Option<f64>,
}

impl SessionStats {
    fn from_records(records: &[MetricRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            if let Some(hr) = record.heart_rate_bpm {
                stats.hr_sum += hr as u64;
                stats.hr_count += 1;
                stats.hr_max = stats.hr_max.max(Some(hr));
            }
            if let Some(power) = record.power_watts {
                stats.power_sum += power as u64;
                stats.power_count += 1;
                stats.power_max = stats.power_max.max(Some(power));
            }
            if let Some(cadence) = record.cadence_rpm {
                stats.cadence_sum += cadence;
                stats.cadence_count += 1;
            }
            if record.distance_km.is_some() {
                stats.distance_km = record.distance_km;
            }
        }
        stats
    }

    fn avg_hr(&self) -> Option<u16> {
        (self.hr_count > 0).then(|| (self.hr_sum / self.hr_count) as u16)
    }

    fn avg_power(&self) -> Option<u16> {
        (self.power_count > 0).then(|| (self.power_sum / self.power_count) as u16)
    }

    fn avg_cadence(&self) -> Option<f64> {
        (self.cadence_count > 0).then(|| self.cadence_sum / self.cadence_count as f64)
    }
}

fn hr_field(bpm: Option<u16>) -> u8 {
    bpm.map(|b| b.min(254) as u8).unwrap_or(INVALID_U8)
}

fn cadence_field(rpm: Option<f64>) -> u8 {
    rpm.map(|c| c.round().clamp(0.0, 254.0) as u8)
        .unwrap_or(INVALID_U8)
}

/// Speed in 1000 * m/s
fn speed_field(kmh: Option<f64>) -> u16 {
    kmh.map(|s| (s / 3.6 * 1000.0).round().clamp(0.0, 65534.0) as u16)
        .unwrap_or(INVALID_U16)
}

/// Distance in 100 * m
fn distance_field(km: Option<f64>) -> u32 {
    km.map(|d| (d * 100_000.0).round().clamp(0.0, u32::MAX as f64 - 1.0) as u32)
        .unwrap_or(u32::MAX)
}

/// Encode a complete cycling activity.
pub fn encode_activity(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    records: &[MetricRecord],
    product_name: &str,
) -> Vec<u8> {
    let mut fit = FitEncoder::new();
    let start = fit_timestamp(started_at);
    let end = fit_timestamp(ended_at.max(started_at));
    let elapsed_ms = ((ended_at - started_at).num_milliseconds().max(0)) as u32;
    let stats = SessionStats::from_records(records);

    fit.define(
        local::FILE_ID,
        message_type::FILE_ID,
        &[
            (0, 1, base_type::ENUM),   // type
            (1, 2, base_type::UINT16), // manufacturer
            (2, 2, base_type::UINT16), // product
            (4, 4, base_type::UINT32), // time_created
        ],
    );
    fit.data(local::FILE_ID);
    fit.u8(4); // activity
    fit.u16(MANUFACTURER_DEVELOPMENT);
    fit.u16(0);
    fit.u32(start);

    fit.define(
        local::FILE_CREATOR,
        message_type::FILE_CREATOR,
        &[(0, 2, base_type::UINT16)], // software_version
    );
    fit.data(local::FILE_CREATOR);
    fit.u16(10); // 0.10

    fit.define(
        local::DEVICE_INFO,
        message_type::DEVICE_INFO,
        &[
            (field_type::TIMESTAMP, 4, base_type::UINT32),
            (2, 2, base_type::UINT16),                       // manufacturer
            (4, 2, base_type::UINT16),                       // product
            (27, PRODUCT_NAME_LEN as u8, base_type::STRING), // product_name
        ],
    );
    fit.data(local::DEVICE_INFO);
    fit.u32(start);
    fit.u16(MANUFACTURER_DEVELOPMENT);
    fit.u16(0);
    fit.string(product_name, PRODUCT_NAME_LEN);

    fit.define(
        local::EVENT,
        message_type::EVENT,
        &[
            (field_type::TIMESTAMP, 4, base_type::UINT32),
            (0, 1, base_type::ENUM), // event
            (1, 1, base_type::ENUM), // event_type
        ],
    );
    fit.data(local::EVENT);
    fit.u32(start);
    fit.u8(0); // timer
    fit.u8(0); // start

    fit.define(
        local::RECORD,
        message_type::RECORD,
        &[
            (field_type::TIMESTAMP, 4, base_type::UINT32),
            (field_type::POWER, 2, base_type::UINT16),
            (field_type::HEART_RATE, 1, base_type::UINT8),
            (field_type::CADENCE, 1, base_type::UINT8),
            (field_type::DISTANCE, 4, base_type::UINT32),
            (field_type::SPEED, 2, base_type::UINT16),
        ],
    );
    for record in records {
        fit.data(local::RECORD);
        fit.u32(fit_timestamp(record.timestamp));
        fit.u16(record.power_watts.unwrap_or(INVALID_U16));
        fit.u8(hr_field(record.heart_rate_bpm));
        fit.u8(cadence_field(record.cadence_rpm));
        fit.u32(distance_field(record.distance_km));
        fit.u16(speed_field(record.speed_kmh));
    }

    fit.data(local::EVENT);
    fit.u32(end);
    fit.u8(0); // timer
    fit.u8(4); // stop_all

    // Lap: summary + avg/max hr (15, 16), avg cadence (17), avg/max power (19, 20)
    let mut lap_fields = SUMMARY_FIELDS.to_vec();
    lap_fields.extend_from_slice(&[
        (15, 1, base_type::UINT8),
        (16, 1, base_type::UINT8),
        (17, 1, base_type::UINT8),
        (19, 2, base_type::UINT16),
        (20, 2, base_type::UINT16),
        (0, 1, base_type::ENUM), // event
        (1, 1, base_type::ENUM), // event_type
    ]);
    fit.define(local::LAP, message_type::LAP, &lap_fields);
    fit.data(local::LAP);
    write_summary(&mut fit, end, start, elapsed_ms, &stats);
    fit.u8(hr_field(stats.avg_hr()));
    fit.u8(hr_field(stats.hr_max));
    fit.u8(cadence_field(stats.avg_cadence()));
    fit.u16(stats.avg_power().unwrap_or(INVALID_U16));
    fit.u16(stats.power_max.unwrap_or(INVALID_U16));
    fit.u8(9); // lap
    fit.u8(1); // stop

    // Session: sport (5), avg/max hr (16, 17), avg cadence (18), avg/max power (20, 21)
    let mut session_fields = SUMMARY_FIELDS.to_vec();
    session_fields.extend_from_slice(&[
        (5, 1, base_type::ENUM),
        (16, 1, base_type::UINT8),
        (17, 1, base_type::UINT8),
        (18, 1, base_type::UINT8),
        (20, 2, base_type::UINT16),
        (21, 2, base_type::UINT16),
        (0, 1, base_type::ENUM),    // event
        (1, 1, base_type::ENUM),    // event_type
        (26, 2, base_type::UINT16), // num_laps
    ]);
    fit.define(local::SESSION, message_type::SESSION, &session_fields);
    fit.data(local::SESSION);
    write_summary(&mut fit, end, start, elapsed_ms, &stats);
    fit.u8(2); // cycling
    fit.u8(hr_field(stats.avg_hr()));
    fit.u8(hr_field(stats.hr_max));
    fit.u8(cadence_field(stats.avg_cadence()));
    fit.u16(stats.avg_power().unwrap_or(INVALID_U16));
    fit.u16(stats.power_max.unwrap_or(INVALID_U16));
    fit.u8(8); // session
    fit.u8(1); // stop
    fit.u16(1);

    fit.define(
        local::ACTIVITY,
        message_type::ACTIVITY,
        &[
            (field_type::TIMESTAMP, 4, base_type::UINT32),
            (0, 4, base_type::UINT32), // total_timer_time
            (1, 2, base_type::UINT16), // num_sessions
            (2, 1, base_type::ENUM),   // type (manual)
            (3, 1, base_type::ENUM),   // event (activity)
            (4, 1, base_type::ENUM),   // event_type (stop)
            (5, 4, base_type::UINT32), // local_timestamp
        ],
    );
    fit.data(local::ACTIVITY);
    fit.u32(end);
    fit.u32(elapsed_ms);
    fit.u16(1);
    fit.u8(0);
    fit.u8(26);
    fit.u8(1);
    let local_offset = Local::now().offset().local_minus_utc() as i64;
    fit.u32((end as i64 + local_offset).max(0) as u32);

    fit.finish()
}

/// Fields shared by lap and session messages, written by `write_summary`
const SUMMARY_FIELDS: [(u8, u8, u8); 5] = [
    (field_type::TIMESTAMP, 4, base_type::UINT32),
    (2, 4, base_type::UINT32), // start_time
    (7, 4, base_type::UINT32), // total_elapsed_time (1000 * s)
    (8, 4, base_type::UINT32), // total_timer_time (1000 * s)
    (9, 4, base_type::UINT32), // total_distance (100 * m)
];

fn write_summary(
    fit: &mut FitEncoder,
    end: u32,
    start: u32,
    elapsed_ms: u32,
    stats: &SessionStats,
) {
    fit.u32(end);
    fit.u32(start);
    fit.u32(elapsed_ms);
    fit.u32(elapsed_ms);
    fit.u32(distance_field(stats.distance_km.or(Some(0.0))));
}

/// Generate the default filename for a session started at `started_at`.
pub fn generate_fit_filename(started_at: &DateTime<Local>) -> String {
    format!("{}.fit", started_at.format("%Y-%m-%dT%H_%M_%S"))
}

/// Destination for sampled metric records.
pub trait RecordSink: Send {
    /// Begin a session
    fn start(&mut self, started_at: DateTime<Utc>) -> Result<(), RecorderError>;

    /// Append one sample
    fn add_record(&mut self, record: &MetricRecord) -> Result<(), RecorderError>;

    /// End the session and persist it
    fn finish(&mut self, ended_at: DateTime<Utc>) -> Result<(), RecorderError>;
}

/// Writes a session to a FIT file when it finishes.
pub struct FitRecorder {
    path: PathBuf,
    product_name: String,
    status: RecordingStatus,
    started_at: Option<DateTime<Utc>>,
    records: Vec<MetricRecord>,
}

impl FitRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            status: RecordingStatus::Idle,
            started_at: None,
            records: Vec::new(),
        }
    }

    /// Recorder writing `<dir>/<start time>.fit`
    pub fn in_dir(dir: impl AsRef<Path>, started_at: &DateTime<Local>) -> Self {
        Self::new(dir.as_ref().join(generate_fit_filename(started_at)))
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl RecordSink for FitRecorder {
    fn start(&mut self, started_at: DateTime<Utc>) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Idle {
            return Err(RecorderError::AlreadyRecording);
        }
        self.status = RecordingStatus::Recording;
        self.started_at = Some(started_at);
        self.records.clear();
        tracing::info!(path = %self.path.display(), "Started recording");
        Ok(())
    }

    fn add_record(&mut self, record: &MetricRecord) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Recording {
            return Err(RecorderError::NotRecording);
        }
        self.records.push(*record);
        Ok(())
    }

    fn finish(&mut self, ended_at: DateTime<Utc>) -> Result<(), RecorderError> {
        let started_at = match (self.status, self.started_at) {
            (RecordingStatus::Recording, Some(started_at)) => started_at,
            _ => return Err(RecorderError::NotRecording),
        };
        self.status = RecordingStatus::Finishing;

        let result = if self.records.is_empty() {
            Err(RecorderError::NoData)
        } else {
            let bytes = encode_activity(started_at, ended_at, &self.records, &self.product_name);
            std::fs::write(&self.path, bytes).map_err(RecorderError::from)
        };

        self.status = RecordingStatus::Idle;
        self.started_at = None;

        match &result {
            Ok(()) => tracing::info!(
                path = %self.path.display(),
                records = self.records.len(),
                "Finished recording"
            ),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Session not saved"),
        }
        result
    }
}
