//! Payload decoding for heart rate, power and speed/cadence notifications.
//!
//! GATT characteristics and ANT+ data pages carry the same measurements in different
//! byte layouts. Every decode function takes the layout explicitly, so the rollover and
//! unit arithmetic for speed and cadence is shared by both transports.
//!
//! A notification that must not change any stored value is reported as a
//! [`DecodeAnomaly`]. Anomalies are expected in normal operation (duplicate
//! notifications, a sensor reporting zero while it has no contact) and are never fatal.

use crate::sensors::ant::{AntDeviceType, POWER_ONLY_PAGE};
use crate::sensors::latest::LatestValues;
use crate::sensors::rollover::{self, WIDTH_16, WIDTH_32};
use crate::sensors::types::{Channel, Notification, SensorReading};
use thiserror::Error;

/// Event-time resolution of GATT CSC and ANT+ speed/cadence counters.
pub const CSC_TICKS_PER_SECOND: f64 = 1024.0;

/// Default wheel circumference (700x25C) in meters.
pub const DEFAULT_WHEEL_CIRCUMFERENCE_M: f64 = 2.109;

/// Heart Rate Measurement flag: value format is u16
const HR_FORMAT_U16: u8 = 0x01;

/// CSC Measurement flag: wheel revolution data present
const CSC_WHEEL_PRESENT: u8 = 0x01;

/// CSC Measurement flag: crank revolution data present
const CSC_CRANK_PRESENT: u8 = 0x02;

/// ANT+ broadcast data pages are always 8 bytes
const ANT_PAGE_LEN: usize = 8;

/// Byte layout of the notifications produced by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// Bluetooth GATT characteristic values
    Gatt,
    /// ANT+ broadcast data pages of the given device profile
    AntPlus(AntDeviceType),
}

/// Reasons a notification does not update any value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeAnomaly {
    #[error("payload too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("no reading (zero value)")]
    NoReading,

    #[error("event time did not advance")]
    ZeroTimeDelta,

    #[error("counter baseline captured")]
    Unprimed,

    #[error("unsupported data page 0x{0:02X}")]
    UnsupportedPage(u8),

    #[error("{channel} is not carried by {layout:?}")]
    UnsupportedLayout {
        channel: Channel,
        layout: PayloadLayout,
    },
}

fn require(payload: &[u8], expected: usize) -> Result<(), DecodeAnomaly> {
    if payload.len() < expected {
        return Err(DecodeAnomaly::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn le_u16(payload: &[u8], offset: usize) -> u32 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]]) as u32
}

fn le_u32(payload: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Decode a heart rate notification.
///
/// GATT: byte 0 is the flags byte and is masked out; the measurement is the following
/// byte, or a little-endian u16 when the format flag is set. ANT+: every heart-rate data
/// page carries the computed heart rate in byte 7.
pub fn decode_heart_rate(
    payload: &[u8],
    layout: PayloadLayout,
) -> Result<SensorReading, DecodeAnomaly> {
    let bpm = match layout {
        PayloadLayout::Gatt => {
            require(payload, 2)?;
            if payload[0] & HR_FORMAT_U16 != 0 {
                require(payload, 3)?;
                u16::from_le_bytes([payload[1], payload[2]])
            } else {
                u16::from_be_bytes([0, payload[1]])
            }
        }
        PayloadLayout::AntPlus(AntDeviceType::HeartRate) => {
            require(payload, ANT_PAGE_LEN)?;
            payload[7] as u16
        }
        PayloadLayout::AntPlus(_) => {
            return Err(DecodeAnomaly::UnsupportedLayout {
                channel: Channel::HeartRate,
                layout,
            })
        }
    };

    if bpm == 0 {
        return Err(DecodeAnomaly::NoReading);
    }
    Ok(SensorReading::HeartRate { bpm })
}

/// Decode a power notification.
///
/// GATT: instantaneous power is the little-endian u16 at bytes 2-3, after the flags.
/// ANT+: only the power-only page (0x10) carries it, at bytes 6-7.
pub fn decode_power(payload: &[u8], layout: PayloadLayout) -> Result<SensorReading, DecodeAnomaly> {
    let watts = match layout {
        PayloadLayout::Gatt => {
            require(payload, 4)?;
            le_u16(payload, 2) as u16
        }
        PayloadLayout::AntPlus(AntDeviceType::Power) => {
            require(payload, ANT_PAGE_LEN)?;
            if payload[0] != POWER_ONLY_PAGE {
                return Err(DecodeAnomaly::UnsupportedPage(payload[0]));
            }
            le_u16(payload, 6) as u16
        }
        PayloadLayout::AntPlus(_) => {
            return Err(DecodeAnomaly::UnsupportedLayout {
                channel: Channel::Power,
                layout,
            })
        }
    };

    if watts == 0 {
        return Err(DecodeAnomaly::NoReading);
    }
    Ok(SensorReading::Power { watts })
}

/// Last raw reading of one revolution counter and its event time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterPair {
    /// Last cumulative revolution count
    pub last_raw: u32,
    /// Last event time (1/1024 s ticks)
    pub last_timestamp_raw: u32,
    primed: bool,
}

impl CounterPair {
    /// A pair that already holds a baseline, so the next sample produces a delta.
    pub fn primed(last_raw: u32, last_timestamp_raw: u32) -> Self {
        Self {
            last_raw,
            last_timestamp_raw,
            primed: true,
        }
    }

    /// Whether a baseline has been captured.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Record `sample` and return the step since the previous one.
    ///
    /// The stored values always move to the new sample, even when the step is
    /// later discarded, so the following delta stays aligned.
    fn advance(&mut self, sample: RawCounter) -> Option<CounterStep> {
        let step = self.primed.then(|| CounterStep {
            revolutions: rollover::delta(sample.count, self.last_raw, sample.count_width),
            ticks: rollover::delta(sample.event_time, self.last_timestamp_raw, WIDTH_16),
        });

        self.last_raw = sample.count;
        self.last_timestamp_raw = sample.event_time;
        self.primed = true;

        step
    }
}

/// Rollover state for the wheel and crank counters of one sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CumulativeCounterState {
    pub wheel: CounterPair,
    pub crank: CounterPair,
}

impl CumulativeCounterState {
    /// Drop both baselines. Used when a new link starts.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy)]
struct RawCounter {
    count: u32,
    count_width: u32,
    event_time: u32,
}

#[derive(Debug, Clone, Copy)]
struct CounterStep {
    revolutions: u32,
    ticks: u32,
}

impl CounterStep {
    fn seconds(&self) -> Option<f64> {
        (self.ticks != 0).then(|| self.ticks as f64 / CSC_TICKS_PER_SECOND)
    }
}

/// Values produced by one speed/cadence notification.
///
/// A `None` field is suppressed: the stored value must be kept as is.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CscUpdate {
    /// Wheel speed in km/h
    pub speed_kmh: Option<f64>,
    /// Crank cadence in RPM
    pub cadence_rpm: Option<f64>,
    /// Distance covered since the previous notification, in km
    pub distance_delta_km: Option<f64>,
}

impl CscUpdate {
    pub fn is_empty(&self) -> bool {
        self.speed_kmh.is_none() && self.cadence_rpm.is_none() && self.distance_delta_km.is_none()
    }
}

/// Pull the wheel and crank counter samples out of a payload.
fn extract_counters(
    payload: &[u8],
    layout: PayloadLayout,
) -> Result<(Option<RawCounter>, Option<RawCounter>), DecodeAnomaly> {
    let ant_counter = |count_offset: usize, time_offset: usize| RawCounter {
        count: le_u16(payload, count_offset),
        count_width: WIDTH_16,
        event_time: le_u16(payload, time_offset),
    };

    match layout {
        PayloadLayout::Gatt => {
            require(payload, 1)?;
            let flags = payload[0];
            let mut offset = 1usize;

            let wheel = if flags & CSC_WHEEL_PRESENT != 0 {
                require(payload, offset + 6)?;
                let wheel = RawCounter {
                    count: le_u32(payload, offset),
                    count_width: WIDTH_32,
                    event_time: le_u16(payload, offset + 4),
                };
                offset += 6;
                Some(wheel)
            } else {
                None
            };

            let crank = if flags & CSC_CRANK_PRESENT != 0 {
                require(payload, offset + 4)?;
                Some(RawCounter {
                    count: le_u16(payload, offset),
                    count_width: WIDTH_16,
                    event_time: le_u16(payload, offset + 2),
                })
            } else {
                None
            };

            Ok((wheel, crank))
        }
        PayloadLayout::AntPlus(AntDeviceType::SpeedCadence) => {
            // Crank event time, crank revs, wheel event time, wheel revs; no page byte.
            require(payload, ANT_PAGE_LEN)?;
            Ok((Some(ant_counter(6, 4)), Some(ant_counter(2, 0))))
        }
        PayloadLayout::AntPlus(AntDeviceType::Speed) => {
            require(payload, ANT_PAGE_LEN)?;
            Ok((Some(ant_counter(6, 4)), None))
        }
        PayloadLayout::AntPlus(AntDeviceType::Cadence) => {
            require(payload, ANT_PAGE_LEN)?;
            Ok((None, Some(ant_counter(6, 4))))
        }
        PayloadLayout::AntPlus(_) => Err(DecodeAnomaly::UnsupportedLayout {
            channel: Channel::SpeedCadence,
            layout,
        }),
    }
}

/// Decode a speed/cadence notification against the running counter state.
///
/// For each counter pair present in the payload, the revolution and event-time deltas are
/// taken modulo the counter width. A zero time delta suppresses that pair's output. The
/// counter state advances on every call, whether or not an output is produced.
pub fn decode_speed_cadence(
    payload: &[u8],
    layout: PayloadLayout,
    state: &mut CumulativeCounterState,
    wheel_circumference_m: f64,
) -> Result<CscUpdate, DecodeAnomaly> {
    let (wheel, crank) = extract_counters(payload, layout)?;
    if wheel.is_none() && crank.is_none() {
        return Err(DecodeAnomaly::NoReading);
    }

    let mut update = CscUpdate::default();
    let mut stalled = false;

    if let Some(step) = wheel.and_then(|sample| state.wheel.advance(sample)) {
        match step.seconds() {
            Some(seconds) => {
                let meters = step.revolutions as f64 * wheel_circumference_m;
                update.distance_delta_km = Some(meters / 1000.0);
                update.speed_kmh = Some(meters / seconds * 3.6);
            }
            None => stalled = true,
        }
    }

    if let Some(step) = crank.and_then(|sample| state.crank.advance(sample)) {
        match step.seconds() {
            Some(seconds) => update.cadence_rpm = Some(step.revolutions as f64 * 60.0 / seconds),
            None => stalled = true,
        }
    }

    if update.is_empty() {
        return Err(if stalled {
            DecodeAnomaly::ZeroTimeDelta
        } else {
            DecodeAnomaly::Unprimed
        });
    }
    Ok(update)
}

/// Per-link decoder: layout, wheel size and counter state for one sensor connection.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    layout: PayloadLayout,
    wheel_circumference_m: f64,
    counters: CumulativeCounterState,
}

impl PayloadDecoder {
    pub fn new(layout: PayloadLayout, wheel_circumference_m: f64) -> Self {
        Self {
            layout,
            wheel_circumference_m,
            counters: CumulativeCounterState::default(),
        }
    }

    pub fn layout(&self) -> PayloadLayout {
        self.layout
    }

    pub fn counters(&self) -> &CumulativeCounterState {
        &self.counters
    }

    /// Decode one notification and write the result into `values`.
    pub fn apply(
        &mut self,
        notification: &Notification,
        values: &LatestValues,
    ) -> Result<(), DecodeAnomaly> {
        match notification.channel {
            Channel::HeartRate => {
                values.set(&decode_heart_rate(&notification.payload, self.layout)?);
            }
            Channel::Power => {
                values.set(&decode_power(&notification.payload, self.layout)?);
            }
            Channel::SpeedCadence => {
                let update = decode_speed_cadence(
                    &notification.payload,
                    self.layout,
                    &mut self.counters,
                    self.wheel_circumference_m,
                )?;
                values.set(&SensorReading::CadenceSpeedDistance(update));
            }
        }
        Ok(())
    }
}
