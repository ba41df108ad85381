//! Unit tests for notification decoding into the latest-value store.

use trainerlink::sensors::{
    AntDeviceType, Channel, DecodeAnomaly, LatestValues, Metric, Notification, PayloadDecoder,
    PayloadLayout,
};

const CIRCUMFERENCE: f64 = 2.109;

fn gatt_wheel(revs: u32, time: u16) -> Notification {
    // Flags: 0x01 (wheel revolution data only)
    let mut data = vec![0x01];
    data.extend_from_slice(&revs.to_le_bytes());
    data.extend_from_slice(&time.to_le_bytes());
    Notification::new(Channel::SpeedCadence, data)
}

fn ant_speed_cadence(
    crank_time: u16,
    crank_revs: u16,
    wheel_time: u16,
    wheel_revs: u16,
) -> Notification {
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&crank_time.to_le_bytes());
    data.extend_from_slice(&crank_revs.to_le_bytes());
    data.extend_from_slice(&wheel_time.to_le_bytes());
    data.extend_from_slice(&wheel_revs.to_le_bytes());
    Notification::new(Channel::SpeedCadence, data)
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be set");
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_gatt_wheel_counter_wraps_at_32_bits() {
    let mut decoder = PayloadDecoder::new(PayloadLayout::Gatt, CIRCUMFERENCE);
    let values = LatestValues::new();

    assert_eq!(
        decoder.apply(&gatt_wheel(u32::MAX - 1, 0), &values),
        Err(DecodeAnomaly::Unprimed)
    );
    assert_eq!(values.get(Metric::Speed), None);

    // 4 revolutions in exactly one second
    decoder.apply(&gatt_wheel(2, 1024), &values).unwrap();

    assert_close(values.get(Metric::Speed), 4.0 * CIRCUMFERENCE * 3.6);
    assert_close(values.get(Metric::Distance), 4.0 * CIRCUMFERENCE / 1000.0);
    assert_eq!(values.get(Metric::Cadence), None);
}

#[test]
fn test_distance_accumulates_across_notifications() {
    let mut decoder = PayloadDecoder::new(PayloadLayout::Gatt, CIRCUMFERENCE);
    let values = LatestValues::new();

    let _ = decoder.apply(&gatt_wheel(1000, 0), &values);
    for i in 1..=10u32 {
        decoder
            .apply(&gatt_wheel(1000 + i * 3, (i * 1024) as u16), &values)
            .unwrap();
    }

    assert_close(values.get(Metric::Distance), 30.0 * CIRCUMFERENCE / 1000.0);
    assert_close(values.get(Metric::Speed), 3.0 * CIRCUMFERENCE * 3.6);
}

#[test]
fn test_duplicate_notification_keeps_values() {
    let mut decoder = PayloadDecoder::new(PayloadLayout::Gatt, CIRCUMFERENCE);
    let values = LatestValues::new();

    let _ = decoder.apply(&gatt_wheel(10, 0), &values);
    decoder.apply(&gatt_wheel(12, 1024), &values).unwrap();
    let before = values.snapshot();

    assert_eq!(
        decoder.apply(&gatt_wheel(12, 1024), &values),
        Err(DecodeAnomaly::ZeroTimeDelta)
    );

    let after = values.snapshot();
    assert_eq!(after.speed_kmh, before.speed_kmh);
    assert_eq!(after.distance_km, before.distance_km);
}

#[test]
fn test_ant_speed_cadence_page_with_rollover() {
    let layout = PayloadLayout::AntPlus(AntDeviceType::SpeedCadence);
    let mut decoder = PayloadDecoder::new(layout, CIRCUMFERENCE);
    let values = LatestValues::new();

    assert_eq!(
        decoder.apply(&ant_speed_cadence(65000, 65535, 65000, 65534), &values),
        Err(DecodeAnomaly::Unprimed)
    );

    // Both event times wrap to 488 (+1024 ticks), crank wraps to 0, wheel to 2
    decoder
        .apply(&ant_speed_cadence(488, 0, 488, 2), &values)
        .unwrap();

    assert_close(values.get(Metric::Cadence), 60.0);
    assert_close(values.get(Metric::Speed), 4.0 * CIRCUMFERENCE * 3.6);
    assert_close(values.get(Metric::Distance), 4.0 * CIRCUMFERENCE / 1000.0);
}

#[test]
fn test_ant_cadence_only_sensor() {
    let layout = PayloadLayout::AntPlus(AntDeviceType::Cadence);
    let mut decoder = PayloadDecoder::new(layout, CIRCUMFERENCE);
    let values = LatestValues::new();

    let page = |time: u16, revs: u16| {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&time.to_le_bytes());
        data.extend_from_slice(&revs.to_le_bytes());
        Notification::new(Channel::SpeedCadence, data)
    };

    let _ = decoder.apply(&page(0, 10), &values);
    // One crank revolution in half a second
    decoder.apply(&page(512, 11), &values).unwrap();

    assert_close(values.get(Metric::Cadence), 120.0);
    assert_eq!(values.get(Metric::Speed), None);
    assert_eq!(values.get(Metric::Distance), None);
}

#[test]
fn test_zero_power_keeps_previous_value() {
    let mut decoder = PayloadDecoder::new(PayloadLayout::Gatt, CIRCUMFERENCE);
    let values = LatestValues::new();

    decoder
        .apply(&Notification::new(Channel::Power, [0x00u8, 0x00, 0xC8, 0x00]), &values)
        .unwrap();
    assert_eq!(values.get(Metric::Power), Some(200.0));

    assert_eq!(
        decoder.apply(&Notification::new(Channel::Power, [0x00u8, 0x00, 0x00, 0x00]), &values),
        Err(DecodeAnomaly::NoReading)
    );
    assert_eq!(values.get(Metric::Power), Some(200.0));
}

#[test]
fn test_ant_heart_rate_page() {
    let layout = PayloadLayout::AntPlus(AntDeviceType::HeartRate);
    let mut decoder = PayloadDecoder::new(layout, CIRCUMFERENCE);
    let values = LatestValues::new();

    let page = [0x04u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 72];
    decoder
        .apply(&Notification::new(Channel::HeartRate, page), &values)
        .unwrap();

    assert_eq!(values.get(Metric::HeartRate), Some(72.0));
}

#[test]
fn test_channel_not_carried_by_ant_profile() {
    let layout = PayloadLayout::AntPlus(AntDeviceType::Power);
    let mut decoder = PayloadDecoder::new(layout, CIRCUMFERENCE);
    let values = LatestValues::new();

    let result = decoder.apply(&Notification::new(Channel::HeartRate, [0u8; 8]), &values);

    assert!(matches!(
        result,
        Err(DecodeAnomaly::UnsupportedLayout {
            channel: Channel::HeartRate,
            ..
        })
    ));
    assert_eq!(values.get(Metric::HeartRate), None);
}

#[test]
fn test_truncated_payload_changes_nothing() {
    let mut decoder = PayloadDecoder::new(PayloadLayout::Gatt, CIRCUMFERENCE);
    let values = LatestValues::new();

    let result = decoder.apply(&Notification::new(Channel::Power, [0x00u8, 0x00, 0xC8]), &values);

    assert_eq!(
        result,
        Err(DecodeAnomaly::Truncated {
            expected: 4,
            actual: 3
        })
    );
    assert!(values.snapshot().updated_at.is_none());
}
