//! Wraparound-safe deltas for cumulative sensor counters.
//!
//! Revolution counts and event times are free-running counters that wrap to zero once
//! they exceed their field width. The only meaningful quantity is the forward step
//! between two readings, taken modulo `2^width`.

/// Width of a 32-bit cumulative revolution counter (GATT wheel revolutions).
pub const WIDTH_32: u32 = 32;

/// Width of a 16-bit counter (crank revolutions, every event-time field, all ANT+ counters).
pub const WIDTH_16: u32 = 16;

/// Forward distance from `prev_raw` to `new_raw` on a counter that wraps at `2^width_bits`.
///
/// A wrap (`new_raw < prev_raw`) yields the small positive step the sensor actually took,
/// and equal readings yield 0. The result is always below `2^width_bits`.
pub fn delta(new_raw: u32, prev_raw: u32, width_bits: u32) -> u32 {
    new_raw.wrapping_sub(prev_raw) & mask(width_bits)
}

fn mask(width_bits: u32) -> u32 {
    match width_bits {
        0 => 0,
        w if w >= 32 => u32::MAX,
        w => (1u32 << w) - 1,
    }
}
