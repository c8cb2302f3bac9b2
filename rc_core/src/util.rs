//! Common time/period helpers for rc_core.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Shortest sleep at the end of a tick, so the scheduler always yields.
pub const MIN_TICK_SLEEP: Duration = Duration::from_millis(1);

/// Compute the period in microseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Nominal tick interval for `hz`.
#[inline]
pub fn period(hz: u32) -> Duration {
    Duration::from_micros(period_us(hz))
}

/// Publish telemetry every N ticks so that it runs at roughly `telemetry_hz`.
#[inline]
pub fn telemetry_divisor(tick_hz: u32, telemetry_hz: u32) -> u32 {
    (tick_hz / telemetry_hz.max(1)).max(1)
}

/// How long to sleep after a tick whose work took `work`.
#[inline]
pub fn remaining_sleep(interval: Duration, work: Duration) -> Duration {
    interval.saturating_sub(work).max(MIN_TICK_SLEEP)
}

/// Wall-clock milliseconds since the UNIX epoch (0 if the clock is before 1970).
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
