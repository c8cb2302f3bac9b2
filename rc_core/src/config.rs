//! Runtime tuning for the driver, mapper, loop and output sink.
//!
//! These are separate from the TOML-deserialized config in `rc_config`; see
//! `conversions` for the mapping.

use crate::error::BuildError;
use std::time::Duration;

/// Driver rates (per second) and thresholds (normalized units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverCfg {
    /// Digital forward acceleration; analog mode moves at twice this.
    pub accel_rate: f32,
    /// Decay toward zero when neither or both throttle keys are held.
    pub coast_rate: f32,
    /// Braking from forward, and failsafe decay.
    pub brake_rate: f32,
    /// Digital reverse acceleration, slower than forward.
    pub reverse_accel_rate: f32,
    pub steer_rate: f32,
    pub steer_return_rate: f32,
    /// Below this magnitude speed/steer snap to exactly 0.
    pub stop_threshold: f32,
    /// Speed at or below which a held backward key may start reversing.
    pub reverse_threshold: f32,
    /// Reverse ceiling shared by analog and digital modes.
    pub max_reverse_speed: f32,
}

impl Default for DriverCfg {
    fn default() -> Self {
        Self {
            accel_rate: 0.8,
            coast_rate: 1.2,
            brake_rate: 3.0,
            reverse_accel_rate: 0.3,
            steer_rate: 3.0,
            steer_return_rate: 5.0,
            stop_threshold: 0.05,
            reverse_threshold: 0.1,
            max_reverse_speed: 0.3,
        }
    }
}

impl DriverCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        let rates = [
            self.accel_rate,
            self.coast_rate,
            self.brake_rate,
            self.reverse_accel_rate,
            self.steer_rate,
            self.steer_return_rate,
        ];
        if rates.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(BuildError::InvalidConfig("driver rates must be > 0"));
        }
        if !(self.stop_threshold >= 0.0 && self.reverse_threshold >= 0.0) {
            return Err(BuildError::InvalidConfig("driver thresholds must be >= 0"));
        }
        if !(self.max_reverse_speed > 0.0 && self.max_reverse_speed <= 1.0) {
            return Err(BuildError::InvalidConfig(
                "max_reverse_speed must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Expo shaping and per-tick ramp limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperCfg {
    pub throttle_expo: f32,
    pub steer_expo: f32,
    pub max_esc_ramp_per_tick: u16,
    pub max_steer_ramp_per_tick: u16,
}

impl Default for MapperCfg {
    fn default() -> Self {
        Self {
            throttle_expo: 0.3,
            steer_expo: 0.2,
            max_esc_ramp_per_tick: 20,
            max_steer_ramp_per_tick: 40,
        }
    }
}

impl MapperCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(0.0..=1.0).contains(&self.throttle_expo) || !(0.0..=1.0).contains(&self.steer_expo) {
            return Err(BuildError::InvalidConfig("expo must be in [0, 1]"));
        }
        if self.max_esc_ramp_per_tick == 0 || self.max_steer_ramp_per_tick == 0 {
            return Err(BuildError::InvalidConfig("ramp steps must be >= 1"));
        }
        Ok(())
    }
}

/// Tick cadence, failsafe window and telemetry rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCfg {
    pub tick_rate_hz: u32,
    pub failsafe_timeout: Duration,
    pub telemetry_rate_hz: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            failsafe_timeout: Duration::from_millis(250),
            telemetry_rate_hz: 10,
        }
    }
}

impl LoopCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.tick_rate_hz == 0 {
            return Err(BuildError::InvalidConfig("tick_rate_hz must be > 0"));
        }
        if self.telemetry_rate_hz == 0 || self.telemetry_rate_hz > self.tick_rate_hz {
            return Err(BuildError::InvalidConfig(
                "telemetry_rate_hz must be in 1..=tick_rate_hz",
            ));
        }
        Ok(())
    }
}

/// Retry policy for `RetryingPwmOutput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per write, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Minimum spacing between fault warnings.
    pub error_cooldown: Duration,
    /// Consecutive failed writes before the wiring-check error fires (once).
    pub escalate_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_millis(5),
            error_cooldown: Duration::from_millis(100),
            escalate_after: 10,
        }
    }
}
