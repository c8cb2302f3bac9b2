//! `From` implementations bridging `rc_config` types to `rc_core` types.

use crate::calibration::{Calibration, MotorCalibration, ServoCalibration};
use crate::config::{DriverCfg, LoopCfg, MapperCfg, RetryPolicy};
use std::time::Duration;

// ── Calibration ──────────────────────────────────────────────────────────────

impl From<&rc_config::ServoCfg> for ServoCalibration {
    fn from(c: &rc_config::ServoCfg) -> Self {
        Self {
            channel: c.channel,
            min_pulse_us: c.min_pulse_us,
            max_pulse_us: c.max_pulse_us,
            left_pulse_us: c.left_pulse_us,
            center_pulse_us: c.center_pulse_us,
            right_pulse_us: c.right_pulse_us,
        }
    }
}

impl From<&rc_config::MotorCfg> for MotorCalibration {
    fn from(c: &rc_config::MotorCfg) -> Self {
        Self {
            channel: c.channel,
            min_pulse_us: c.min_pulse_us,
            max_pulse_us: c.max_pulse_us,
            neutral_pulse_us: c.neutral_pulse_us,
            forward_min_pulse_us: c.forward_min_pulse_us,
            forward_max_pulse_us: c.forward_max_pulse_us,
            reverse_max_pulse_us: c.reverse_max_pulse_us,
            reverse_min_pulse_us: c.reverse_min_pulse_us,
        }
    }
}

impl From<&rc_config::Config> for Calibration {
    fn from(c: &rc_config::Config) -> Self {
        Self {
            servo: (&c.servo).into(),
            motor: (&c.motor).into(),
        }
    }
}

// ── DriverCfg ────────────────────────────────────────────────────────────────

impl From<&rc_config::DriverCfg> for DriverCfg {
    fn from(c: &rc_config::DriverCfg) -> Self {
        Self {
            accel_rate: c.accel_rate,
            coast_rate: c.coast_rate,
            brake_rate: c.brake_rate,
            reverse_accel_rate: c.reverse_accel_rate,
            steer_rate: c.steer_rate,
            steer_return_rate: c.steer_return_rate,
            stop_threshold: c.stop_threshold,
            reverse_threshold: c.reverse_threshold,
            max_reverse_speed: c.max_reverse_speed,
        }
    }
}

// ── MapperCfg ────────────────────────────────────────────────────────────────

impl From<&rc_config::MapperCfg> for MapperCfg {
    fn from(c: &rc_config::MapperCfg) -> Self {
        Self {
            throttle_expo: c.throttle_expo,
            steer_expo: c.steer_expo,
            max_esc_ramp_per_tick: c.max_esc_ramp_per_tick,
            max_steer_ramp_per_tick: c.max_steer_ramp_per_tick,
        }
    }
}

// ── LoopCfg ──────────────────────────────────────────────────────────────────

impl From<&rc_config::ControlCfg> for LoopCfg {
    fn from(c: &rc_config::ControlCfg) -> Self {
        Self {
            tick_rate_hz: c.tick_rate_hz,
            failsafe_timeout: Duration::from_millis(c.failsafe_timeout_ms),
            telemetry_rate_hz: c.telemetry_rate_hz,
        }
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────────────────

impl From<&rc_config::OutputCfg> for RetryPolicy {
    fn from(c: &rc_config::OutputCfg) -> Self {
        Self {
            max_attempts: c.max_retries,
            retry_delay: Duration::from_millis(c.retry_delay_ms),
            error_cooldown: Duration::from_millis(c.error_cooldown_ms),
            escalate_after: c.escalate_after,
        }
    }
}
