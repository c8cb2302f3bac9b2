#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the drive controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `[servo]` and `[motor]` calibration are required; every other table has
//!   defaults matching a 50 Hz hobby-grade servo/ESC pair.
use eyre::WrapErr;
use serde::Deserialize;
use std::path::Path;

/// Highest channel index on the PWM expander.
pub const MAX_CHANNEL: u8 = 15;

/// Steering servo calibration, in pulse microseconds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ServoCfg {
    pub channel: u8,
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub left_pulse_us: u16,
    pub center_pulse_us: u16,
    pub right_pulse_us: u16,
}

/// ESC calibration. The dead band is `(reverse_max_pulse_us, forward_min_pulse_us)`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MotorCfg {
    pub channel: u8,
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    pub neutral_pulse_us: u16,
    /// Where the motor starts moving forward
    pub forward_min_pulse_us: u16,
    /// Full throttle forward
    pub forward_max_pulse_us: u16,
    /// Where the motor starts moving in reverse
    pub reverse_max_pulse_us: u16,
    /// Full throttle reverse
    pub reverse_min_pulse_us: u16,
}

/// Driving feel: rates are per second, thresholds are normalized.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DriverCfg {
    pub accel_rate: f32,
    pub coast_rate: f32,
    pub brake_rate: f32,
    pub reverse_accel_rate: f32,
    pub steer_rate: f32,
    pub steer_return_rate: f32,
    pub stop_threshold: f32,
    pub reverse_threshold: f32,
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct MapperCfg {
    /// 0 = linear, 1 = cubic
    pub throttle_expo: f32,
    pub steer_expo: f32,
    /// Max ESC pulse change per tick (us)
    pub max_esc_ramp_per_tick: u16,
    /// Max steering pulse change per tick (us)
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

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ControlCfg {
    pub tick_rate_hz: u32,
    pub failsafe_timeout_ms: u64,
    pub telemetry_rate_hz: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            tick_rate_hz: 50,
            failsafe_timeout_ms: 250,
            telemetry_rate_hz: 10,
        }
    }
}

/// Retry policy for the hardware output sink.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct OutputCfg {
    /// Attempts per write, including the first
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Minimum spacing between fault warnings
    pub error_cooldown_ms: u64,
    /// Consecutive failed writes before the wiring-check error is logged
    pub escalate_after: u32,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 5,
            error_cooldown_ms: 100,
            escalate_after: 10,
        }
    }
}

/// Fallback limits for channels without calibration.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SafetyCfg {
    pub global_min_pulse_us: u16,
    pub global_max_pulse_us: u16,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            global_min_pulse_us: 500,
            global_max_pulse_us: 2500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct I2cCfg {
    pub bus: u8,
    pub address: u16,
    pub pwm_frequency_hz: u32,
}

impl Default for I2cCfg {
    fn default() -> Self {
        Self {
            bus: 1,
            address: 0x40,
            pwm_frequency_hz: 50,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub servo: ServoCfg,
    pub motor: MotorCfg,
    #[serde(default)]
    pub driver: DriverCfg,
    #[serde(default)]
    pub mapper: MapperCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub output: OutputCfg,
    #[serde(default)]
    pub safety: SafetyCfg,
    #[serde(default)]
    pub i2c: I2cCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

impl ServoCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.channel > MAX_CHANNEL {
            eyre::bail!("servo.channel must be in 0..={MAX_CHANNEL}");
        }
        if self.min_pulse_us >= self.max_pulse_us {
            eyre::bail!("servo.min_pulse_us must be < servo.max_pulse_us");
        }
        let range = self.min_pulse_us..=self.max_pulse_us;
        for (name, v) in [
            ("left_pulse_us", self.left_pulse_us),
            ("center_pulse_us", self.center_pulse_us),
            ("right_pulse_us", self.right_pulse_us),
        ] {
            if !range.contains(&v) {
                eyre::bail!(
                    "servo.{name} ({v}) must be within [{}, {}]",
                    self.min_pulse_us,
                    self.max_pulse_us
                );
            }
        }
        Ok(())
    }
}

impl MotorCfg {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.channel > MAX_CHANNEL {
            eyre::bail!("motor.channel must be in 0..={MAX_CHANNEL}");
        }
        if self.min_pulse_us >= self.max_pulse_us {
            eyre::bail!("motor.min_pulse_us must be < motor.max_pulse_us");
        }
        // min <= reverse_min <= reverse_max < neutral < forward_min <= forward_max <= max
        if self.reverse_min_pulse_us < self.min_pulse_us {
            eyre::bail!("motor.reverse_min_pulse_us must be >= motor.min_pulse_us");
        }
        if self.reverse_max_pulse_us < self.reverse_min_pulse_us {
            eyre::bail!("motor.reverse_max_pulse_us must be >= motor.reverse_min_pulse_us");
        }
        if self.reverse_max_pulse_us >= self.neutral_pulse_us {
            eyre::bail!("motor.reverse_max_pulse_us must be < motor.neutral_pulse_us");
        }
        if self.forward_min_pulse_us <= self.neutral_pulse_us {
            eyre::bail!("motor.forward_min_pulse_us must be > motor.neutral_pulse_us");
        }
        if self.forward_max_pulse_us < self.forward_min_pulse_us {
            eyre::bail!("motor.forward_max_pulse_us must be >= motor.forward_min_pulse_us");
        }
        if self.forward_max_pulse_us > self.max_pulse_us {
            eyre::bail!("motor.forward_max_pulse_us must be <= motor.max_pulse_us");
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Calibration
        self.servo.validate()?;
        self.motor.validate()?;
        if self.servo.channel == self.motor.channel {
            eyre::bail!("servo.channel and motor.channel must differ");
        }

        // Driver
        let d = &self.driver;
        for (name, v) in [
            ("accel_rate", d.accel_rate),
            ("coast_rate", d.coast_rate),
            ("brake_rate", d.brake_rate),
            ("reverse_accel_rate", d.reverse_accel_rate),
            ("steer_rate", d.steer_rate),
            ("steer_return_rate", d.steer_return_rate),
        ] {
            if !(v.is_finite() && v > 0.0) {
                eyre::bail!("driver.{name} must be > 0");
            }
        }
        if !(d.stop_threshold.is_finite() && d.stop_threshold >= 0.0) {
            eyre::bail!("driver.stop_threshold must be >= 0");
        }
        if !(d.reverse_threshold.is_finite() && d.reverse_threshold >= 0.0) {
            eyre::bail!("driver.reverse_threshold must be >= 0");
        }
        if !(d.max_reverse_speed > 0.0 && d.max_reverse_speed <= 1.0) {
            eyre::bail!("driver.max_reverse_speed must be in (0.0, 1.0]");
        }

        // Mapper
        let m = &self.mapper;
        if !(0.0..=1.0).contains(&m.throttle_expo) {
            eyre::bail!("mapper.throttle_expo must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&m.steer_expo) {
            eyre::bail!("mapper.steer_expo must be in [0.0, 1.0]");
        }
        if m.max_esc_ramp_per_tick == 0 {
            eyre::bail!("mapper.max_esc_ramp_per_tick must be >= 1");
        }
        if m.max_steer_ramp_per_tick == 0 {
            eyre::bail!("mapper.max_steer_ramp_per_tick must be >= 1");
        }

        // Control
        let c = &self.control;
        if c.tick_rate_hz == 0 || c.tick_rate_hz > 1000 {
            eyre::bail!("control.tick_rate_hz must be in 1..=1000");
        }
        if c.telemetry_rate_hz == 0 || c.telemetry_rate_hz > c.tick_rate_hz {
            eyre::bail!("control.telemetry_rate_hz must be in 1..=control.tick_rate_hz");
        }
        if c.failsafe_timeout_ms == 0 {
            eyre::bail!("control.failsafe_timeout_ms must be >= 1");
        }

        // Output
        if self.output.max_retries == 0 {
            eyre::bail!("output.max_retries must be >= 1");
        }
        if self.output.escalate_after == 0 {
            eyre::bail!("output.escalate_after must be >= 1");
        }

        // Safety
        if self.safety.global_min_pulse_us >= self.safety.global_max_pulse_us {
            eyre::bail!("safety.global_min_pulse_us must be < safety.global_max_pulse_us");
        }

        // I2C
        if self.i2c.address > 0x7F {
            eyre::bail!("i2c.address must be a 7-bit address");
        }
        if !(24..=1526).contains(&self.i2c.pwm_frequency_hz) {
            eyre::bail!("i2c.pwm_frequency_hz must be in 24..=1526");
        }

        Ok(())
    }
}
