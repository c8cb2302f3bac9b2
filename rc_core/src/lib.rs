#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Real-time drive control (hardware-agnostic).
//!
//! All hardware access goes through `rc_traits::PwmOutput` (the two-channel
//! sink the loop writes) and `rc_traits::PwmController` (the channel-level
//! device wrapped by `RetryingPwmOutput`).
//!
//! ## Architecture
//!
//! - **Driver**: kinematic state machine over normalized speed/steer (`driver`)
//! - **Mapper**: expo, dead-band split, ramp limit, clamp (`mapper`)
//! - **Output**: retrying sink with error counters (`output`)
//! - **Loop**: fixed-rate tick thread, failsafe, pause/resume (`control_loop`)
//! - **Input / Telemetry**: latest-value slot in, latest-value broadcast out
//! - **Calibration**: hot-swappable pulse bounds shared with the config owner
//!
//! ## Units
//!
//! Motion is normalized `f32`: speed in `[-max_reverse_speed, 1]`, steer in
//! `[-1, 1]`. Pulses are `u16` microseconds.

pub mod calibration;
pub mod config;
pub mod control_loop;
pub mod conversions;
pub mod driver;
pub mod error;
pub mod input;
pub mod mapper;
pub mod mocks;
pub mod output;
pub mod telemetry;
pub mod util;

pub use calibration::{
    Calibration, CalibrationHandle, MotorCalibration, MotorPatch, ServoCalibration, ServoPatch,
};
pub use config::{DriverCfg, LoopCfg, MapperCfg, RetryPolicy};
pub use control_loop::{ControlLoop, LoopStats, LoopStatus};
pub use driver::Driver;
pub use error::{BuildError, LoopError};
pub use input::{ControlInput, InputHandle, InputKind};
pub use mapper::Mapper;
pub use output::{ErrorCounters, ErrorStats, FaultDiagnostics, RetryingPwmOutput};
pub use telemetry::{Telemetry, TelemetrySubscription};

/// Core tuning derived from a validated config file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub control: LoopCfg,
    pub driver: DriverCfg,
    pub mapper: MapperCfg,
    pub retry: RetryPolicy,
}

impl From<&rc_config::Config> for Tuning {
    fn from(c: &rc_config::Config) -> Self {
        Self {
            control: (&c.control).into(),
            driver: (&c.driver).into(),
            mapper: (&c.mapper).into(),
            retry: (&c.output).into(),
        }
    }
}

/// Assemble a retrying sink and a control loop over `controller`.
///
/// Returns the loop, the calibration handle it reads, and the sink's error
/// counters.
pub fn build_loop<C>(
    controller: C,
    config: &rc_config::Config,
) -> Result<
    (
        ControlLoop<RetryingPwmOutput<C>>,
        CalibrationHandle,
        ErrorCounters,
    ),
    BuildError,
>
where
    C: rc_traits::PwmController + Send + 'static,
{
    let tuning = Tuning::from(config);
    let calibration = CalibrationHandle::new(Calibration::from(config));
    let output = RetryingPwmOutput::new(controller, calibration.clone(), tuning.retry);
    let counters = output.counters();
    let cl = ControlLoop::new(
        output,
        calibration.clone(),
        tuning.control,
        tuning.driver,
        tuning.mapper,
    )?;
    Ok((cl, calibration, counters))
}
