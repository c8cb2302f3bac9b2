//! PWM hardware backends: a recording simulator, the `SafePwm` clamping
//! decorator, and (with the `hardware` feature on Linux) a PCA9685 driver.
pub mod error;
pub mod safe;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pca9685;

pub use error::HwError;
pub use safe::{ChannelLimits, SafePwm};
pub use sim::SimulatedPwm;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use pca9685::Pca9685;

/// Highest channel index on a 16-channel PWM expander.
pub const MAX_CHANNEL: u8 = 15;
