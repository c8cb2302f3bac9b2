//! Hardware-facing capability traits for the drive stack.
//!
//! - `PwmController`: a multi-channel PWM device addressed by channel number
//!   (a PCA9685 on I2C in production, a simulator in development).
//! - `PwmOutput`: the two-channel sink the control loop writes once per tick.
//!   Implementations absorb their own faults; nothing crosses this boundary.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

pub trait PwmController {
    /// Set the pulse width in microseconds on `channel`.
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Release the device. Further writes may fail.
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub trait PwmOutput {
    fn set_esc_pulse_us(&mut self, us: u16);
    fn set_steer_pulse_us(&mut self, us: u16);
}

impl<T: PwmController + ?Sized> PwmController for Box<T> {
    fn set_duty_us(
        &mut self,
        channel: u8,
        duty_us: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_duty_us(channel, duty_us)
    }
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).close()
    }
}

impl<T: PwmOutput + ?Sized> PwmOutput for Box<T> {
    fn set_esc_pulse_us(&mut self, us: u16) {
        (**self).set_esc_pulse_us(us);
    }
    fn set_steer_pulse_us(&mut self, us: u16) {
        (**self).set_steer_pulse_us(us);
    }
}
