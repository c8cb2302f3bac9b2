use rc_hardware::{ChannelLimits, SafePwm, SimulatedPwm};
use rc_traits::PwmController;
use rstest::rstest;

fn limited() -> (SafePwm<SimulatedPwm>, SimulatedPwm) {
    let sim = SimulatedPwm::new();
    let view = sim.clone();
    let safe = SafePwm::new(sim)
        .with_channel_limits(0, ChannelLimits::new("Steer", 1100, 1900))
        .with_channel_limits(1, ChannelLimits::new("ESC", 1000, 2000))
        .with_global_range(600, 2400);
    (safe, view)
}

#[rstest]
#[case(0, 1500, 1500)]
#[case(0, 900, 1100)]
#[case(0, 2100, 1900)]
#[case(1, 999, 1000)]
#[case(1, 2001, 2000)]
#[case(7, 100, 600)]
#[case(7, 3000, 2400)]
#[case(7, 1234, 1234)]
fn clamps_to_channel_or_global_range(#[case] ch: u8, #[case] req: u16, #[case] want: u16) {
    let (mut safe, view) = limited();
    safe.set_duty_us(ch, req).expect("write");
    assert_eq!(view.duty_us(ch), Some(want));
}

#[test]
fn unsafe_bypass_writes_raw_value() {
    let (mut safe, view) = limited();
    safe.unsafe_set_duty_us(0, 2500).expect("write");
    assert_eq!(view.duty_us(0), Some(2500));
}

#[test]
fn limits_can_be_replaced_at_runtime() {
    let (mut safe, view) = limited();
    safe.set_channel_limits(0, ChannelLimits::new("Steer", 1300, 1700));
    safe.set_duty_us(0, 1900).expect("write");
    assert_eq!(view.duty_us(0), Some(1700));
}

#[test]
fn underlying_errors_pass_through() {
    let (mut safe, _view) = limited();
    let err = safe.set_duty_us(16, 1500).expect_err("invalid channel");
    assert!(err.to_string().contains("invalid pwm channel"));
}
