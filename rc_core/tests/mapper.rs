use proptest::prelude::*;
use rc_core::mapper::{apply_expo, throttle_target};
use rc_core::{
    Calibration, CalibrationHandle, Mapper, MapperCfg, MotorCalibration, MotorPatch,
    ServoCalibration, ServoPatch,
};
use rstest::rstest;

fn unramped(throttle_expo: f32, steer_expo: f32) -> MapperCfg {
    MapperCfg {
        throttle_expo,
        steer_expo,
        max_esc_ramp_per_tick: 5000,
        max_steer_ramp_per_tick: 5000,
    }
}

fn skewed_calibration() -> Calibration {
    Calibration {
        servo: ServoCalibration {
            min_pulse_us: 1050,
            max_pulse_us: 1950,
            left_pulse_us: 1100,
            center_pulse_us: 1480,
            right_pulse_us: 1900,
            ..ServoCalibration::default()
        },
        motor: MotorCalibration {
            neutral_pulse_us: 1520,
            forward_min_pulse_us: 1580,
            reverse_max_pulse_us: 1460,
            ..MotorCalibration::default()
        },
    }
}

#[rstest]
fn dead_center_is_independent_of_expo(
    #[values(0.0, 0.3, 0.7, 1.0)] expo: f32,
    #[values(Calibration::default(), skewed_calibration())] cal: Calibration,
) {
    let mut m = Mapper::new(unramped(expo, expo), CalibrationHandle::new(cal));
    assert_eq!(m.map_throttle_to_pulse(0.0), cal.motor.neutral_pulse_us);
    assert_eq!(m.map_steer_to_pulse(0.0), cal.servo.center_pulse_us);
    // Away and back again lands on the same pulses.
    m.map_throttle_to_pulse(0.8);
    m.map_steer_to_pulse(-0.8);
    assert_eq!(m.map_throttle_to_pulse(0.0), cal.motor.neutral_pulse_us);
    assert_eq!(m.map_steer_to_pulse(0.0), cal.servo.center_pulse_us);
}

#[rstest]
#[case(0.2, 1640)]
#[case(0.4, 1730)]
#[case(0.6, 1820)]
#[case(0.8, 1910)]
#[case(1.0, 2000)]
#[case(-0.2, 1360)]
#[case(-0.4, 1270)]
#[case(-0.6, 1180)]
#[case(-0.8, 1090)]
#[case(-1.0, 1000)]
fn zero_expo_is_linear(#[case] speed: f32, #[case] expected: u16) {
    let mut m = Mapper::new(unramped(0.0, 0.0), CalibrationHandle::default());
    assert_eq!(m.map_throttle_to_pulse(speed), expected);
}

#[test]
fn zero_expo_has_equal_steps_on_each_side() {
    let motor = MotorCalibration::default();
    let fwd: Vec<u16> = [0.2, 0.4, 0.6, 0.8, 1.0]
        .iter()
        .map(|&v| throttle_target(&motor, apply_expo(v, 0.0)))
        .collect();
    let steps: Vec<u16> = fwd.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(steps.iter().all(|&s| s == 90), "{steps:?}");

    let rev: Vec<u16> = [-0.2, -0.4, -0.6, -0.8, -1.0]
        .iter()
        .map(|&v| throttle_target(&motor, apply_expo(v, 0.0)))
        .collect();
    let steps: Vec<u16> = rev.windows(2).map(|w| w[0] - w[1]).collect();
    assert!(steps.iter().all(|&s| s == 90), "{steps:?}");
}

#[test]
fn step_input_ramps_then_holds() {
    let mut m = Mapper::new(MapperCfg::default(), CalibrationHandle::default());
    let mut prev = m.current_esc();
    let mut outputs = Vec::new();
    for _ in 0..40 {
        let p = m.map_throttle_to_pulse(1.0);
        outputs.push(p);
        assert!(p.abs_diff(prev) <= 20);
        prev = p;
    }
    // 1500 -> 2000 in 20 us steps takes 25 ticks.
    assert_eq!(outputs[0], 1520);
    assert_eq!(outputs[24], 2000);
    assert!(outputs[24..].iter().all(|&p| p == 2000));

    let mut prev = m.current_steer();
    for _ in 0..20 {
        let p = m.map_steer_to_pulse(-1.0);
        assert!(p.abs_diff(prev) <= 40);
        prev = p;
    }
    assert_eq!(m.current_steer(), 1200);
}

proptest! {
    #[test]
    fn pulses_never_jump_more_than_ramp(
        targets in prop::collection::vec((-1.5f32..1.5, -1.5f32..1.5), 1..200)
    ) {
        let cfg = MapperCfg::default();
        let mut m = Mapper::new(cfg, CalibrationHandle::default());
        for (speed, steer) in targets {
            let (e0, s0) = (m.current_esc(), m.current_steer());
            let e = m.map_throttle_to_pulse(speed);
            let s = m.map_steer_to_pulse(steer);
            prop_assert!(e.abs_diff(e0) <= cfg.max_esc_ramp_per_tick);
            prop_assert!(s.abs_diff(s0) <= cfg.max_steer_ramp_per_tick);
            prop_assert!((1000..=2000).contains(&e));
            prop_assert!((1000..=2000).contains(&s));
        }
    }
}

#[test]
fn calibration_update_applies_on_next_call() {
    let handle = CalibrationHandle::default();
    let mut m = Mapper::new(unramped(0.0, 0.0), handle.clone());
    assert_eq!(m.map_throttle_to_pulse(1.0), 2000);
    assert_eq!(m.map_steer_to_pulse(1.0), 1800);

    handle.update_motor(MotorPatch {
        forward_max_pulse_us: Some(1800),
        max_pulse_us: Some(1800),
        ..MotorPatch::default()
    });
    handle.update_servo(ServoPatch {
        right_pulse_us: Some(1700),
        ..ServoPatch::default()
    });
    assert_eq!(m.map_throttle_to_pulse(1.0), 1800);
    assert_eq!(m.map_steer_to_pulse(1.0), 1700);
}

#[test]
fn channel_bounds_clamp_targets() {
    let handle = CalibrationHandle::default();
    handle.update_motor(MotorPatch {
        max_pulse_us: Some(1750),
        min_pulse_us: Some(1300),
        ..MotorPatch::default()
    });
    let mut m = Mapper::new(unramped(0.0, 0.0), handle);
    assert_eq!(m.map_throttle_to_pulse(1.0), 1750);
    assert_eq!(m.map_throttle_to_pulse(-1.0), 1300);
}

#[test]
fn non_finite_motion_maps_to_neutral() {
    let mut m = Mapper::new(unramped(0.3, 0.2), CalibrationHandle::default());
    assert_eq!(m.map_throttle_to_pulse(f32::NAN), 1500);
    assert_eq!(m.map_steer_to_pulse(f32::INFINITY), 1500);
}
