use proptest::prelude::*;
use rc_core::{ControlInput, Driver, DriverCfg};
use rstest::rstest;

const DT: f32 = 0.02;

fn drive_to_full_forward(d: &mut Driver) {
    let fwd = ControlInput::keys(true, false, false, false);
    for _ in 0..200 {
        d.tick(DT, Some(&fwd), true);
    }
    assert_eq!(d.speed(), 1.0);
}

fn input_strategy() -> impl Strategy<Value = Option<ControlInput>> {
    let keys = (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
        .prop_map(|(f, b, l, r, dm)| ControlInput::keys(f, b, l, r).with_deadman(dm));
    let analog = (-2.0f32..2.0, -2.0f32..2.0, any::<bool>())
        .prop_map(|(t, s, dm)| ControlInput::analog(t, s).with_deadman(dm));
    prop_oneof![Just(None), keys.prop_map(Some), analog.prop_map(Some)]
}

proptest! {
    #[test]
    fn speed_and_steer_stay_in_bounds(
        steps in prop::collection::vec((0.0f32..0.5, input_strategy(), any::<bool>()), 1..300)
    ) {
        let mut d = Driver::new(DriverCfg::default());
        let max_rev = d.cfg().max_reverse_speed;
        for (dt, input, deadman) in steps {
            d.tick(dt, input.as_ref(), deadman);
            prop_assert!(d.speed() >= -max_rev && d.speed() <= 1.0, "speed {}", d.speed());
            prop_assert!(d.steer() >= -1.0 && d.steer() <= 1.0, "steer {}", d.steer());
        }
    }

    #[test]
    fn per_tick_change_is_rate_limited(
        steps in prop::collection::vec((0.001f32..0.1, input_strategy(), any::<bool>()), 1..200)
    ) {
        let cfg = DriverCfg::default();
        let max_speed_rate = (cfg.accel_rate * 2.0)
            .max(cfg.brake_rate)
            .max(cfg.coast_rate)
            .max(cfg.reverse_accel_rate);
        let max_steer_rate = (cfg.steer_rate * 2.0).max(cfg.steer_return_rate);
        let mut d = Driver::new(cfg);
        for (dt, input, deadman) in steps {
            let (s0, t0) = (d.speed(), d.steer());
            d.tick(dt, input.as_ref(), deadman);
            // Snapping to zero inside stop_threshold may add up to that much.
            let speed_budget = max_speed_rate * dt + cfg.stop_threshold + 1e-5;
            let steer_budget = max_steer_rate * dt + cfg.stop_threshold + 1e-5;
            prop_assert!((d.speed() - s0).abs() <= speed_budget);
            prop_assert!((d.steer() - t0).abs() <= steer_budget);
        }
    }

    #[test]
    fn backward_from_forward_stops_before_reversing(dt in 0.001f32..0.5) {
        let mut d = Driver::new(DriverCfg::default());
        drive_to_full_forward(&mut d);
        let back = ControlInput::keys(false, true, false, false);
        let mut seen_zero = false;
        for _ in 0..2000 {
            let before = d.speed();
            d.tick(dt, Some(&back), true);
            let after = d.speed();
            prop_assert!(!(before > 0.0 && after < 0.0), "sign flip {before} -> {after}");
            if after == 0.0 {
                seen_zero = true;
            }
            if after < 0.0 {
                prop_assert!(seen_zero);
            }
        }
        prop_assert!((d.speed() + d.cfg().max_reverse_speed).abs() < 1e-5);
    }
}

#[rstest]
#[case::no_input(None, true)]
#[case::deadman_released(Some(ControlInput::keys(true, false, false, true)), false)]
#[case::analog_deadman_released(Some(ControlInput::analog(1.0, 1.0)), false)]
fn failsafe_converges_to_exact_zero(#[case] input: Option<ControlInput>, #[case] deadman: bool) {
    let mut d = Driver::new(DriverCfg::default());
    let full = ControlInput::analog(1.0, 1.0);
    for _ in 0..100 {
        d.tick(DT, Some(&full), true);
    }
    assert_eq!((d.speed(), d.steer()), (1.0, 1.0));

    // 1.0 / (brake_rate * DT) = 16.7 ticks; steer returns faster.
    for _ in 0..17 {
        d.tick(DT, input.as_ref(), deadman);
    }
    assert_eq!(d.speed(), 0.0);
    assert_eq!(d.steer(), 0.0);
}

#[test]
fn release_while_braking_clears_latch() {
    let mut d = Driver::new(DriverCfg::default());
    drive_to_full_forward(&mut d);
    let back = ControlInput::keys(false, true, false, false);
    for _ in 0..5 {
        d.tick(DT, Some(&back), true);
    }
    assert!(d.speed() > 0.0);

    // Letting go coasts to a stop and clears the latch...
    let idle = ControlInput::keys(false, false, false, false);
    for _ in 0..100 {
        d.tick(DT, Some(&idle), true);
    }
    assert_eq!(d.speed(), 0.0);

    // ...so backward now reverses straight away.
    d.tick(DT, Some(&back), true);
    assert!(d.speed() < 0.0);
}

#[test]
fn analog_full_throttle_reaches_one_within_a_second() {
    let mut d = Driver::new(DriverCfg::default());
    let input = ControlInput::analog(1.0, 0.0);
    let mut reached = None;
    for i in 0..100 {
        d.tick(DT, Some(&input), true);
        if reached.is_none() && d.speed() == 1.0 {
            reached = Some(i + 1);
        }
    }
    let ticks = reached.expect("never reached full speed");
    assert!(ticks <= 50, "took {ticks} ticks");
    assert_eq!(d.speed(), 1.0);
}

#[test]
fn zero_and_negative_dt_are_no_ops_for_motion() {
    let mut d = Driver::new(DriverCfg::default());
    let fwd = ControlInput::keys(true, false, false, false);
    d.tick(0.0, Some(&fwd), true);
    d.tick(-1.0, Some(&fwd), true);
    d.tick(f32::NAN, Some(&fwd), true);
    assert_eq!(d.speed(), 0.0);
}
