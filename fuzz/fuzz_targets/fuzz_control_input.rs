#![no_main]
use libfuzzer_sys::fuzz_target;
use rc_core::{CalibrationHandle, ControlInput, Driver, DriverCfg, Mapper, MapperCfg};

fuzz_target!(|data: &[u8]| {
    // Each line is one client message; whatever decodes must keep the
    // pulses inside calibration.
    let cal = CalibrationHandle::default();
    let c = cal.snapshot();
    let mut driver = Driver::new(DriverCfg::default());
    let mut mapper = Mapper::new(MapperCfg::default(), cal);
    for line in data.split(|b| *b == b'\n') {
        let Ok(input) = serde_json::from_slice::<ControlInput>(line) else {
            continue;
        };
        driver.tick(0.02, Some(&input), input.deadman);
        let esc = mapper.map_throttle_to_pulse(driver.speed());
        let steer = mapper.map_steer_to_pulse(driver.steer());
        assert!((c.motor.min_pulse_us..=c.motor.max_pulse_us).contains(&esc));
        assert!((c.servo.min_pulse_us..=c.servo.max_pulse_us).contains(&steer));
    }
});
