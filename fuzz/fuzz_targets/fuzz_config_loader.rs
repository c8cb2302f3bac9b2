#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse or validation errors are fine; panics are not. Anything that
    // validates must also build a loop.
    let Ok(cfg) = rc_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let tuning = rc_core::Tuning::from(&cfg);
        let cal = rc_core::CalibrationHandle::new(rc_core::Calibration::from(&cfg));
        let out = rc_core::mocks::RecordingOutput::new();
        assert!(rc_core::ControlLoop::new(out, cal, tuning.control, tuning.driver, tuning.mapper).is_ok());
    }
});
