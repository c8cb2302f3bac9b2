//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use rc_core::error::{BuildError, LoopError};
    use rc_hardware::HwError;

    // Typed matches first
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid tuning ({msg}).\nLikely causes: Out-of-range values in [control], [driver] or [mapper].\nHow to fix: Edit the config file and run `rcdrive check-config`."
        );
    }

    if let Some(le) = err.downcast_ref::<LoopError>() {
        return match le {
            LoopError::Spawn(e) => format!(
                "What happened: The control loop could not start its tick thread ({e}).\nLikely causes: Process or memory limits reached.\nHow to fix: Check `ulimit -u` and available memory, then retry."
            ),
            LoopError::TickPanicked => {
                "What happened: The tick thread panicked.\nLikely causes: A bug; the actuators were left wherever the last write put them.\nHow to fix: Re-run with --log-level=trace and report the log.".to_string()
            }
            LoopError::Running => {
                "What happened: A manual step was requested while the loop was running.\nLikely causes: Internal misuse.\nHow to fix: Stop the loop first.".to_string()
            }
        };
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return match he {
            HwError::InvalidChannel(ch) => format!(
                "What happened: Channel {ch} does not exist on the PWM board.\nLikely causes: Wrong channel in [servo]/[motor] or on the command line.\nHow to fix: Use a channel in 0..=15."
            ),
            HwError::I2c(msg) => format!(
                "What happened: I2C communication with the PCA9685 failed ({msg}).\nLikely causes: Board unpowered, SDA/SCL miswired, wrong bus or address.\nHow to fix: Check wiring and run `i2cdetect -y <bus>`; fix [i2c] bus/address in the config."
            ),
            other => format!(
                "What happened: PWM hardware error ({other}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file. ({msg})"
        );
    }

    if lower.contains("parse config") || lower.contains("missing field") {
        return format!(
            "What happened: The config file is not valid TOML for rcdrive.\nLikely causes: A required [servo]/[motor] key is missing or has the wrong type.\nHow to fix: Compare with etc/rcdrive.toml. ({msg})"
        );
    }

    if lower.contains("invalid config") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Pulse calibration out of order or out-of-range tuning.\nHow to fix: Fix the named key and rerun. ({msg})"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error family; anything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<rc_core::error::BuildError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<rc_core::error::LoopError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<rc_hardware::HwError>().is_some() {
        return 5;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = if err.downcast_ref::<rc_core::error::BuildError>().is_some() {
        "InvalidTuning"
    } else if err.downcast_ref::<rc_core::error::LoopError>().is_some() {
        "Loop"
    } else if err.downcast_ref::<rc_hardware::HwError>().is_some() {
        "Hardware"
    } else {
        "Error"
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_gets_tuning_hint_and_code() {
        let err = eyre::Report::new(rc_core::BuildError::InvalidConfig("expo must be in [0, 1]"));
        assert!(humanize(&err).contains("expo must be in [0, 1]"));
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(format_error_json(&err).contains("InvalidTuning"));
    }

    #[test]
    fn hw_error_mentions_wiring() {
        let err = eyre::Report::new(rc_hardware::HwError::I2c("nack".into()));
        assert!(humanize(&err).contains("i2cdetect"));
        assert_eq!(exit_code_for_error(&err), 5);
    }

    #[test]
    fn unknown_error_falls_back() {
        let err = eyre::eyre!("boom");
        assert!(humanize(&err).contains("Something went wrong"));
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
