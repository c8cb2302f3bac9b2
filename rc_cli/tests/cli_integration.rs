use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const CALIBRATION: &str = r#"
[servo]
channel = 0
min_pulse_us = 1000
max_pulse_us = 2000
left_pulse_us = 1200
center_pulse_us = 1500
right_pulse_us = 1800

[motor]
channel = 1
min_pulse_us = 1000
max_pulse_us = 2000
neutral_pulse_us = 1500
forward_min_pulse_us = 1550
forward_max_pulse_us = 2000
reverse_max_pulse_us = 1450
reverse_min_pulse_us = 1000
"#;

// Calibration only; everything else takes its defaults.
fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("rcdrive.toml");
    fs::write(&path, format!("{CALIBRATION}\n{extra}")).unwrap();
    path
}

fn rcdrive(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rcdrive").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["check-config"], 0, "config OK", "stdout")]
#[case(&["pulse", "--channel", "16", "--us", "1500", "--sim"], 1, "channel must be in 0..=15", "stderr")]
#[case(&["pulse", "--channel", "0", "--us", "2600", "--sim"], 1, "500..=2500", "stderr")]
#[case(&["pulse", "--channel", "3", "--us", "1500", "--sim"], 0, "channel 3 set to 1500 us", "stdout")]
#[case(&["pulse", "--channel", "3"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = rcdrive(&cfg);
    cmd.args(args);
    let assert = cmd.assert().code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("nope.toml");
    rcdrive(&cfg)
        .arg("check-config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be read"));
}

#[rstest]
#[case("[mapper]\nthrottle_expo = 1.5\n", "mapper.throttle_expo")]
#[case("[control]\ntick_rate_hz = 0\n", "control.tick_rate_hz")]
fn invalid_config_names_the_key(#[case] extra: &str, #[case] key: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, extra);
    rcdrive(&cfg)
        .arg("check-config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains(key));
}

#[test]
fn missing_calibration_table_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("rcdrive.toml");
    fs::write(&cfg, "[control]\ntick_rate_hz = 50\n").unwrap();
    rcdrive(&cfg)
        .arg("check-config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid TOML for rcdrive"));
}

#[test]
fn json_mode_reports_structured_errors() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = rcdrive(&cfg)
        .args(["--json", "pulse", "--channel", "20", "--us", "1500", "--sim"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let last = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["reason"], "Error");
}

#[test]
fn sim_run_streams_telemetry_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = rcdrive(&cfg)
        .args(["run", "--sim", "--telemetry", "--duration-ms", "500"])
        .write_stdin("{\"type\":\"analog\",\"deadman\":true,\"throttle\":1.0,\"steer\":0.0}\n")
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(frames.len() >= 3, "expected several telemetry lines, got {}", frames.len());
    for f in &frames {
        let esc = f["esc_pulse_us"].as_u64().unwrap();
        assert!((1000..=2000).contains(&esc));
        assert!(f["steer_pulse_us"].is_u64());
    }

    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("rcdrive stats"));
}

#[test]
fn sim_run_stops_at_end_of_input() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    rcdrive(&cfg)
        .args(["run", "--sim"])
        .write_stdin("{\"type\":\"keys\",\"deadman\":true,\"forward\":true}\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stderr(predicate::str::contains("Inputs accepted/rejected: 1 / 0"));
}
