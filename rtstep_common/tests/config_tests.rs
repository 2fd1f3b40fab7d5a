//! File-backed config loading tests, grounded on the teacher's own
//! `evo_common/tests/config_tests.rs` (auto-discovery against real files in
//! a `TempDir` rather than in-memory strings only).

use rtstep_common::config::{load_machine_config_file, ConfigError};
use std::fs;
use tempfile::TempDir;

fn write_machine_toml(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("machine.toml");
    fs::write(&path, body).unwrap();
    path
}

const VALID_ONE_AXIS: &str = r#"
[[axes]]
name = "X"
coordinate = "X"
max_velocity = 1.0
max_acceleration = 10.0
steps_per_unit = 2000.0
backlash = 0.01
min_pos_limit = -10.0
max_pos_limit = 10.0
step_pin = 2
dir_pin = 3
step_active_high = true
direction_active_high = true
"#;

#[test]
fn loads_a_valid_config_from_a_real_file() {
    let dir = TempDir::new().unwrap();
    let path = write_machine_toml(dir.path(), VALID_ONE_AXIS);
    let cfg = load_machine_config_file(&path).unwrap();
    assert_eq!(cfg.axes.len(), 1);
    assert_eq!(cfg.axes[0].name, "X");
    // Defaults fill in the [traj]/[task] sections when absent.
    assert_eq!(cfg.traj.tc_queue_size, rtstep_common::consts::TC_QUEUE_DEFAULT_SIZE);
}

#[test]
fn missing_file_reports_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");
    let err = load_machine_config_file(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn invalid_bounds_in_a_real_file_are_rejected() {
    let dir = TempDir::new().unwrap();
    let body = VALID_ONE_AXIS.replace("max_velocity = 1.0", "max_velocity = -1.0");
    let path = write_machine_toml(dir.path(), &body);
    let err = load_machine_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Bounds(_)));
}

#[test]
fn two_axis_file_round_trips_both_coordinates() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{VALID_ONE_AXIS}\n[[axes]]\nname = \"Y\"\ncoordinate = \"Y\"\nmax_velocity = 1.0\n\
         max_acceleration = 10.0\nsteps_per_unit = 2000.0\nmin_pos_limit = -10.0\nmax_pos_limit = 10.0\n\
         step_pin = 4\ndir_pin = 5\nstep_active_high = true\ndirection_active_high = true\n"
    );
    let path = write_machine_toml(dir.path(), &body);
    let cfg = load_machine_config_file(&path).unwrap();
    assert_eq!(cfg.axes.len(), 2);
    assert_eq!(cfg.axes[1].name, "Y");
}
