//! Machine/axis/task/trajectory configuration (spec §9 ambient stack).
//!
//! Loaded from TOML by the host binary — parsing the INI/tool-table format
//! the original interpreter front-end reads is out of scope here; these
//! structs describe only the data the core motion pipeline needs, however
//! it got assembled.

use serde::{Deserialize, Serialize};

fn default_cycle_time() -> f64 {
    1.0 / 1000.0
}
fn default_tc_queue_size() -> usize {
    crate::consts::TC_QUEUE_DEFAULT_SIZE
}
fn default_req_max() -> usize {
    crate::consts::REQ_MAX
}
fn default_req_min() -> usize {
    crate::consts::REQ_MIN
}
fn default_backlash_headroom() -> f64 {
    crate::consts::BACKLASH_HEADROOM
}
fn default_units_per_rev() -> f64 {
    1.0
}

/// Top-level machine configuration: per-axis parameters plus the
/// trajectory/task defaults the dispatcher applies to every program run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub axes: Vec<AxisConfig>,
    #[serde(default)]
    pub traj: TrajConfig,
    #[serde(default)]
    pub task: TaskConfig,
}

impl MachineConfig {
    /// Validate every nested section, returning the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.is_empty() {
            return Err(ConfigError::Bounds("machine config declares no axes".into()));
        }
        for axis in &self.axes {
            axis.validate()?;
        }
        self.traj.validate()?;
        self.task.validate()?;
        Ok(())
    }
}

/// Which `Pose` scalar this axis's commanded position is drawn from. One
/// coordinate may drive more than one axis (ganged drives) by repeating it
/// across several `AxisConfig` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coordinate {
    X,
    Y,
    Z,
    A,
    B,
    C,
    U,
    V,
    W,
}

impl Coordinate {
    /// This coordinate's scalar out of `pose`.
    pub fn get(&self, pose: &crate::geometry::Pose) -> f64 {
        match self {
            Coordinate::X => pose.x,
            Coordinate::Y => pose.y,
            Coordinate::Z => pose.z,
            Coordinate::A => pose.a,
            Coordinate::B => pose.b,
            Coordinate::C => pose.c,
            Coordinate::U => pose.u,
            Coordinate::V => pose.v,
            Coordinate::W => pose.w,
        }
    }
}

/// Per-axis kinematic limits, backlash, and pin assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Human-readable axis name ("X", "Y", "Z", "A", ...).
    pub name: String,

    /// Which `Pose` scalar this axis tracks (`[AXIS_n] COORDINATE`).
    pub coordinate: Coordinate,

    pub max_velocity: f64,
    pub max_acceleration: f64,

    /// Step pulses per user unit (mm, inch, or degree).
    pub steps_per_unit: f64,

    /// Backlash magnitude in user units, corrected by the ramp generator.
    #[serde(default)]
    pub backlash: f64,

    #[serde(default = "default_backlash_headroom")]
    pub backlash_headroom: f64,

    pub min_pos_limit: f64,
    pub max_pos_limit: f64,

    /// DB25 pin numbers for step/direction output (1..=9, 0 = unassigned
    /// for an axis with no direct pin, e.g. a ganged follower driven only
    /// through its leader's coordinate).
    #[serde(default)]
    pub step_pin: u8,
    #[serde(default)]
    pub dir_pin: u8,

    #[serde(default)]
    pub step_active_high: bool,
    #[serde(default)]
    pub direction_active_high: bool,

    /// Which input pin, if any, aborts motion on a low→high transition
    /// while this axis is moving (0..=3, `None` disables).
    #[serde(default)]
    pub abort_input: Option<u8>,
}

impl AxisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_velocity <= 0.0 {
            return Err(ConfigError::Bounds(format!(
                "axis {}: max_velocity must be positive",
                self.name
            )));
        }
        if self.max_acceleration <= 0.0 {
            return Err(ConfigError::Bounds(format!(
                "axis {}: max_acceleration must be positive",
                self.name
            )));
        }
        if self.steps_per_unit <= 0.0 {
            return Err(ConfigError::Bounds(format!(
                "axis {}: steps_per_unit must be positive",
                self.name
            )));
        }
        if self.backlash < 0.0 {
            return Err(ConfigError::Bounds(format!(
                "axis {}: backlash must be non-negative",
                self.name
            )));
        }
        if self.min_pos_limit >= self.max_pos_limit {
            return Err(ConfigError::Bounds(format!(
                "axis {}: min_pos_limit must be less than max_pos_limit",
                self.name
            )));
        }
        if let Some(n) = self.abort_input {
            if n > 3 {
                return Err(ConfigError::Bounds(format!(
                    "axis {}: abort_input {} out of range 0..=3",
                    self.name, n
                )));
            }
        }
        Ok(())
    }
}

/// Trajectory planner defaults and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajConfig {
    #[serde(default = "default_cycle_time")]
    pub cycle_time: f64,
    #[serde(default = "default_tc_queue_size")]
    pub tc_queue_size: usize,
    #[serde(default = "default_req_max")]
    pub req_max: usize,
    #[serde(default = "default_req_min")]
    pub req_min: usize,
}

impl Default for TrajConfig {
    fn default() -> Self {
        Self {
            cycle_time: default_cycle_time(),
            tc_queue_size: default_tc_queue_size(),
            req_max: default_req_max(),
            req_min: default_req_min(),
        }
    }
}

impl TrajConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time <= 0.0 {
            return Err(ConfigError::Bounds("traj.cycle_time must be positive".into()));
        }
        if self.tc_queue_size <= crate::consts::TC_QUEUE_MARGIN {
            return Err(ConfigError::Bounds(format!(
                "traj.tc_queue_size must exceed the {}-entry safety margin",
                crate::consts::TC_QUEUE_MARGIN
            )));
        }
        if self.req_min >= self.req_max {
            return Err(ConfigError::Bounds(
                "traj.req_min must be less than traj.req_max".into(),
            ));
        }
        Ok(())
    }
}

/// Task-level execution defaults: feed-per-revolution for speed-feed sync,
/// and which inputs are wired for abort by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_units_per_rev")]
    pub feed_per_revolution: f64,
    #[serde(default)]
    pub rescale_for_abc: bool,
    /// `[TASK] INPUT{0..3}_ABORT` — whether a low->high transition on
    /// INPUTn raises estop (spec §4.6/§6). Index n holds INPUTn.
    #[serde(default)]
    pub input_abort: [bool; 4],
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            feed_per_revolution: default_units_per_rev(),
            rescale_for_abc: false,
            input_abort: [false; 4],
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_per_revolution <= 0.0 {
            return Err(ConfigError::Bounds(
                "task.feed_per_revolution must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Bounds(String),
    #[error("failed to parse TOML: {0}")]
    Parse(String),
    #[error("reading {path}: {message}")]
    Io { path: String, message: String },
}

/// Parse and validate a [`MachineConfig`] from a TOML document.
pub fn load_machine_config(toml_text: &str) -> Result<MachineConfig, ConfigError> {
    let cfg: MachineConfig = toml::from_str(toml_text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Read `path` and delegate to [`load_machine_config`].
pub fn load_machine_config_file(path: &std::path::Path) -> Result<MachineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    load_machine_config(&text)
}
