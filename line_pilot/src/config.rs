// THEORY:
// `PilotConfig` is the single, immutable description of how this vehicle
// should fly. It is built once at startup (from defaults, or from a JSON file
// whose missing fields fall back to those defaults), validated once, and then
// shared by reference with every component. Nothing in the crate reads a
// tunable from anywhere else.
//
// Validation fails fast: a config that could make the vehicle fly faster than
// the radio allows, or never recognise a low battery, is rejected before the
// first frame is processed.

use crate::core_modules::color_profile::{ColorProfile, builtin_profiles};
use crate::core_modules::line_candidate::DetectionStrategy;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// The RC stick range accepted by the vehicle: every speed lives in `-100..=100`.
pub const MAX_RC_SPEED: i32 = 100;

/// Configuration for the whole perception-and-control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    // --- Speed caps (RC units, 0..=100) ---
    /// Constant forward speed while the line is being tracked.
    pub forward_speed: i32,
    /// Cap on the lateral correction.
    pub side_speed: i32,
    /// Cap on the vertical correction.
    pub vertical_speed: i32,
    /// Cap on the yaw correction.
    pub rotation_speed: i32,

    // --- Proportional gains ---
    /// RC units per unit of normalized lateral offset.
    pub kp_lateral: f64,
    /// RC units per degree of line lean.
    pub kp_angular: f64,
    /// RC units per unit of normalized vertical offset. Zero disables altitude
    /// corrections.
    pub kp_vertical: f64,
    /// Offsets smaller than this fraction of the half-frame are treated as
    /// centred.
    pub center_tolerance: f64,

    // --- Detection ---
    /// Smallest blob, in pixels, that counts as the line.
    pub min_line_area: usize,
    /// Minimum Hough accumulator votes for a line hypothesis.
    pub hough_threshold: u32,
    /// Shortest segment, in pixels, the geometric strategy will report.
    pub hough_min_line_length: f64,
    /// Largest gap, in pixels, bridged inside one segment.
    pub hough_max_line_gap: f64,
    /// Every color the pilot knows how to follow, in cycling order.
    pub color_profiles: Vec<ColorProfile>,
    /// Profile selected at startup.
    pub default_color: String,
    /// Strategy selected at startup.
    pub default_strategy: DetectionStrategy,

    // --- Safety ---
    /// Below this battery percentage a warning is raised.
    pub low_battery_warning_pct: u8,
    /// At or below this battery percentage the vehicle is forced down.
    pub critical_battery_pct: u8,
    /// Flight time ceiling.
    pub max_flight_seconds: f64,
    /// Consecutive cycles without a line before AUTONOMOUS gives way to LINE_LOST.
    pub line_lost_debounce_cycles: u32,
    /// Cycles LINE_LOST waits for the line before handing control back to the operator.
    pub line_lost_grace_cycles: u32,
    /// Consecutive cycles without a frame before the camera is declared lost.
    pub max_missed_frames: u32,
    /// Consecutive cycles without telemetry before the link is declared lost.
    pub max_telemetry_misses: u32,

    // --- Loop timing ---
    /// Nominal control rate, normally the camera frame rate.
    pub target_rate_hz: u32,
    /// Hard per-cycle processing budget.
    pub cycle_budget_ms: u64,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            forward_speed: 40,
            side_speed: 30,
            vertical_speed: 30,
            rotation_speed: 50,
            kp_lateral: 60.0,
            kp_angular: 1.0,
            kp_vertical: 0.0,
            center_tolerance: 0.1,
            min_line_area: 500,
            hough_threshold: 50,
            hough_min_line_length: 50.0,
            hough_max_line_gap: 10.0,
            color_profiles: builtin_profiles(),
            default_color: "white".to_string(),
            default_strategy: DetectionStrategy::Contour,
            low_battery_warning_pct: 20,
            critical_battery_pct: 10,
            max_flight_seconds: 300.0,
            line_lost_debounce_cycles: 5,
            line_lost_grace_cycles: 30,
            max_missed_frames: 30,
            max_telemetry_misses: 90,
            target_rate_hz: 30,
            cycle_budget_ms: 33,
        }
    }
}

impl PilotConfig {
    /// Loads a JSON config file, fills gaps from the defaults, and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PilotConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [
            ("forward_speed", self.forward_speed),
            ("side_speed", self.side_speed),
            ("vertical_speed", self.vertical_speed),
            ("rotation_speed", self.rotation_speed),
        ] {
            if !(0..=MAX_RC_SPEED).contains(&value) {
                return Err(ConfigError::SpeedOutOfRange {
                    name,
                    value,
                    max: MAX_RC_SPEED,
                });
            }
        }

        for (name, value) in [
            ("kp_lateral", self.kp_lateral),
            ("kp_angular", self.kp_angular),
            ("kp_vertical", self.kp_vertical),
            ("hough_min_line_length", self.hough_min_line_length),
            ("hough_max_line_gap", self.hough_max_line_gap),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }

        if !self.center_tolerance.is_finite() || !(0.0..1.0).contains(&self.center_tolerance) {
            return Err(ConfigError::InvalidCenterTolerance(self.center_tolerance));
        }

        for (name, is_zero) in [
            ("min_line_area", self.min_line_area == 0),
            ("hough_threshold", self.hough_threshold == 0),
            ("line_lost_debounce_cycles", self.line_lost_debounce_cycles == 0),
            ("line_lost_grace_cycles", self.line_lost_grace_cycles == 0),
            ("max_missed_frames", self.max_missed_frames == 0),
            ("max_telemetry_misses", self.max_telemetry_misses == 0),
            ("target_rate_hz", self.target_rate_hz == 0),
            ("cycle_budget_ms", self.cycle_budget_ms == 0),
        ] {
            if is_zero {
                return Err(ConfigError::ZeroValue { name });
            }
        }

        for (name, value) in [
            ("low_battery_warning_pct", self.low_battery_warning_pct),
            ("critical_battery_pct", self.critical_battery_pct),
        ] {
            if value > 100 {
                return Err(ConfigError::PercentOutOfRange { name, value });
            }
        }
        if self.critical_battery_pct >= self.low_battery_warning_pct {
            return Err(ConfigError::BatteryThresholdOrder {
                critical: self.critical_battery_pct,
                warning: self.low_battery_warning_pct,
            });
        }

        if !self.max_flight_seconds.is_finite() || self.max_flight_seconds <= 0.0 {
            return Err(ConfigError::InvalidFlightCeiling(self.max_flight_seconds));
        }

        if self.color_profiles.is_empty() {
            return Err(ConfigError::NoColorProfiles);
        }
        let mut seen = HashSet::new();
        for profile in &self.color_profiles {
            profile.validate()?;
            if !seen.insert(profile.name.as_str()) {
                return Err(ConfigError::DuplicateColorProfile(profile.name.clone()));
            }
        }
        if self.profile(&self.default_color).is_none() {
            return Err(ConfigError::UnknownDefaultColor(self.default_color.clone()));
        }

        Ok(())
    }

    /// Looks a color profile up by name.
    pub fn profile(&self, name: &str) -> Option<&ColorProfile> {
        self.color_profiles.iter().find(|p| p.name == name)
    }

    /// Index of a profile in cycling order.
    pub fn profile_index(&self, name: &str) -> Option<usize> {
        self.color_profiles.iter().position(|p| p.name == name)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_rate_hz as f64)
    }

    pub fn cycle_budget(&self) -> Duration {
        Duration::from_millis(self.cycle_budget_ms)
    }
}
