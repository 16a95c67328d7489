// THEORY:
// The `ProportionalController` turns a `TrackingError` into stick positions.
// It is deliberately dumb: one gain per axis, one cap per axis, no memory.
//
// Key architectural principles:
// 1.  **Never Fly Blind**: An invalid error yields the neutral command and a
//     `line_missing` flag. The state machine decides what losing the line
//     means; the controller never extrapolates where it might be.
// 2.  **Constant Advance**: While the line is tracked, forward speed is held
//     at its configured value. Steering corrects drift; it never stops the
//     vehicle to think.
// 3.  **Bounded Output**: Every axis is clamped to its configured cap before
//     rounding to whole RC units, so the output is always finite and in range.

use crate::config::PilotConfig;
use crate::core_modules::tracking::TrackingError;
use std::fmt;

/// One cycle's stick positions in RC units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VelocityCommand {
    /// Positive flies forward.
    pub forward: i32,
    /// Positive moves right.
    pub lateral: i32,
    /// Positive climbs.
    pub vertical: i32,
    /// Positive turns clockwise (to the right).
    pub yaw: i32,
}

impl VelocityCommand {
    /// All sticks centred: hover in place.
    pub const fn neutral() -> Self {
        Self {
            forward: 0,
            lateral: 0,
            vertical: 0,
            yaw: 0,
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::neutral()
    }
}

impl fmt::Display for VelocityCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fwd={} lat={} vert={} yaw={}",
            self.forward, self.lateral, self.vertical, self.yaw
        )
    }
}

/// The controller's answer for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlOutcome {
    pub command: VelocityCommand,
    /// Set when the error was invalid. The command is neutral in that case.
    pub line_missing: bool,
}

fn proportional(gain: f64, offset: f64, cap: i32) -> i32 {
    let cap = cap as f64;
    let value = (gain * offset).clamp(-cap, cap).round();
    if value.is_finite() { value as i32 } else { 0 }
}

/// Maps a tracking error onto a bounded velocity command.
pub fn compute_command(error: &TrackingError, config: &PilotConfig) -> ControlOutcome {
    if !error.valid || !error.lateral_offset.is_finite() || !error.vertical_offset.is_finite() {
        return ControlOutcome {
            command: VelocityCommand::neutral(),
            line_missing: true,
        };
    }

    let lateral = if error.lateral_offset.abs() < config.center_tolerance {
        0
    } else {
        proportional(config.kp_lateral, error.lateral_offset, config.side_speed)
    };

    // Anchor below centre means the vehicle is riding high: descend.
    let vertical = if error.vertical_offset.abs() < config.center_tolerance {
        0
    } else {
        proportional(-config.kp_vertical, error.vertical_offset, config.vertical_speed)
    };

    let yaw = match error.angular_offset {
        Some(angle) if angle.is_finite() => {
            proportional(config.kp_angular, angle, config.rotation_speed)
        }
        _ => 0,
    };

    ControlOutcome {
        command: VelocityCommand {
            forward: config.forward_speed,
            lateral,
            vertical,
            yaw,
        },
        line_missing: false,
    }
}
