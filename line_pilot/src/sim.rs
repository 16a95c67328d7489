// THEORY:
// A stand-in for the real aircraft and camera, good enough to fly the whole
// autopilot on a desk. `SimulatedVehicle` plays both the command sink and the
// telemetry source; `SyntheticScene` paints frames with a colored line on a
// plain floor.
//
// The vehicle has no physics. It advances one step per telemetry read (once
// per cycle), drains its battery while airborne, and takes a configurable
// number of steps to leave or reach the ground after a takeoff or land
// command. An emergency stop grounds it immediately.

use crate::core_modules::frame::Frame;
use crate::interfaces::{CommandSink, Telemetry, TelemetrySource, VehicleCommand};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How many of the most recent commands the vehicle remembers.
pub const COMMAND_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    pub battery_percent: f64,
    /// Battery percentage points lost per second of flight.
    pub drain_per_second: f64,
    /// Simulated time per step.
    pub step: Duration,
    pub takeoff_steps: u32,
    pub landing_steps: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            battery_percent: 100.0,
            drain_per_second: 0.1,
            step: Duration::from_millis(33),
            takeoff_steps: 3,
            landing_steps: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Grounded,
    Climbing { steps_left: u32 },
    Flying,
    Descending { steps_left: u32 },
}

#[derive(Debug)]
struct VehicleState {
    config: SimConfig,
    battery: f64,
    phase: Phase,
    flight_elapsed: Duration,
    link_up: bool,
    /// The last `COMMAND_HISTORY` commands, oldest first.
    commands: VecDeque<VehicleCommand>,
    commands_received: u64,
}

impl VehicleState {
    fn airborne(&self) -> bool {
        !matches!(self.phase, Phase::Grounded)
    }

    fn step(&mut self) {
        if self.airborne() {
            self.flight_elapsed += self.config.step;
            let drain = self.config.drain_per_second * self.config.step.as_secs_f64();
            self.battery = (self.battery - drain).max(0.0);
        }
        self.phase = match self.phase {
            Phase::Climbing { steps_left: 0 } => Phase::Flying,
            Phase::Climbing { steps_left } => Phase::Climbing {
                steps_left: steps_left - 1,
            },
            Phase::Descending { steps_left: 0 } => Phase::Grounded,
            Phase::Descending { steps_left } => Phase::Descending {
                steps_left: steps_left - 1,
            },
            other => other,
        };
    }
}

/// Shared handle to one simulated aircraft. Clones see the same vehicle.
#[derive(Debug, Clone)]
pub struct SimulatedVehicle {
    state: Arc<Mutex<VehicleState>>,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        let state = VehicleState {
            config,
            battery: config.battery_percent,
            phase: Phase::Grounded,
            flight_elapsed: Duration::ZERO,
            link_up: true,
            commands: VecDeque::with_capacity(COMMAND_HISTORY),
            commands_received: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        // A panicked test thread must not wedge the vehicle for the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_battery(&self, percent: f64) {
        self.lock().battery = percent;
    }

    pub fn set_flight_elapsed(&self, elapsed: Duration) {
        self.lock().flight_elapsed = elapsed;
    }

    /// While the link is down, telemetry reads return `None` and the vehicle
    /// stands still.
    pub fn set_link(&self, up: bool) {
        self.lock().link_up = up;
    }

    pub fn is_airborne(&self) -> bool {
        self.lock().airborne()
    }

    pub fn battery_percent(&self) -> f64 {
        self.lock().battery
    }

    /// The most recent commands received, oldest first.
    pub fn commands(&self) -> Vec<VehicleCommand> {
        self.lock().commands.iter().copied().collect()
    }

    pub fn last_command(&self) -> Option<VehicleCommand> {
        self.lock().commands.back().copied()
    }

    /// Commands received over the whole session, including forgotten ones.
    pub fn commands_received(&self) -> u64 {
        self.lock().commands_received
    }
}

impl CommandSink for SimulatedVehicle {
    fn dispatch(&mut self, command: VehicleCommand) {
        let mut state = self.lock();
        if state.commands.len() == COMMAND_HISTORY {
            state.commands.pop_front();
        }
        state.commands.push_back(command);
        state.commands_received += 1;
        state.phase = match (command, state.phase) {
            (VehicleCommand::Takeoff, Phase::Grounded) => Phase::Climbing {
                steps_left: state.config.takeoff_steps,
            },
            (VehicleCommand::Land, Phase::Climbing { .. } | Phase::Flying) => Phase::Descending {
                steps_left: state.config.landing_steps,
            },
            (VehicleCommand::EmergencyStop, _) => Phase::Grounded,
            (_, phase) => phase,
        };
    }
}

impl TelemetrySource for SimulatedVehicle {
    fn read(&mut self) -> Option<Telemetry> {
        let mut state = self.lock();
        if !state.link_up {
            return None;
        }
        state.step();
        Some(Telemetry {
            battery_percent: state.battery.round().clamp(0.0, 100.0) as u8,
            flight_elapsed: state.flight_elapsed,
            airborne: state.airborne(),
        })
    }
}

/// Paints frames of a straight painted line on a plain floor, optionally
/// swaying from side to side over time.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScene {
    pub width: u32,
    pub height: u32,
    pub floor: Rgb<u8>,
    pub paint: Rgb<u8>,
    pub stroke_width: u32,
    /// Line x at the bottom row.
    pub bottom_x: f64,
    /// Line x at the top row.
    pub top_x: f64,
    /// Peak sideways drift in pixels. Zero keeps the line still.
    pub sway: f64,
    /// Frames per full sway.
    pub sway_period: u32,
}

impl SyntheticScene {
    /// A vertical line through the centre of a 960x720 frame.
    pub fn centred(paint: Rgb<u8>) -> Self {
        Self {
            width: 960,
            height: 720,
            floor: Rgb([70, 70, 70]),
            paint,
            stroke_width: 24,
            bottom_x: 480.0,
            top_x: 480.0,
            sway: 0.0,
            sway_period: 90,
        }
    }

    pub fn render(&self, step: u64) -> Frame {
        let offset = if self.sway == 0.0 || self.sway_period == 0 {
            0.0
        } else {
            let phase = (step % self.sway_period as u64) as f64 / self.sway_period as f64;
            self.sway * (phase * std::f64::consts::TAU).sin()
        };
        let half = self.stroke_width as f64 / 2.0;
        let last_row = self.height.saturating_sub(1).max(1) as f64;

        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let t = (last_row - y as f64) / last_row;
            let center = self.bottom_x + (self.top_x - self.bottom_x) * t + offset;
            let x = x as f64 + 0.5;
            if x >= center - half && x < center + half {
                self.paint
            } else {
                self.floor
            }
        });
        Frame::new(image)
    }

    /// The floor with no line on it.
    pub fn blank(&self) -> Frame {
        Frame::new(RgbImage::from_pixel(self.width, self.height, self.floor))
    }
}
