// THEORY:
// The `FlightModeMachine` owns the one piece of state that outlives a cycle:
// which mode the vehicle is in. It is also the only component that decides
// what goes to the vehicle. Operator input, the controller's output and the
// safety verdict all arrive here as *requests*; the machine turns them into at
// most one `VehicleCommand` per cycle.
//
// Key architectural principles:
// 1.  **Explicit transitions**: The mode only changes through `transition`,
//     which records a `Transition { from, to, reason }` and logs it. Requests
//     that make no sense in the current mode are rejected with a reason and
//     leave the mode untouched.
// 2.  **Emergency is one-way**: Any state can be forced into EMERGENCY, and
//     EMERGENCY always becomes LANDING in the same cycle. Nothing but the
//     vehicle confirming it is on the ground leaves LANDING. A fault forces
//     the path once when it is raised; a vehicle already on the ground is then
//     left to settle there while the fault persists.
// 3.  **Single writer**: Discrete actions decided this cycle take precedence
//     (emergency stop over land over takeoff). Otherwise the mode alone picks
//     the velocity source: the operator's sticks in MANUAL, the controller in
//     AUTONOMOUS, a neutral hover in the transitional modes, and silence on the
//     ground or mid-emergency. Sources are never blended.
// 4.  **Debounce and grace**: One noisy frame does not drop autonomous
//     tracking, and a lost line does not leave the vehicle hovering forever.

use crate::config::PilotConfig;
use crate::core_modules::controller::{ControlOutcome, VelocityCommand};
use crate::core_modules::line_candidate::DetectionStrategy;
use crate::core_modules::safety_monitor::SafetyStatus;
use crate::interfaces::{Telemetry, VehicleCommand};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlightMode {
    #[default]
    Grounded,
    Takeoff,
    Manual,
    Autonomous,
    LineLost,
    Emergency,
    Landing,
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightMode::Grounded => "GROUNDED",
            FlightMode::Takeoff => "TAKEOFF",
            FlightMode::Manual => "MANUAL",
            FlightMode::Autonomous => "AUTONOMOUS",
            FlightMode::LineLost => "LINE_LOST",
            FlightMode::Emergency => "EMERGENCY",
            FlightMode::Landing => "LANDING",
        };
        f.write_str(name)
    }
}

/// Why the emergency landing path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmergencyReason {
    ExplicitRequest,
    CriticalBattery,
    FlightTimeExceeded,
    FrameSourceLost,
    TelemetryLost,
}

impl fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EmergencyReason::ExplicitRequest => "explicit request",
            EmergencyReason::CriticalBattery => "critical battery",
            EmergencyReason::FlightTimeExceeded => "flight time exceeded",
            EmergencyReason::FrameSourceLost => "frame source lost",
            EmergencyReason::TelemetryLost => "telemetry lost",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    TakeoffRequested,
    TakeoffComplete,
    AutonomousEngaged,
    AutonomousDisengaged,
    /// The line stayed invalid for the debounce window.
    LineLost { cycles: u32 },
    LineReacquired,
    /// LINE_LOST waited out its grace period.
    GraceExpired { cycles: u32 },
    LandRequested,
    LandingComplete,
    Emergency(EmergencyReason),
    EmergencyLanding,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::TakeoffRequested => write!(f, "takeoff requested"),
            TransitionReason::TakeoffComplete => write!(f, "takeoff complete"),
            TransitionReason::AutonomousEngaged => write!(f, "autonomous engaged"),
            TransitionReason::AutonomousDisengaged => write!(f, "autonomous disengaged"),
            TransitionReason::LineLost { cycles } => {
                write!(f, "line missing for {cycles} cycles")
            }
            TransitionReason::LineReacquired => write!(f, "line reacquired"),
            TransitionReason::GraceExpired { cycles } => {
                write!(f, "line not recovered after {cycles} cycles")
            }
            TransitionReason::LandRequested => write!(f, "land requested"),
            TransitionReason::LandingComplete => write!(f, "landing complete"),
            TransitionReason::Emergency(reason) => write!(f, "emergency: {reason}"),
            TransitionReason::EmergencyLanding => write!(f, "emergency landing"),
        }
    }
}

/// One recorded mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlightMode,
    pub to: FlightMode,
    pub reason: TransitionReason,
}

/// A manual request the machine refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("battery {battery}% is at or below the critical threshold {critical}%")]
    BatteryTooLow { battery: u8, critical: u8 },

    #[error("no telemetry from the vehicle")]
    TelemetryUnavailable,

    #[error("{request} is not allowed in {mode}")]
    InvalidInMode { request: &'static str, mode: FlightMode },

    #[error("unknown line color '{0}'")]
    UnknownColor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Forward,
    Lateral,
    Vertical,
    Yaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Positive,
    Negative,
}

/// A typed manual input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PilotEvent {
    Takeoff,
    Land,
    Emergency,
    ToggleAutonomous,
    EngageAutonomous,
    DisengageAutonomous,
    SelectColor(String),
    CycleColor,
    SelectStrategy(DetectionStrategy),
    /// Stick held on an axis.
    Move(Axis, Direction),
    /// Stick released on an axis.
    Release(Axis),
}

const COLOR_KEYS: [(&str, &str); 5] = [
    ("1", "white"),
    ("2", "red"),
    ("3", "green"),
    ("4", "yellow"),
    ("5", "blue"),
];

fn movement_key(key: &str) -> Option<(Axis, Direction)> {
    let binding = match key {
        "up" => (Axis::Forward, Direction::Positive),
        "down" => (Axis::Forward, Direction::Negative),
        "right" => (Axis::Lateral, Direction::Positive),
        "left" => (Axis::Lateral, Direction::Negative),
        "pageup" => (Axis::Vertical, Direction::Positive),
        "pagedown" => (Axis::Vertical, Direction::Negative),
        "e" => (Axis::Yaw, Direction::Positive),
        "q" => (Axis::Yaw, Direction::Negative),
        _ => return None,
    };
    Some(binding)
}

impl PilotEvent {
    /// Maps a key press to an event. Letter keys are case-insensitive;
    /// unknown keys map to `None` and are ignored by callers.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        if let Some((_, color)) = COLOR_KEYS.iter().find(|(k, _)| *k == key) {
            return Some(PilotEvent::SelectColor((*color).to_string()));
        }
        if let Some((axis, direction)) = movement_key(&key) {
            return Some(PilotEvent::Move(axis, direction));
        }
        let event = match key.as_str() {
            "t" => PilotEvent::Takeoff,
            "l" => PilotEvent::Land,
            "a" => PilotEvent::EngageAutonomous,
            "s" => PilotEvent::DisengageAutonomous,
            "space" => PilotEvent::ToggleAutonomous,
            "c" => PilotEvent::CycleColor,
            "h" => PilotEvent::SelectStrategy(DetectionStrategy::Hough),
            "o" => PilotEvent::SelectStrategy(DetectionStrategy::Contour),
            "esc" | "escape" => PilotEvent::Emergency,
            _ => return None,
        };
        Some(event)
    }

    /// Maps a key release to an event. Only movement keys have one.
    pub fn from_key_release(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        movement_key(&key).map(|(axis, _)| PilotEvent::Release(axis))
    }
}

/// Sticks currently held by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ManualSticks {
    forward: Option<Direction>,
    lateral: Option<Direction>,
    vertical: Option<Direction>,
    yaw: Option<Direction>,
}

impl ManualSticks {
    fn slot(&mut self, axis: Axis) -> &mut Option<Direction> {
        match axis {
            Axis::Forward => &mut self.forward,
            Axis::Lateral => &mut self.lateral,
            Axis::Vertical => &mut self.vertical,
            Axis::Yaw => &mut self.yaw,
        }
    }

    fn command(&self, config: &PilotConfig) -> VelocityCommand {
        let axis = |held: Option<Direction>, speed: i32| match held {
            Some(Direction::Positive) => speed,
            Some(Direction::Negative) => -speed,
            None => 0,
        };
        VelocityCommand {
            forward: axis(self.forward, config.forward_speed),
            lateral: axis(self.lateral, config.side_speed),
            vertical: axis(self.vertical, config.vertical_speed),
            yaw: axis(self.yaw, config.rotation_speed),
        }
    }
}

/// Discrete actions in increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DiscreteAction {
    Takeoff,
    Land,
    EmergencyStop,
}

impl From<DiscreteAction> for VehicleCommand {
    fn from(action: DiscreteAction) -> Self {
        match action {
            DiscreteAction::Takeoff => VehicleCommand::Takeoff,
            DiscreteAction::Land => VehicleCommand::Land,
            DiscreteAction::EmergencyStop => VehicleCommand::EmergencyStop,
        }
    }
}

pub struct FlightModeMachine {
    mode: FlightMode,
    debounce_cycles: u32,
    grace_cycles: u32,
    /// Consecutive invalid cycles while AUTONOMOUS.
    invalid_streak: u32,
    /// Consecutive invalid cycles while LINE_LOST.
    lost_cycles: u32,
    sticks: ManualSticks,
    color: String,
    strategy: DetectionStrategy,
    pending: Option<DiscreteAction>,
    /// The safety fault raised in the latest check, if any.
    safety_fault: Option<EmergencyReason>,
    frame_loss_raised: bool,
    transitions: Vec<Transition>,
    rejections: Vec<Rejection>,
}

impl FlightModeMachine {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            mode: FlightMode::Grounded,
            debounce_cycles: config.line_lost_debounce_cycles,
            grace_cycles: config.line_lost_grace_cycles,
            invalid_streak: 0,
            lost_cycles: 0,
            sticks: ManualSticks::default(),
            color: config.default_color.clone(),
            strategy: config.default_strategy,
            pending: None,
            safety_fault: None,
            frame_loss_raised: false,
            transitions: Vec::new(),
            rejections: Vec::new(),
        }
    }

    /// Picks up new thresholds. A selected color the new config no longer
    /// knows falls back to its default.
    pub fn reconfigure(&mut self, config: &PilotConfig) {
        self.debounce_cycles = config.line_lost_debounce_cycles;
        self.grace_cycles = config.line_lost_grace_cycles;
        if config.profile(&self.color).is_none() {
            log::warn!(
                "color '{}' dropped by new config, following '{}'",
                self.color,
                config.default_color
            );
            self.color = config.default_color.clone();
        }
    }

    pub fn mode(&self) -> FlightMode {
        self.mode
    }

    pub fn active_color(&self) -> &str {
        &self.color
    }

    pub fn active_strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    /// Whether an emergency has been decided this cycle.
    pub fn emergency_pending(&self) -> bool {
        self.pending == Some(DiscreteAction::EmergencyStop)
            || self.transitions.iter().any(|t| t.to == FlightMode::Emergency)
    }

    /// Whether this cycle needs the controller's output.
    pub fn wants_control(&self) -> bool {
        matches!(self.mode, FlightMode::Autonomous | FlightMode::LineLost)
            && !self.emergency_pending()
    }

    fn transition(&mut self, to: FlightMode, reason: TransitionReason) {
        let from = self.mode;
        if from == to {
            return;
        }
        let transition = Transition { from, to, reason };
        match reason {
            TransitionReason::Emergency(_) => log::error!("mode {from} -> {to}: {reason}"),
            _ => log::info!("mode {from} -> {to}: {reason}"),
        }
        if to == FlightMode::Autonomous {
            self.invalid_streak = 0;
            self.lost_cycles = 0;
        }
        if to == FlightMode::LineLost {
            self.lost_cycles = 0;
        }
        self.mode = to;
        self.transitions.push(transition);
    }

    fn queue(&mut self, action: DiscreteAction) {
        self.pending = Some(self.pending.map_or(action, |current| current.max(action)));
    }

    fn reject(&mut self, rejection: Rejection) -> Result<(), Rejection> {
        log::warn!("request rejected: {rejection}");
        self.rejections.push(rejection.clone());
        Err(rejection)
    }

    fn invalid_in_mode(&mut self, request: &'static str) -> Result<(), Rejection> {
        let mode = self.mode;
        self.reject(Rejection::InvalidInMode { request, mode })
    }

    /// Takes the emergency landing path: EMERGENCY, then LANDING in the same cycle.
    pub fn force_emergency(&mut self, reason: EmergencyReason) {
        self.transition(FlightMode::Emergency, TransitionReason::Emergency(reason));
        let action = match reason {
            EmergencyReason::ExplicitRequest => DiscreteAction::EmergencyStop,
            _ => DiscreteAction::Land,
        };
        self.queue(action);
        self.transition(FlightMode::Landing, TransitionReason::EmergencyLanding);
    }

    /// Applies the safety verdict. A fault forces the emergency path from any
    /// airborne mode every cycle it holds, and from GROUNDED only in the cycle
    /// it is raised.
    pub fn apply_safety(&mut self, status: &SafetyStatus) {
        let Some(reason) = status.emergency_reason() else {
            self.safety_fault = None;
            return;
        };
        let raised = self.safety_fault != Some(reason);
        self.safety_fault = Some(reason);
        self.raise_fault(reason, raised);
    }

    /// The frame source has been silent past its ceiling.
    pub fn frame_source_lost(&mut self) {
        let raised = !self.frame_loss_raised;
        self.frame_loss_raised = true;
        self.raise_fault(EmergencyReason::FrameSourceLost, raised);
    }

    /// Frames are arriving again.
    pub fn frame_source_restored(&mut self) {
        self.frame_loss_raised = false;
    }

    fn raise_fault(&mut self, reason: EmergencyReason, raised: bool) {
        match self.mode {
            FlightMode::Landing => {
                if raised {
                    log::warn!("{reason} while already landing");
                }
            }
            FlightMode::Grounded if !raised => {}
            _ => self.force_emergency(reason),
        }
    }

    /// Drives the transitions the vehicle confirms: takeoff and landing completion.
    pub fn observe_vehicle(&mut self, telemetry: Option<&Telemetry>) {
        let Some(reading) = telemetry else {
            return;
        };
        match self.mode {
            FlightMode::Takeoff if reading.airborne => {
                self.transition(FlightMode::Manual, TransitionReason::TakeoffComplete)
            }
            FlightMode::Landing if !reading.airborne => {
                self.sticks = ManualSticks::default();
                self.transition(FlightMode::Grounded, TransitionReason::LandingComplete)
            }
            _ => {}
        }
    }

    /// Feeds this cycle's detection result through the debounce and grace counters.
    pub fn observe_tracking(&mut self, line_missing: bool) {
        match self.mode {
            FlightMode::Autonomous => {
                if !line_missing {
                    self.invalid_streak = 0;
                    return;
                }
                self.invalid_streak += 1;
                if self.invalid_streak >= self.debounce_cycles {
                    let cycles = self.invalid_streak;
                    self.transition(FlightMode::LineLost, TransitionReason::LineLost { cycles });
                }
            }
            FlightMode::LineLost => {
                if !line_missing {
                    self.transition(FlightMode::Autonomous, TransitionReason::LineReacquired);
                    return;
                }
                self.lost_cycles += 1;
                if self.lost_cycles >= self.grace_cycles {
                    let cycles = self.lost_cycles;
                    self.transition(FlightMode::Manual, TransitionReason::GraceExpired { cycles });
                }
            }
            _ => {}
        }
    }

    /// Handles one manual input event.
    pub fn handle_event(
        &mut self,
        event: PilotEvent,
        safety: &SafetyStatus,
        config: &PilotConfig,
    ) -> Result<(), Rejection> {
        match event {
            PilotEvent::Takeoff => {
                if self.mode != FlightMode::Grounded {
                    return self.invalid_in_mode("takeoff");
                }
                if safety.stale {
                    return self.reject(Rejection::TelemetryUnavailable);
                }
                if safety.battery_percent <= config.critical_battery_pct {
                    return self.reject(Rejection::BatteryTooLow {
                        battery: safety.battery_percent,
                        critical: config.critical_battery_pct,
                    });
                }
                self.transition(FlightMode::Takeoff, TransitionReason::TakeoffRequested);
                self.queue(DiscreteAction::Takeoff);
            }
            PilotEvent::Land => match self.mode {
                FlightMode::Takeoff
                | FlightMode::Manual
                | FlightMode::Autonomous
                | FlightMode::LineLost => {
                    self.transition(FlightMode::Landing, TransitionReason::LandRequested);
                    self.queue(DiscreteAction::Land);
                }
                _ => return self.invalid_in_mode("land"),
            },
            PilotEvent::Emergency => self.force_emergency(EmergencyReason::ExplicitRequest),
            PilotEvent::ToggleAutonomous => match self.mode {
                FlightMode::Manual => self.engage(),
                FlightMode::Autonomous | FlightMode::LineLost => {
                    self.transition(FlightMode::Manual, TransitionReason::AutonomousDisengaged)
                }
                _ => return self.invalid_in_mode("autonomous toggle"),
            },
            PilotEvent::EngageAutonomous => match self.mode {
                FlightMode::Manual => self.engage(),
                FlightMode::Autonomous => {}
                _ => return self.invalid_in_mode("autonomous engage"),
            },
            PilotEvent::DisengageAutonomous => match self.mode {
                FlightMode::Autonomous | FlightMode::LineLost => {
                    self.transition(FlightMode::Manual, TransitionReason::AutonomousDisengaged)
                }
                FlightMode::Manual => {}
                _ => return self.invalid_in_mode("autonomous disengage"),
            },
            PilotEvent::SelectColor(name) => {
                if config.profile(&name).is_none() {
                    return self.reject(Rejection::UnknownColor(name));
                }
                log::info!("line color: {name}");
                self.color = name;
            }
            PilotEvent::CycleColor => {
                let next = config
                    .profile_index(&self.color)
                    .map_or(0, |i| (i + 1) % config.color_profiles.len());
                if let Some(profile) = config.color_profiles.get(next) {
                    log::info!("line color: {}", profile.name);
                    self.color = profile.name.clone();
                }
            }
            PilotEvent::SelectStrategy(strategy) => {
                log::info!("detection strategy: {strategy}");
                self.strategy = strategy;
            }
            PilotEvent::Move(axis, direction) => *self.sticks.slot(axis) = Some(direction),
            PilotEvent::Release(axis) => *self.sticks.slot(axis) = None,
        }
        Ok(())
    }

    fn engage(&mut self) {
        log::info!(
            "following '{}' line with {} strategy",
            self.color,
            self.strategy
        );
        self.transition(FlightMode::Autonomous, TransitionReason::AutonomousEngaged);
    }

    /// The single command for this cycle, if any. Clears the pending action.
    pub fn command(
        &mut self,
        control: Option<&ControlOutcome>,
        config: &PilotConfig,
    ) -> Option<VehicleCommand> {
        if let Some(action) = self.pending.take() {
            return Some(action.into());
        }
        match self.mode {
            FlightMode::Manual => Some(VehicleCommand::Velocity(self.sticks.command(config))),
            FlightMode::Autonomous => Some(VehicleCommand::Velocity(
                control.map_or(VelocityCommand::neutral(), |outcome| outcome.command),
            )),
            FlightMode::Takeoff | FlightMode::LineLost | FlightMode::Landing => {
                Some(VehicleCommand::Velocity(VelocityCommand::neutral()))
            }
            FlightMode::Grounded | FlightMode::Emergency => None,
        }
    }

    /// Drains the transitions and rejections recorded since the last call.
    pub fn take_cycle_log(&mut self) -> (Vec<Transition>, Vec<Rejection>) {
        (
            std::mem::take(&mut self.transitions),
            std::mem::take(&mut self.rejections),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn healthy() -> SafetyStatus {
        SafetyStatus {
            battery_percent: 80,
            ..SafetyStatus::default()
        }
    }

    fn airborne(on: bool) -> Telemetry {
        Telemetry {
            battery_percent: 80,
            flight_elapsed: Duration::from_secs(5),
            airborne: on,
        }
    }

    fn in_manual(config: &PilotConfig) -> FlightModeMachine {
        let mut machine = FlightModeMachine::new(config);
        machine
            .handle_event(PilotEvent::Takeoff, &healthy(), config)
            .expect("takeoff accepted");
        machine.observe_vehicle(Some(&airborne(true)));
        machine.command(None, config);
        machine.take_cycle_log();
        assert_eq!(machine.mode(), FlightMode::Manual);
        machine
    }

    #[test]
    fn takeoff_is_rejected_at_critical_battery() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        let low = SafetyStatus {
            battery_percent: 10,
            ..healthy()
        };
        assert_eq!(
            machine.handle_event(PilotEvent::Takeoff, &low, &config),
            Err(Rejection::BatteryTooLow { battery: 10, critical: 10 })
        );
        assert_eq!(machine.mode(), FlightMode::Grounded);
        assert_eq!(machine.command(None, &config), None);
    }

    #[test]
    fn takeoff_sends_one_command_then_hovers_until_airborne() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        machine
            .handle_event(PilotEvent::Takeoff, &healthy(), &config)
            .expect("takeoff accepted");
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::Takeoff));

        machine.observe_vehicle(Some(&airborne(false)));
        assert_eq!(machine.mode(), FlightMode::Takeoff);
        assert_eq!(
            machine.command(None, &config),
            Some(VehicleCommand::Velocity(VelocityCommand::neutral()))
        );

        machine.observe_vehicle(Some(&airborne(true)));
        assert_eq!(machine.mode(), FlightMode::Manual);
    }

    #[test]
    fn autonomous_requests_are_rejected_on_the_ground() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        let result = machine.handle_event(PilotEvent::ToggleAutonomous, &healthy(), &config);
        assert!(matches!(result, Err(Rejection::InvalidInMode { .. })));
        let (_, rejections) = machine.take_cycle_log();
        assert_eq!(rejections.len(), 1);
    }

    #[test]
    fn manual_mode_forwards_held_sticks() {
        let config = PilotConfig::default();
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::Move(Axis::Yaw, Direction::Negative), &healthy(), &config)
            .expect("stick event");
        machine
            .handle_event(PilotEvent::Move(Axis::Forward, Direction::Positive), &healthy(), &config)
            .expect("stick event");
        let expected = VelocityCommand {
            forward: config.forward_speed,
            yaw: -config.rotation_speed,
            ..VelocityCommand::neutral()
        };
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::Velocity(expected)));

        machine
            .handle_event(PilotEvent::Release(Axis::Yaw), &healthy(), &config)
            .expect("stick event");
        let expected = VelocityCommand {
            forward: config.forward_speed,
            ..VelocityCommand::neutral()
        };
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::Velocity(expected)));
    }

    #[test]
    fn autonomous_ignores_the_operator_sticks() {
        let config = PilotConfig::default();
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::Move(Axis::Lateral, Direction::Positive), &healthy(), &config)
            .expect("stick event");
        machine
            .handle_event(PilotEvent::ToggleAutonomous, &healthy(), &config)
            .expect("engage");

        let control = ControlOutcome {
            command: VelocityCommand {
                forward: 40,
                lateral: -7,
                vertical: 0,
                yaw: 3,
            },
            line_missing: false,
        };
        assert_eq!(
            machine.command(Some(&control), &config),
            Some(VehicleCommand::Velocity(control.command))
        );
    }

    #[test]
    fn line_lost_exactly_on_the_debounce_cycle() {
        let config = PilotConfig {
            line_lost_debounce_cycles: 3,
            ..PilotConfig::default()
        };
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::EngageAutonomous, &healthy(), &config)
            .expect("engage");

        machine.observe_tracking(true);
        machine.observe_tracking(true);
        assert_eq!(machine.mode(), FlightMode::Autonomous);
        machine.observe_tracking(true);
        assert_eq!(machine.mode(), FlightMode::LineLost);
    }

    #[test]
    fn a_single_good_frame_resets_the_debounce() {
        let config = PilotConfig {
            line_lost_debounce_cycles: 3,
            ..PilotConfig::default()
        };
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::EngageAutonomous, &healthy(), &config)
            .expect("engage");

        for missing in [true, true, false, true, true] {
            machine.observe_tracking(missing);
        }
        assert_eq!(machine.mode(), FlightMode::Autonomous);
    }

    #[test]
    fn grace_expiry_hands_control_back_to_the_operator() {
        let config = PilotConfig {
            line_lost_debounce_cycles: 1,
            line_lost_grace_cycles: 4,
            ..PilotConfig::default()
        };
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::EngageAutonomous, &healthy(), &config)
            .expect("engage");

        machine.observe_tracking(true);
        assert_eq!(machine.mode(), FlightMode::LineLost);
        assert_eq!(
            machine.command(None, &config),
            Some(VehicleCommand::Velocity(VelocityCommand::neutral()))
        );
        for _ in 0..3 {
            machine.observe_tracking(true);
            assert_eq!(machine.mode(), FlightMode::LineLost);
        }
        machine.observe_tracking(true);
        assert_eq!(machine.mode(), FlightMode::Manual);

        machine.observe_tracking(false);
        assert_eq!(machine.mode(), FlightMode::Manual);
    }

    #[test]
    fn recovery_within_grace_resumes_autonomous() {
        let config = PilotConfig {
            line_lost_debounce_cycles: 1,
            line_lost_grace_cycles: 4,
            ..PilotConfig::default()
        };
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::EngageAutonomous, &healthy(), &config)
            .expect("engage");
        machine.observe_tracking(true);
        machine.observe_tracking(true);
        machine.observe_tracking(false);
        assert_eq!(machine.mode(), FlightMode::Autonomous);
    }

    #[test]
    fn emergency_lands_in_the_same_cycle_and_stops_first() {
        let config = PilotConfig::default();
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::Land, &healthy(), &config)
            .expect("land");
        machine
            .handle_event(PilotEvent::Emergency, &healthy(), &config)
            .expect("emergency");

        assert_eq!(machine.mode(), FlightMode::Landing);
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::EmergencyStop));

        let (transitions, _) = machine.take_cycle_log();
        let path: Vec<_> = transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![FlightMode::Landing, FlightMode::Emergency, FlightMode::Landing]
        );
    }

    #[test]
    fn safety_fault_preempts_autonomous_control() {
        let config = PilotConfig::default();
        let mut machine = in_manual(&config);
        machine
            .handle_event(PilotEvent::EngageAutonomous, &healthy(), &config)
            .expect("engage");
        machine.take_cycle_log();

        let fault = SafetyStatus {
            time_exceeded: true,
            ..healthy()
        };
        machine.apply_safety(&fault);
        assert!(machine.emergency_pending());
        assert!(!machine.wants_control());

        let control = ControlOutcome {
            command: VelocityCommand {
                forward: 40,
                ..VelocityCommand::neutral()
            },
            line_missing: false,
        };
        assert_eq!(machine.command(Some(&control), &config), Some(VehicleCommand::Land));

        let (transitions, _) = machine.take_cycle_log();
        assert_eq!(
            transitions[0].reason,
            TransitionReason::Emergency(EmergencyReason::FlightTimeExceeded)
        );
        assert_eq!(machine.mode(), FlightMode::Landing);

        machine.observe_vehicle(Some(&airborne(false)));
        assert_eq!(machine.mode(), FlightMode::Grounded);
    }

    #[test]
    fn color_cycling_wraps_in_configured_order() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        let mut visited = vec![machine.active_color().to_string()];
        for _ in 0..config.color_profiles.len() {
            machine
                .handle_event(PilotEvent::CycleColor, &healthy(), &config)
                .expect("cycle");
            visited.push(machine.active_color().to_string());
        }
        assert_eq!(visited, ["white", "red", "green", "yellow", "blue", "white"]);
    }

    #[test]
    fn unknown_color_is_rejected_and_keeps_the_current_one() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        let result =
            machine.handle_event(PilotEvent::SelectColor("purple".into()), &healthy(), &config);
        assert_eq!(result, Err(Rejection::UnknownColor("purple".into())));
        assert_eq!(machine.active_color(), "white");
    }

    #[test]
    fn keys_map_to_events() {
        assert_eq!(PilotEvent::from_key("T"), Some(PilotEvent::Takeoff));
        assert_eq!(PilotEvent::from_key("esc"), Some(PilotEvent::Emergency));
        assert_eq!(
            PilotEvent::from_key("2"),
            Some(PilotEvent::SelectColor("red".into()))
        );
        assert_eq!(
            PilotEvent::from_key("h"),
            Some(PilotEvent::SelectStrategy(DetectionStrategy::Hough))
        );
        assert_eq!(
            PilotEvent::from_key("left"),
            Some(PilotEvent::Move(Axis::Lateral, Direction::Negative))
        );
        assert_eq!(PilotEvent::from_key_release("left"), Some(PilotEvent::Release(Axis::Lateral)));
        assert_eq!(PilotEvent::from_key("z"), None);
        assert_eq!(PilotEvent::from_key_release("t"), None);
    }

    #[test]
    fn grounded_fault_takes_the_emergency_path_once_per_crossing() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);
        let critical = SafetyStatus {
            battery_percent: 10,
            critical_battery: true,
            ..healthy()
        };

        machine.apply_safety(&critical);
        assert_eq!(machine.mode(), FlightMode::Landing);
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::Land));
        let (transitions, _) = machine.take_cycle_log();
        assert_eq!(
            transitions[0].reason,
            TransitionReason::Emergency(EmergencyReason::CriticalBattery)
        );

        // Still down and still critical: settle on the ground, no repeat.
        machine.observe_vehicle(Some(&airborne(false)));
        machine.apply_safety(&critical);
        assert_eq!(machine.mode(), FlightMode::Grounded);
        assert_eq!(machine.command(None, &config), None);
        let (transitions, _) = machine.take_cycle_log();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].reason, TransitionReason::LandingComplete);

        // Clearing and raising it again is a new crossing.
        machine.apply_safety(&healthy());
        machine.apply_safety(&critical);
        assert_eq!(machine.mode(), FlightMode::Landing);
    }

    #[test]
    fn grounded_frame_loss_forces_once_until_frames_return() {
        let config = PilotConfig::default();
        let mut machine = FlightModeMachine::new(&config);

        machine.frame_source_lost();
        assert_eq!(machine.mode(), FlightMode::Landing);
        machine.command(None, &config);
        machine.observe_vehicle(Some(&airborne(false)));

        machine.frame_source_lost();
        assert_eq!(machine.mode(), FlightMode::Grounded);

        machine.frame_source_restored();
        machine.frame_source_lost();
        assert_eq!(machine.mode(), FlightMode::Landing);
    }

    #[test]
    fn persisting_fault_keeps_forcing_while_airborne() {
        let config = PilotConfig::default();
        let mut machine = in_manual(&config);
        let fault = SafetyStatus {
            time_exceeded: true,
            ..healthy()
        };
        machine.apply_safety(&fault);
        machine.command(None, &config);
        machine.take_cycle_log();

        // A fresh takeoff under the same fault is brought straight back down.
        machine.observe_vehicle(Some(&airborne(false)));
        machine
            .handle_event(PilotEvent::Takeoff, &healthy(), &config)
            .expect("takeoff accepted");
        machine.apply_safety(&fault);
        assert_eq!(machine.mode(), FlightMode::Landing);
        assert_eq!(machine.command(None, &config), Some(VehicleCommand::Land));
    }
}
