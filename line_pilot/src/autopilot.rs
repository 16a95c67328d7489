// THEORY:
// The `Autopilot` is one control cycle, start to finish, with no clock and no
// threads. The flight loop decides *when* a cycle runs; this decides *what*
// happens in it, always in the same order:
//
// 1.  **Telemetry & Safety**: Read the vehicle, run the safety monitor, and let
//     the vehicle's own reports finish a takeoff or a landing.
// 2.  **Manual Events**: Apply every operator event that arrived since the
//     last cycle, judged against this cycle's safety status.
// 3.  **Preemption**: Apply the safety verdict and the frame-loss ceiling. An
//     emergency decided here cancels everything autonomous in this cycle.
// 4.  **Perception**: Segment, extract and normalize the newest frame with the
//     operator's current color and strategy.
// 5.  **Control**: In AUTONOMOUS or LINE_LOST, run the controller and feed the
//     result through the debounce and grace counters.
// 6.  **Dispatch**: Ask the state machine for the single command of this
//     cycle and hand it to the sink. Fire and forget.

use crate::config::PilotConfig;
use crate::core_modules::controller::{self, ControlOutcome};
use crate::core_modules::flight_mode::{
    FlightMode, FlightModeMachine, PilotEvent, Rejection, Transition,
};
use crate::core_modules::frame::Frame;
use crate::core_modules::line_candidate::DetectionStrategy;
use crate::core_modules::safety_monitor::{SafetyMonitor, SafetyStatus};
use crate::core_modules::tracking::TrackingError;
use crate::error::ConfigError;
use crate::interfaces::{CommandSink, TelemetrySource, VehicleCommand};
use crate::pipeline::{FrameAnalysis, VisionPipeline};
use std::sync::Arc;
use std::time::Duration;

/// Everything that happened in one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    /// Mode after the cycle.
    pub mode: FlightMode,
    pub safety: SafetyStatus,
    /// `None` when no frame arrived or the cycle was cut short by an emergency.
    pub analysis: Option<FrameAnalysis>,
    pub control: Option<ControlOutcome>,
    pub command: Option<VehicleCommand>,
    pub transitions: Vec<Transition>,
    pub rejections: Vec<Rejection>,
    pub frame_missed: bool,
}

/// Running totals for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub cycles: u64,
    pub frames_processed: u64,
    pub frames_missed: u64,
    pub lines_detected: u64,
    pub commands_sent: u64,
    pub emergencies: u64,
    pub overruns: u64,
}

pub struct Autopilot<S, T> {
    config: Arc<PilotConfig>,
    pipeline: VisionPipeline,
    machine: FlightModeMachine,
    safety: SafetyMonitor,
    sink: S,
    telemetry: T,
    missed_frames: u32,
    stats: SessionStats,
}

impl<S: CommandSink, T: TelemetrySource> Autopilot<S, T> {
    /// Validates `config` and builds an autopilot on the ground.
    pub fn new(config: Arc<PilotConfig>, sink: S, telemetry: T) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "autopilot ready: color '{}', {} strategy, {} Hz",
            config.default_color,
            config.default_strategy,
            config.target_rate_hz
        );
        Ok(Self {
            pipeline: VisionPipeline::new(&config),
            machine: FlightModeMachine::new(&config),
            safety: SafetyMonitor::new(&config),
            config,
            sink,
            telemetry,
            missed_frames: 0,
            stats: SessionStats::default(),
        })
    }

    pub fn mode(&self) -> FlightMode {
        self.machine.mode()
    }

    pub fn active_color(&self) -> &str {
        self.machine.active_color()
    }

    pub fn active_strategy(&self) -> DetectionStrategy {
        self.machine.active_strategy()
    }

    pub fn config(&self) -> &Arc<PilotConfig> {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn telemetry_source(&self) -> &T {
        &self.telemetry
    }

    /// Swaps in a new configuration between cycles. The old one stays in
    /// force if the new one does not validate.
    pub fn reload_config(&mut self, config: PilotConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.pipeline = VisionPipeline::new(&config);
        self.machine.reconfigure(&config);
        self.safety.reconfigure(&config);
        self.config = Arc::new(config);
        log::info!("configuration reloaded");
        Ok(())
    }

    pub(crate) fn record_overrun(&mut self, elapsed: Duration) {
        self.stats.overruns += 1;
        log::warn!(
            "cycle {} overran its budget: {:?} > {:?}",
            self.stats.cycles,
            elapsed,
            self.config.cycle_budget()
        );
    }

    /// Runs one control cycle.
    pub fn run_cycle<I>(&mut self, frame: Option<&Frame>, events: I) -> CycleReport
    where
        I: IntoIterator<Item = PilotEvent>,
    {
        self.stats.cycles += 1;
        let config = Arc::clone(&self.config);

        // --- 1. Telemetry & Safety ---
        let reading = self.telemetry.read();
        let safety = self.safety.check(reading.as_ref());
        self.machine.observe_vehicle(reading.as_ref());

        // --- 2. Manual Events ---
        for event in events {
            // Rejections are logged and collected by the machine.
            let _ = self.machine.handle_event(event, &safety, &config);
        }

        // --- 3. Preemption ---
        self.machine.apply_safety(&safety);
        let frame_missed = frame.is_none();
        if frame_missed {
            self.missed_frames = self.missed_frames.saturating_add(1);
            self.stats.frames_missed += 1;
            if self.missed_frames > config.max_missed_frames {
                self.machine.frame_source_lost();
            }
        } else {
            self.missed_frames = 0;
            self.machine.frame_source_restored();
        }
        let emergency = self.machine.emergency_pending();

        // --- 4. Perception ---
        let analysis = match (frame, emergency) {
            (Some(frame), false) => self.analyze(frame, &config),
            _ => None,
        };

        // --- 5. Control ---
        let control = if self.machine.wants_control() {
            let error = analysis
                .as_ref()
                .map_or(TrackingError::invalid(), |a| a.tracking);
            let outcome = controller::compute_command(&error, &config);
            self.machine.observe_tracking(outcome.line_missing);
            Some(outcome)
        } else {
            None
        };

        // --- 6. Dispatch ---
        let command = self.machine.command(control.as_ref(), &config);
        if let Some(command) = command {
            match command {
                VehicleCommand::Velocity(velocity) => log::trace!("dispatch {velocity}"),
                other => log::info!("dispatch {other}"),
            }
            self.sink.dispatch(command);
            self.stats.commands_sent += 1;
        }

        let (transitions, rejections) = self.machine.take_cycle_log();
        if transitions.iter().any(|t| t.to == FlightMode::Emergency) {
            self.stats.emergencies += 1;
        }

        CycleReport {
            cycle: self.stats.cycles,
            mode: self.machine.mode(),
            safety,
            analysis,
            control,
            command,
            transitions,
            rejections,
            frame_missed,
        }
    }

    fn analyze(&mut self, frame: &Frame, config: &PilotConfig) -> Option<FrameAnalysis> {
        let profile = config.profile(self.machine.active_color())?;
        let analysis = self
            .pipeline
            .analyze(frame, profile, self.machine.active_strategy());
        self.stats.frames_processed += 1;
        if analysis.line_detected() {
            self.stats.lines_detected += 1;
        }
        log::debug!(
            "cycle {}: line={} lateral={:.3} angle={:?}",
            self.stats.cycles,
            analysis.line_detected(),
            analysis.tracking.lateral_offset,
            analysis.tracking.angular_offset
        );
        Some(analysis)
    }

    /// Brings the vehicle down at the end of a session and returns the totals.
    pub fn shutdown(&mut self) -> SessionStats {
        let mode = self.machine.mode();
        if matches!(
            mode,
            FlightMode::Takeoff | FlightMode::Manual | FlightMode::Autonomous | FlightMode::LineLost
        ) {
            log::info!("shutdown while {mode}: landing");
            let safety = self.safety.last_status();
            let config = Arc::clone(&self.config);
            if self.machine.handle_event(PilotEvent::Land, &safety, &config).is_ok() {
                if let Some(command) = self.machine.command(None, &config) {
                    self.sink.dispatch(command);
                    self.stats.commands_sent += 1;
                }
            }
            self.machine.take_cycle_log();
        }
        log::info!(
            "session: {} cycles, {} frames processed, {} lines detected, {} missed, {} overruns",
            self.stats.cycles,
            self.stats.frames_processed,
            self.stats.lines_detected,
            self.stats.frames_missed,
            self.stats.overruns
        );
        self.stats
    }
}
