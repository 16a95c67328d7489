// THEORY:
// This file is the main entry point for the `line_pilot` library crate: the
// perception-and-control core of a line-following aerial vehicle.
//
// The crate turns one camera frame at a time into one steering decision, and
// sequences the vehicle's flight modes safely around it. The camera, the radio
// link and the operator's keyboard stay outside; the core only sees them
// through the traits in `interfaces`.
//
// Key architectural principles:
// 1.  **Leaf-first modules**: `core_modules` holds the stateless stages
//     (segmentation, line extraction, tracking, control) and the two stateful
//     arbiters (the safety monitor and the flight mode state machine).
// 2.  **One cycle, one command**: `autopilot::Autopilot` runs a single cycle
//     synchronously and dispatches at most one command. `flight_loop` adds the
//     clock, the channels and shutdown on top.
// 3.  **One immutable config**: `config::PilotConfig` is validated at startup
//     and passed by reference everywhere. Nothing reads a tunable from global
//     state.

pub mod autopilot;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod flight_loop;
pub mod interfaces;
pub mod pipeline;
pub mod sim;

pub use autopilot::{Autopilot, CycleReport, SessionStats};
pub use config::PilotConfig;
pub use core_modules::controller::VelocityCommand;
pub use core_modules::flight_mode::{FlightMode, PilotEvent};
pub use core_modules::frame::Frame;
pub use core_modules::line_candidate::{DetectionStrategy, LineCandidate};
pub use error::{ConfigError, PilotError};
pub use flight_loop::{FlightLoop, LoopConfig, LoopHandle};
pub use interfaces::{CommandSink, FrameSource, Telemetry, TelemetrySource, VehicleCommand};
pub use pipeline::{FrameAnalysis, VisionPipeline};
