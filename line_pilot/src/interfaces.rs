// THEORY:
// The autopilot core never touches a camera, a radio or a keyboard. It talks
// to the outside world through three narrow traits, one per collaborator, plus
// the typed `PilotEvent` stream for manual input.
//
// Key architectural principles:
// 1.  **Pull, don't wait**: Every call returns immediately. A frame source with
//     nothing new returns `None`; a telemetry source that has not heard from the
//     vehicle returns `None`. Absence is data, not an error.
// 2.  **Fire and forget**: `CommandSink::dispatch` returns nothing. The core
//     never blocks on an acknowledgement and never assumes delivery.
// 3.  **Latest frame wins**: `WatchFrameSource` sits on a `tokio::sync::watch`
//     channel, which keeps exactly one value. A producer that outruns the loop
//     overwrites stale frames instead of queueing them.

use crate::core_modules::controller::VelocityCommand;
use crate::core_modules::frame::Frame;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One reading from the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub battery_percent: u8,
    /// Time since the vehicle left the ground, as reported by the vehicle.
    pub flight_elapsed: Duration,
    /// Whether the vehicle reports itself off the ground.
    pub airborne: bool,
}

/// Everything the core can ask the vehicle to do. At most one per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    Velocity(VelocityCommand),
    Takeoff,
    Land,
    /// Immediate motor stop.
    EmergencyStop,
}

impl fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleCommand::Velocity(command) => write!(f, "velocity({command})"),
            VehicleCommand::Takeoff => write!(f, "takeoff"),
            VehicleCommand::Land => write!(f, "land"),
            VehicleCommand::EmergencyStop => write!(f, "emergency-stop"),
        }
    }
}

pub trait FrameSource {
    /// The newest frame not yet handed out, or `None` if nothing new arrived.
    fn next_frame(&mut self) -> Option<Arc<Frame>>;
}

pub trait CommandSink {
    fn dispatch(&mut self, command: VehicleCommand);
}

pub trait TelemetrySource {
    fn read(&mut self) -> Option<Telemetry>;
}

pub type FrameSender = watch::Sender<Option<Arc<Frame>>>;

/// Frame source backed by a watch channel.
#[derive(Debug, Clone)]
pub struct WatchFrameSource {
    receiver: watch::Receiver<Option<Arc<Frame>>>,
}

impl WatchFrameSource {
    pub fn new(receiver: watch::Receiver<Option<Arc<Frame>>>) -> Self {
        Self { receiver }
    }
}

impl FrameSource for WatchFrameSource {
    fn next_frame(&mut self) -> Option<Arc<Frame>> {
        // A closed channel reads as "no new frame", same as a slow producer.
        match self.receiver.has_changed() {
            Ok(true) => self.receiver.borrow_and_update().clone(),
            _ => None,
        }
    }
}

/// Creates a latest-frame-wins channel.
pub fn frame_channel() -> (FrameSender, WatchFrameSource) {
    let (sender, receiver) = watch::channel(None);
    (sender, WatchFrameSource::new(receiver))
}
