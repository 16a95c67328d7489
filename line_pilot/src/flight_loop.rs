// THEORY:
// The `FlightLoop` is the only async code in the crate. It owns the clock and
// the channels; everything it calls is synchronous and bounded.
//
// Key architectural principles:
// 1.  **Fixed rate, no backlog**: A `tokio::time::interval` ticks at the
//     target rate with `MissedTickBehavior::Skip`. A slow cycle skips ticks
//     rather than bunching them, and the frame source only ever holds the
//     newest frame, so the loop never works through stale video.
// 2.  **Asynchronous operator**: Manual events arrive on an unbounded mpsc
//     channel at any time and are drained at the top of the next cycle.
// 3.  **Deadline accounting**: Each cycle is timed against the configured
//     budget. Overruns are counted and logged, never queued.
// 4.  **Clean exit**: Shutdown is a watch flag. On shutdown an airborne vehicle
//     is told to land, and the session statistics are returned.

use crate::autopilot::{Autopilot, CycleReport, SessionStats};
use crate::config::PilotConfig;
use crate::core_modules::flight_mode::PilotEvent;
use crate::core_modules::frame::Frame;
use crate::interfaces::{CommandSink, FrameSource, TelemetrySource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Timing for one run of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    pub period: Duration,
    pub budget: Duration,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl LoopConfig {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            period: config.cycle_period(),
            budget: config.cycle_budget(),
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(self, max_cycles: u64) -> Self {
        Self {
            max_cycles: Some(max_cycles),
            ..self
        }
    }
}

/// The operator's side of a running loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    events: mpsc::UnboundedSender<PilotEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    /// Queues a manual event for the next cycle. Returns `false` once the loop
    /// has stopped.
    pub fn send(&self, event: PilotEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Asks the loop to land and stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct FlightLoop<F, S, T> {
    autopilot: Autopilot<S, T>,
    frames: F,
    events: mpsc::UnboundedReceiver<PilotEvent>,
    shutdown: watch::Receiver<bool>,
    timing: LoopConfig,
}

impl<F, S, T> FlightLoop<F, S, T>
where
    F: FrameSource,
    S: CommandSink,
    T: TelemetrySource,
{
    pub fn new(autopilot: Autopilot<S, T>, frames: F, timing: LoopConfig) -> (Self, LoopHandle) {
        let (event_sender, events) = mpsc::unbounded_channel();
        let (shutdown_sender, shutdown) = watch::channel(false);
        let flight_loop = Self {
            autopilot,
            frames,
            events,
            shutdown,
            timing,
        };
        let handle = LoopHandle {
            events: event_sender,
            shutdown: Arc::new(shutdown_sender),
        };
        (flight_loop, handle)
    }

    /// Runs until shutdown or `max_cycles`, calling `on_cycle` after every
    /// cycle with its report and the frame it processed.
    pub async fn run<C>(mut self, mut on_cycle: C) -> (SessionStats, Autopilot<S, T>)
    where
        C: FnMut(&CycleReport, Option<&Frame>),
    {
        let mut ticker = tokio::time::interval(self.timing.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut listening = true;
        let mut cycles = 0u64;

        log::info!(
            "flight loop started: period {:?}, budget {:?}",
            self.timing.period,
            self.timing.budget
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed(), if listening => {
                    match changed {
                        Ok(()) if *self.shutdown.borrow_and_update() => break,
                        Ok(()) => {}
                        // Every handle dropped: nobody can ask for shutdown any more.
                        Err(_) => listening = false,
                    }
                    continue;
                }
            }
            if *self.shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            let frame = self.frames.next_frame();
            let report = self.autopilot.run_cycle(frame.as_deref(), events);
            on_cycle(&report, frame.as_deref());

            let elapsed = started.elapsed();
            if elapsed > self.timing.budget {
                self.autopilot.record_overrun(elapsed);
            }

            cycles += 1;
            if self.timing.max_cycles.is_some_and(|max| cycles >= max) {
                log::info!("flight loop reached {cycles} cycles");
                break;
            }
        }

        let stats = self.autopilot.shutdown();
        (stats, self.autopilot)
    }
}
