// THEORY:
// The `SafetyMonitor` is the first thing every cycle runs and the only thing
// that can overrule the operator. It never sends a command itself; it reports,
// and the flight mode state machine acts on the report in the same cycle,
// before anything is dispatched.
//
// Key architectural principles:
// 1.  **Two battery stages**: Below the warning threshold the status is
//     flagged `low_battery` and a warning is logged once per crossing. At or
//     below the critical threshold `critical_battery` is set, which forces the
//     emergency landing path.
// 2.  **Time ceiling**: A flight longer than `max_flight_seconds` sets
//     `time_exceeded`, which also forces the emergency landing path.
// 3.  **Stale is not safe, but not fatal either**: A missing telemetry reading
//     reuses the previous status, marked `stale`. Only a run of misses longer
//     than `max_telemetry_misses` declares the link lost.

use crate::config::PilotConfig;
use crate::core_modules::flight_mode::EmergencyReason;
use crate::interfaces::Telemetry;

/// The safety verdict for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SafetyStatus {
    pub battery_percent: u8,
    pub elapsed_flight_seconds: f64,
    /// Below the warning threshold. Reported only.
    pub low_battery: bool,
    /// At or below the critical threshold. Forces EMERGENCY.
    pub critical_battery: bool,
    /// Past the flight time ceiling. Forces EMERGENCY.
    pub time_exceeded: bool,
    /// No fresh reading this cycle; the values are from the last one.
    pub stale: bool,
    /// Too many consecutive cycles without telemetry. Forces EMERGENCY.
    pub telemetry_lost: bool,
}

impl SafetyStatus {
    /// The status before the first reading has ever arrived.
    pub fn unknown() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    /// The most urgent reason this status forces an emergency, if any.
    pub fn emergency_reason(&self) -> Option<EmergencyReason> {
        if self.critical_battery {
            Some(EmergencyReason::CriticalBattery)
        } else if self.time_exceeded {
            Some(EmergencyReason::FlightTimeExceeded)
        } else if self.telemetry_lost {
            Some(EmergencyReason::TelemetryLost)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    low_battery_warning_pct: u8,
    critical_battery_pct: u8,
    max_flight_seconds: f64,
    max_telemetry_misses: u32,
    last: SafetyStatus,
    consecutive_misses: u32,
    warned_low: bool,
}

impl SafetyMonitor {
    pub fn new(config: &PilotConfig) -> Self {
        Self {
            low_battery_warning_pct: config.low_battery_warning_pct,
            critical_battery_pct: config.critical_battery_pct,
            max_flight_seconds: config.max_flight_seconds,
            max_telemetry_misses: config.max_telemetry_misses,
            last: SafetyStatus::unknown(),
            consecutive_misses: 0,
            warned_low: false,
        }
    }

    /// Picks up new thresholds without forgetting the last reading.
    pub fn reconfigure(&mut self, config: &PilotConfig) {
        self.low_battery_warning_pct = config.low_battery_warning_pct;
        self.critical_battery_pct = config.critical_battery_pct;
        self.max_flight_seconds = config.max_flight_seconds;
        self.max_telemetry_misses = config.max_telemetry_misses;
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn last_status(&self) -> SafetyStatus {
        self.last
    }

    /// Evaluates this cycle's telemetry, or the lack of it.
    pub fn check(&mut self, telemetry: Option<&Telemetry>) -> SafetyStatus {
        let status = match telemetry {
            Some(reading) => {
                self.consecutive_misses = 0;
                self.evaluate(reading)
            }
            None => {
                self.consecutive_misses = self.consecutive_misses.saturating_add(1);
                if self.consecutive_misses == 1 {
                    log::debug!("safety: no telemetry this cycle, reusing last status");
                }
                SafetyStatus {
                    stale: true,
                    telemetry_lost: self.consecutive_misses > self.max_telemetry_misses,
                    ..self.last
                }
            }
        };

        if status.low_battery && !self.warned_low {
            log::warn!(
                "safety: low battery {}% (warning below {}%)",
                status.battery_percent,
                self.low_battery_warning_pct
            );
        }
        self.warned_low = status.low_battery;

        self.last = status;
        status
    }

    fn evaluate(&self, reading: &Telemetry) -> SafetyStatus {
        let battery = reading.battery_percent;
        let elapsed = reading.flight_elapsed.as_secs_f64();
        SafetyStatus {
            battery_percent: battery,
            elapsed_flight_seconds: elapsed,
            low_battery: battery < self.low_battery_warning_pct,
            critical_battery: battery <= self.critical_battery_pct,
            time_exceeded: elapsed > self.max_flight_seconds,
            stale: false,
            telemetry_lost: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reading(battery: u8, seconds: u64) -> Telemetry {
        Telemetry {
            battery_percent: battery,
            flight_elapsed: Duration::from_secs(seconds),
            airborne: true,
        }
    }

    #[test]
    fn healthy_reading_raises_nothing() {
        let mut monitor = SafetyMonitor::new(&PilotConfig::default());
        let status = monitor.check(Some(&reading(80, 30)));
        assert!(!status.low_battery && !status.critical_battery && !status.time_exceeded);
        assert_eq!(status.emergency_reason(), None);
    }

    #[test]
    fn warning_is_reported_but_not_fatal() {
        let mut monitor = SafetyMonitor::new(&PilotConfig::default());
        let status = monitor.check(Some(&reading(19, 30)));
        assert!(status.low_battery);
        assert!(!status.critical_battery);
        assert_eq!(status.emergency_reason(), None);
    }

    #[test]
    fn critical_threshold_is_inclusive() {
        let config = PilotConfig {
            critical_battery_pct: 15,
            ..PilotConfig::default()
        };
        let mut monitor = SafetyMonitor::new(&config);
        let status = monitor.check(Some(&reading(15, 30)));
        assert!(status.critical_battery);
        assert_eq!(status.emergency_reason(), Some(EmergencyReason::CriticalBattery));
    }

    #[test]
    fn flight_time_ceiling_is_exclusive() {
        let mut monitor = SafetyMonitor::new(&PilotConfig::default());
        assert!(!monitor.check(Some(&reading(80, 300))).time_exceeded);
        let status = monitor.check(Some(&reading(80, 301)));
        assert!(status.time_exceeded);
        assert_eq!(status.emergency_reason(), Some(EmergencyReason::FlightTimeExceeded));
    }

    #[test]
    fn missing_telemetry_goes_stale_then_lost() {
        let config = PilotConfig {
            max_telemetry_misses: 3,
            ..PilotConfig::default()
        };
        let mut monitor = SafetyMonitor::new(&config);
        monitor.check(Some(&reading(70, 10)));

        for _ in 0..3 {
            let status = monitor.check(None);
            assert!(status.stale);
            assert_eq!(status.battery_percent, 70);
            assert!(!status.telemetry_lost);
        }
        let status = monitor.check(None);
        assert!(status.telemetry_lost);
        assert_eq!(status.emergency_reason(), Some(EmergencyReason::TelemetryLost));

        let status = monitor.check(Some(&reading(69, 14)));
        assert!(!status.stale && !status.telemetry_lost);
        assert_eq!(monitor.consecutive_misses(), 0);
    }

    #[test]
    fn nothing_heard_yet_is_stale() {
        let mut monitor = SafetyMonitor::new(&PilotConfig::default());
        assert!(monitor.check(None).stale);
    }
}
