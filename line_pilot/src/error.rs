// THEORY:
// Errors in this crate are reserved for things that stop a flight from
// starting: a configuration that cannot be trusted, or a file that cannot be
// read. Everything that happens *during* flight (a missed detection, a low
// battery, a dropped frame) is a value that flows through the state machine,
// never an `Err`.

use thiserror::Error;

/// A configuration value that failed validation at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within 0..={max}, got {value}")]
    SpeedOutOfRange { name: &'static str, value: i32, max: i32 },

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidGain { name: &'static str, value: f64 },

    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },

    #[error("center_tolerance must be within [0, 1), got {0}")]
    InvalidCenterTolerance(f64),

    #[error("{name} must be a percentage within 0..=100, got {value}")]
    PercentOutOfRange { name: &'static str, value: u8 },

    #[error("critical battery threshold ({critical}%) must be below the warning threshold ({warning}%)")]
    BatteryThresholdOrder { critical: u8, warning: u8 },

    #[error("max_flight_seconds must be positive and finite, got {0}")]
    InvalidFlightCeiling(f64),

    #[error("at least one color profile is required")]
    NoColorProfiles,

    #[error("color profile '{0}' has no ranges")]
    EmptyColorRange(String),

    #[error("color profile '{profile}' range {index}: lower bound exceeds upper bound on channel {channel}")]
    InvertedColorRange { profile: String, index: usize, channel: usize },

    #[error("color profile '{profile}' range {index}: hue {hue} exceeds 180")]
    HueOutOfRange { profile: String, index: usize, hue: u8 },

    #[error("color profile '{0}' is defined more than once")]
    DuplicateColorProfile(String),

    #[error("default color '{0}' does not name a configured profile")]
    UnknownDefaultColor(String),
}

/// Top-level error for loading and bringing up the autopilot.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame buffer of {actual} bytes does not match {width}x{height} RGBA ({expected} bytes)")]
    FrameSize { width: u32, height: u32, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, PilotError>;
