//! Library-facing error types (spec.md §7).
//!
//! `handle_event` itself returns nothing and never fails: per-rule transform
//! drops are silent by design (spec.md §7), and allocation failure has no
//! analogue once Rust's global allocator aborts the process. What remains
//! is configuration and device errors, which is what this module covers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum MidiDeviceError {
    #[error("no MIDI input devices found")]
    NoInputDevices,

    #[error("no MIDI output devices found")]
    NoOutputDevices,

    #[error("MIDI device '{0}' not found")]
    NotFound(String),

    #[error("MIDI device index {index} out of range (0-{max})")]
    IndexOutOfRange { index: usize, max: usize },

    #[error(transparent)]
    Midir(#[from] MidirError),
}

/// Wraps the handful of distinct `midir` error types behind one variant so
/// callers don't need to match on which midir operation failed.
#[derive(Debug, Error)]
pub enum MidirError {
    #[error("failed to initialize MIDI input: {0}")]
    Init(String),

    #[error("failed to connect to MIDI port: {0}")]
    Connect(String),

    #[error("failed to read MIDI port name: {0}")]
    PortInfo(String),
}
