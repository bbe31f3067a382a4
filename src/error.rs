//! Error types
//!
//! Every fallible operation in the substrate returns one of these. None of
//! them is fatal at runtime except `ConfigError`, which is raised during
//! `init` and keeps the scheduler out of the running state.

use core::fmt;

/// Build-time tuning that cannot be realised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Derived IIR attenuation factor outside [1, 256]. Carries the
    /// rounded factor that was computed.
    FilterAttenuation(i32),
    /// Sample rate or cutoff frequency not a positive finite number.
    NonPositiveFrequency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilterAttenuation(factor) => {
                write!(f, "IIR attenuation factor {} outside [1, 256]", factor)
            }
            Self::NonPositiveFrequency => write!(f, "filter frequencies must be positive"),
        }
    }
}

/// Sensor acquisition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    Config(ConfigError),
    /// `read_*` or `self_test` before a successful `init`.
    NotInitialized,
    /// The underlying device driver reported a bus error.
    Device,
}

impl From<ConfigError> for SensorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "sensor configuration: {}", err),
            Self::NotInitialized => write!(f, "sensors not initialized"),
            Self::Device => write!(f, "sensor device error"),
        }
    }
}

/// Outcome of a bounded queue operation that did not produce a value.
///
/// `Full`/`Empty` come from zero-wait calls; `TimedOut` from calls that
/// waited for their whole budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    TimedOut,
    Full,
    Empty,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "queue operation timed out"),
            Self::Full => write!(f, "queue full"),
            Self::Empty => write!(f, "queue empty"),
        }
    }
}

/// Packet encode/decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Payload longer than the frame can carry.
    Oversize(usize),
    /// Raw-carrier frame without the CRTP header byte.
    MissingHeader,
    /// Buffer ends before the declared payload length.
    Truncated { declared: usize, available: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversize(len) => write!(f, "payload of {} bytes exceeds frame capacity", len),
            Self::MissingHeader => write!(f, "frame carries no packet header"),
            Self::Truncated { declared, available } => {
                write!(f, "frame declares {} payload bytes, {} present", declared, available)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// `run_loop` called without a successful `init`.
    NotInitialized,
    /// More subsystems registered than the scheduler has slots for.
    TooManySubsystems,
    Sensor(SensorError),
}

impl From<SensorError> for SchedulerError {
    fn from(err: SensorError) -> Self {
        Self::Sensor(err)
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "scheduler not initialized"),
            Self::TooManySubsystems => write!(f, "subsystem registry full"),
            Self::Sensor(err) => write!(f, "{}", err),
        }
    }
}
