//! # flight-substrate
//!
//! Real-time flight-control substrate: calibrated/filtered/gravity-aligned IMU
//! acquisition, a deadline-driven 500 Hz control scheduler and the radio link
//! dispatch between syslink transport frames and CRTP packets.
//!
//! The library is `no_std`; host test builds pull in `std` for the embassy
//! time driver. Board bring-up and hardware adapters build only with the
//! `firmware` feature.

#![cfg_attr(not(test), no_std)]

pub mod logging;

pub mod config;
pub mod drivers;
pub mod error;
pub mod link;
pub mod queue;
pub mod scheduler;
pub mod sensors;
pub mod state;

#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod tasks;

pub use drivers::alignment::{AlignedVector, MIN_MAGNITUDE};
pub use error::{CodecError, ConfigError, QueueError, SchedulerError, SensorError};
pub use link::{DispatchOutcome, FrameSink, LinkHandle, RadioLink};
pub use scheduler::{ControlLaw, ControlScheduler, Deadline, Subsystem, SubsystemKind};
pub use sensors::SensorAcquisition;
pub use state::{AccelSample, GyroSample, Lifecycle, MagSample, SensorData6, SensorData9};
