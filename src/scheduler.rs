//! Control scheduler.
//!
//! Brings subsystems up in a fixed order, then runs the control loop at a
//! fixed period against absolute deadlines. Each iteration reads the
//! sensors and drives the control law; the altitude layer runs on a divider
//! of the tick.
//!
//! Deadlines are re-armed from the previous deadline, not from wake-up time,
//! so an overrunning iteration doesn't shift the phase of later ones. If the
//! loop falls too far behind (a debugger halt, a stuck bus) the schedule is
//! re-anchored instead of bursting through the backlog.

use core::convert::Infallible;

use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;

use crate::config::SchedulerConfig;
use crate::drivers::device::ImuDevice;
use crate::error::SchedulerError;
use crate::sensors::SensorAcquisition;
use crate::state::{Lifecycle, SensorData9};

/// Most subsystems that can be registered with one scheduler.
pub const MAX_SUBSYSTEMS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubsystemKind {
    Indicators,
    Actuators,
    Communication,
    Commander,
}

impl SubsystemKind {
    /// Indicators first so faults during bring-up are visible.
    pub const BRING_UP_ORDER: [Self; 4] =
        [Self::Indicators, Self::Actuators, Self::Communication, Self::Commander];
}

pub trait Subsystem {
    fn name(&self) -> &'static str;
    fn kind(&self) -> SubsystemKind;
    fn init(&mut self);
    fn self_test(&mut self) -> bool;
}

/// Consumer of each control tick.
pub trait ControlLaw {
    /// Every `attitude_divider` ticks.
    fn update_attitude(&mut self, sensors: &SensorData9, calibrated: bool, dt: f32);
    /// Every `altitude_divider` ticks.
    fn update_altitude(&mut self, sensors: &SensorData9, dt: f32);
}

// ── Deadline ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rearm {
    pub next: Instant,
    /// The completed iteration ran past the deadline just armed
    pub overran: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    next: Instant,
    period: Duration,
}

impl Deadline {
    pub fn start(now: Instant, period: Duration) -> Self {
        Self { next: now + period, period }
    }

    pub fn current(&self) -> Instant {
        self.next
    }

    /// Advance by exactly one period from the previous deadline.
    pub fn rearm(&mut self, completed_at: Instant) -> Rearm {
        self.next += self.period;
        Rearm { next: self.next, overran: completed_at > self.next }
    }

    pub fn lag(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.next)
    }

    pub fn resync(&mut self, now: Instant) {
        self.next = now + self.period;
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopStats {
    pub ticks: u32,
    pub overruns: u32,
    pub resyncs: u32,
    pub sensor_errors: u32,
}

pub struct ControlScheduler<'a, D: ImuDevice, L: ControlLaw> {
    sensors: SensorAcquisition<D>,
    law: L,
    config: SchedulerConfig,
    subsystems: Vec<&'a mut dyn Subsystem, MAX_SUBSYSTEMS>,
    subsystems_up: bool,
    lifecycle: Lifecycle,
    attitude_count: u32,
    altitude_count: u32,
    stats: LoopStats,
}

impl<'a, D: ImuDevice, L: ControlLaw> ControlScheduler<'a, D, L> {
    pub fn new(sensors: SensorAcquisition<D>, law: L, config: SchedulerConfig) -> Self {
        Self {
            sensors,
            law,
            config,
            subsystems: Vec::new(),
            subsystems_up: false,
            lifecycle: Lifecycle::Uninitialized,
            attitude_count: 0,
            altitude_count: 0,
            stats: LoopStats::default(),
        }
    }

    pub fn register(&mut self, subsystem: &'a mut dyn Subsystem) -> Result<(), SchedulerError> {
        self.subsystems.push(subsystem).map_err(|_| SchedulerError::TooManySubsystems)
    }

    /// Subsystems in bring-up order, then sensors. Each subsystem is
    /// initialized once even if sensor bring-up fails and is retried.
    pub async fn init(&mut self) -> Result<(), SchedulerError> {
        if self.lifecycle.is_initialized() {
            crate::log_debug!("scheduler already initialized");
            return Ok(());
        }

        if !self.subsystems_up {
            for kind in SubsystemKind::BRING_UP_ORDER {
                for subsystem in self.subsystems.iter_mut().filter(|s| s.kind() == kind) {
                    crate::log_info!("init {}", subsystem.name());
                    subsystem.init();
                }
            }
            self.subsystems_up = true;
        }

        self.sensors.init().await?;
        self.lifecycle = Lifecycle::Initialized;
        Ok(())
    }

    /// Every subsystem and the sensors are tested, even after a failure.
    pub async fn self_test(&mut self) -> bool {
        let mut pass = true;
        for kind in SubsystemKind::BRING_UP_ORDER {
            for subsystem in self.subsystems.iter_mut().filter(|s| s.kind() == kind) {
                if !subsystem.self_test() {
                    crate::log_error!("self-test failed: {}", subsystem.name());
                    pass = false;
                }
            }
        }
        if !self.sensors.self_test().await {
            crate::log_error!("self-test failed: sensors");
            pass = false;
        }
        pass
    }

    /// Run the control loop forever. Only returns if `init` hasn't succeeded.
    pub async fn run_loop(&mut self) -> Result<Infallible, SchedulerError> {
        if self.lifecycle != Lifecycle::Initialized {
            crate::log_error!("control loop started before init");
            return Err(SchedulerError::NotInitialized);
        }
        self.lifecycle = Lifecycle::Running;
        crate::log_info!("control loop running, period {} us", self.config.period.as_micros());

        let mut deadline = Deadline::start(Instant::now(), self.config.period);
        loop {
            Timer::at(deadline.current()).await;
            self.step().await;
            self.rearm(&mut deadline, Instant::now());
        }
    }

    /// One loop body: sample, then run whichever layers are due.
    pub async fn step(&mut self) {
        self.stats.ticks = self.stats.ticks.wrapping_add(1);

        let sensors = match self.sensors.read_9().await {
            Ok(data) => data,
            Err(_) => {
                self.stats.sensor_errors = self.stats.sensor_errors.wrapping_add(1);
                return;
            }
        };
        let calibrated = self.sensors.is_calibrated();
        let tick_s = self.config.period.as_micros() as f32 / 1_000_000.0;

        let attitude_divider = self.config.attitude_divider.max(1);
        self.attitude_count += 1;
        if self.attitude_count >= attitude_divider {
            self.attitude_count = 0;
            self.law.update_attitude(&sensors, calibrated, tick_s * attitude_divider as f32);
        }

        let altitude_divider = self.config.altitude_divider.max(1);
        self.altitude_count += 1;
        if self.altitude_count >= altitude_divider {
            self.altitude_count = 0;
            self.law.update_altitude(&sensors, tick_s * altitude_divider as f32);
        }
    }

    fn rearm(&mut self, deadline: &mut Deadline, completed_at: Instant) {
        if !deadline.rearm(completed_at).overran {
            return;
        }
        self.stats.overruns = self.stats.overruns.wrapping_add(1);

        let max_lag = self.config.period * self.config.max_catch_up_periods;
        let lag = deadline.lag(completed_at);
        if lag > max_lag {
            crate::log_warn!("control loop {} us behind, re-anchoring", lag.as_micros());
            deadline.resync(completed_at);
            self.stats.resyncs = self.stats.resyncs.wrapping_add(1);
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn sensors(&self) -> &SensorAcquisition<D> {
        &self.sensors
    }

    pub fn law(&self) -> &L {
        &self.law
    }
}
