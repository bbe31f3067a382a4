use embassy_executor::task;
use embassy_stm32::peripherals::SPI1;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;

use crate::drivers::icm42688::Icm42688;
use crate::scheduler::{ControlLaw, ControlScheduler};
use crate::state::SensorData9;

pub type FlightImu = Icm42688<'static, SPI1>;
pub type FlightScheduler = ControlScheduler<'static, FlightImu, SampleForwarder>;

/// Stand-in control law: publishes each attitude-rate sample for the
/// command/telemetry side. Cap=1, a slow consumer only sees the latest.
pub struct SampleForwarder {
    tx: Sender<'static, CriticalSectionRawMutex, (SensorData9, bool), 1>,
}

impl SampleForwarder {
    pub fn new(tx: Sender<'static, CriticalSectionRawMutex, (SensorData9, bool), 1>) -> Self {
        Self { tx }
    }
}

impl ControlLaw for SampleForwarder {
    fn update_attitude(&mut self, sensors: &SensorData9, calibrated: bool, _dt: f32) {
        let _ = self.tx.try_send((*sensors, calibrated));
    }

    fn update_altitude(&mut self, _sensors: &SensorData9, _dt: f32) {}
}

/// Control task: bring-up, self-test, then the 500 Hz loop.
#[task]
pub async fn control_task(mut scheduler: FlightScheduler) {
    if let Err(e) = scheduler.init().await {
        crate::log_error!("bring-up failed: {}", e);
        return;
    }

    if !scheduler.self_test().await {
        crate::log_warn!("self-test failed, control loop starts regardless");
    }

    match scheduler.run_loop().await {
        Err(e) => crate::log_error!("control loop refused to start: {}", e),
        Ok(never) => match never {},
    }
}
