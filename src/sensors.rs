//! Sensor acquisition facade.
//!
//! Chains device reads through gyro bias calibration, the accelerometer IIR
//! low-pass and gravity alignment. The control loop calls `read_6`/`read_9`
//! once per tick; a read is one device transfer plus a few dozen float ops.

use embassy_time::{with_timeout, Instant, Timer};

use crate::config::{
    SensorConfig, ACCEL_SELF_TEST_ENVELOPE, GYRO_SELF_TEST_ENVELOPE, SELF_TEST_SAMPLES,
    SELF_TEST_SETTLE, SELF_TEST_TIMEOUT,
};
use crate::drivers::alignment::GravityAlignment;
use crate::drivers::calibrator::{
    AccelScaleEstimator, BiasCalibrator, CalibrationStatus, CalibrationWindow,
};
use crate::drivers::device::ImuDevice;
use crate::drivers::filter::{Attenuation, IirLpf};
use crate::error::SensorError;
use crate::state::{AccelSample, GyroSample, Lifecycle, MagSample, SensorData6, SensorData9};

#[allow(unused_imports)]
use micromath::F32Ext;

pub struct SensorAcquisition<D: ImuDevice> {
    device: D,
    config: SensorConfig,
    lifecycle: Lifecycle,
    gyro_bias: BiasCalibrator,
    calibration: CalibrationWindow,
    accel_scale: AccelScaleEstimator,
    /// Created by `init` from the configured cutoff
    accel_lpf: Option<IirLpf>,
    alignment: GravityAlignment,
}

impl<D: ImuDevice> SensorAcquisition<D> {
    pub fn new(device: D, config: SensorConfig) -> Self {
        Self {
            device,
            config,
            lifecycle: Lifecycle::Uninitialized,
            gyro_bias: BiasCalibrator::new(config.gyro_variance_threshold),
            calibration: CalibrationWindow::new(config.calibration_timeout),
            accel_scale: AccelScaleEstimator::new(),
            accel_lpf: None,
            alignment: GravityAlignment::new(config.trim_roll_deg, config.trim_pitch_deg),
        }
    }

    /// Derive the filter, bring up the device. A no-op once it has succeeded.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        if self.lifecycle.is_initialized() {
            crate::log_debug!("sensors already initialized");
            return Ok(());
        }

        let attenuation =
            Attenuation::from_cutoff(self.config.sample_rate_hz, self.config.accel_cutoff_hz)
                .map_err(|err| {
                    crate::log_error!(
                        "accel LPF misconfigured (cutoff {} Hz)",
                        self.config.accel_cutoff_hz
                    );
                    SensorError::Config(err)
                })?;

        self.device.init().await.map_err(|_| {
            crate::log_error!("IMU init failed");
            SensorError::Device
        })?;

        self.accel_lpf = Some(IirLpf::new(attenuation));
        self.lifecycle = Lifecycle::Initialized;
        crate::log_info!("sensors up, accel LPF factor {}", attenuation.factor());
        Ok(())
    }

    /// Presence probe plus excitation check, bounded by `SELF_TEST_TIMEOUT`.
    pub async fn self_test(&mut self) -> bool {
        if !self.lifecycle.is_initialized() {
            crate::log_warn!("IMU self-test before init");
            return false;
        }

        match with_timeout(SELF_TEST_TIMEOUT, self.excitation_check()).await {
            Ok(Ok(pass)) => pass,
            Ok(Err(_)) => {
                crate::log_error!("IMU self-test: device error");
                self.release_excitation().await;
                false
            }
            Err(_) => {
                crate::log_error!("IMU self-test timed out");
                self.release_excitation().await;
                false
            }
        }
    }

    /// Best effort after an aborted self-test; a failed disable is only logged.
    async fn release_excitation(&mut self) {
        match with_timeout(SELF_TEST_SETTLE, self.device.set_self_test(false)).await {
            Ok(Ok(())) => {}
            _ => crate::log_error!("IMU self-test excitation may still be enabled"),
        }
    }

    async fn excitation_check(&mut self) -> Result<bool, D::Error> {
        if !self.device.probe().await? {
            crate::log_error!("IMU not present");
            return Ok(false);
        }

        let (gyro_off, accel_off) = self.average_raw().await?;
        self.device.set_self_test(true).await?;
        Timer::after(SELF_TEST_SETTLE).await;
        let excited = self.average_raw().await;
        // excitation must come off even if the excited read failed
        let disabled = self.device.set_self_test(false).await;
        let (gyro_on, accel_on) = excited?;
        disabled?;
        Timer::after(SELF_TEST_SETTLE).await;

        let scale = self.device.scale();
        let within = |v: f32, (lo, hi): (f32, f32)| (lo..=hi).contains(&v.abs());

        let mut pass = true;
        for axis in 0..3 {
            let gyro = (gyro_on[axis] - gyro_off[axis]) / scale.gyro_lsb_per_dps;
            let accel = (accel_on[axis] - accel_off[axis]) / scale.accel_lsb_per_g;
            if !within(gyro, GYRO_SELF_TEST_ENVELOPE) {
                crate::log_error!("gyro axis {} self-test response {} dps", axis, gyro);
                pass = false;
            }
            if !within(accel, ACCEL_SELF_TEST_ENVELOPE) {
                crate::log_error!("accel axis {} self-test response {} g", axis, accel);
                pass = false;
            }
        }
        Ok(pass)
    }

    async fn average_raw(&mut self) -> Result<([f32; 3], [f32; 3]), D::Error> {
        let mut gyro = [0i32; 3];
        let mut accel = [0i32; 3];
        for _ in 0..SELF_TEST_SAMPLES {
            let raw = self.device.read_raw().await?;
            for axis in 0..3 {
                gyro[axis] += raw.gyro[axis] as i32;
                accel[axis] += raw.accel[axis] as i32;
            }
        }
        let n = SELF_TEST_SAMPLES as f32;
        Ok((gyro.map(|s| s as f32 / n), accel.map(|s| s as f32 / n)))
    }

    pub async fn read_6(&mut self) -> Result<SensorData6, SensorError> {
        self.read_9().await.map(SensorData6::from)
    }

    pub async fn read_9(&mut self) -> Result<SensorData9, SensorError> {
        if self.accel_lpf.is_none() {
            return Err(SensorError::NotInitialized);
        }
        let raw = self.device.read_raw().await.map_err(|_| SensorError::Device)?;
        let scale = self.device.scale();

        // ── Gyro: bias tracking + removal ─────────────────────────────────────
        self.track_calibration(raw.gyro, Instant::now());
        let bias = self.gyro_bias.bias().as_array();
        let gyro = GyroSample::saturating(
            (raw.gyro[0] as f32 - bias[0]) / scale.gyro_lsb_per_dps,
            (raw.gyro[1] as f32 - bias[1]) / scale.gyro_lsb_per_dps,
            (raw.gyro[2] as f32 - bias[2]) / scale.gyro_lsb_per_dps,
        );

        // ── Accel: scale estimate on raw, then LPF → g → align ────────────────
        if self.gyro_bias.bias_found() && !self.accel_scale.is_done() {
            self.accel_scale.add_sample(raw.accel.map(|v| v as f32 / scale.accel_lsb_per_g));
        }
        let filtered = match self.accel_lpf.as_mut() {
            Some(lpf) => lpf.filter(raw.accel),
            None => return Err(SensorError::NotInitialized),
        };
        let accel_scale = self.accel_scale.scale();
        let accel_g = filtered.map(|v| v as f32 / scale.accel_lsb_per_g / accel_scale);
        let aligned = self.alignment.align(accel_g);
        let accel = AccelSample::saturating(aligned.x, aligned.y, aligned.z);

        // ── Mag ───────────────────────────────────────────────────────────────
        let mag = match raw.mag {
            Some(m) if self.device.has_magnetometer() => MagSample::saturating(
                m[0] as f32 / scale.mag_lsb_per_ut,
                m[1] as f32 / scale.mag_lsb_per_ut,
                m[2] as f32 / scale.mag_lsb_per_ut,
            ),
            _ => MagSample::ZERO,
        };

        Ok(SensorData9 { gyro, accel, mag })
    }

    fn track_calibration(&mut self, gyro_raw: [i16; 3], now: Instant) {
        if self.calibration.status() != CalibrationStatus::Pending {
            return;
        }
        self.gyro_bias.add_sample(gyro_raw);
        let found = self.gyro_bias.evaluate().is_some();
        self.calibration.poll(found, now);
    }

    /// Start a fresh calibration attempt; the vehicle must be still again.
    pub fn recalibrate(&mut self) {
        self.gyro_bias = BiasCalibrator::new(self.config.gyro_variance_threshold);
        self.calibration.reset();
        self.accel_scale = AccelScaleEstimator::new();
    }

    /// Update the mounting trim; trig is recomputed once here.
    pub fn set_trim(&mut self, trim_roll_deg: f32, trim_pitch_deg: f32) {
        self.alignment.set_trim(trim_roll_deg, trim_pitch_deg);
    }

    pub fn is_calibrated(&self) -> bool {
        self.gyro_bias.bias_found()
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibration.status()
    }

    pub fn has_magnetometer(&self) -> bool {
        self.device.has_magnetometer()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BIAS_SAMPLES;
    use crate::drivers::device::mock::MockImuDevice;
    use crate::drivers::device::RawImu;
    use crate::error::ConfigError;
    use embassy_futures::block_on;
    use embassy_time::Duration;

    fn facade(device: MockImuDevice) -> SensorAcquisition<MockImuDevice> {
        SensorAcquisition::new(device, SensorConfig::default())
    }

    #[test]
    fn init_is_idempotent() {
        let mut sensors = facade(MockImuDevice::still());
        block_on(async {
            sensors.init().await.unwrap();
            sensors.init().await.unwrap();
        });
        assert_eq!(sensors.device().init_calls, 1);
        assert_eq!(sensors.lifecycle(), Lifecycle::Initialized);
    }

    #[test]
    fn bad_cutoff_blocks_init_before_touching_device() {
        let config = SensorConfig { accel_cutoff_hz: 1000.0, ..SensorConfig::default() };
        let mut sensors = SensorAcquisition::new(MockImuDevice::still(), config);

        let result = block_on(sensors.init());
        assert!(matches!(
            result,
            Err(SensorError::Config(ConfigError::FilterAttenuation(_)))
        ));
        assert_eq!(sensors.device().init_calls, 0);
        assert_eq!(sensors.lifecycle(), Lifecycle::Uninitialized);
        assert_eq!(block_on(sensors.read_6()), Err(SensorError::NotInitialized));
    }

    #[test]
    fn device_failure_surfaces_as_device_error() {
        let mut device = MockImuDevice::still();
        device.failing = true;
        let mut sensors = facade(device);
        assert_eq!(block_on(sensors.init()), Err(SensorError::Device));
    }

    #[test]
    fn still_device_calibrates_within_one_buffer() {
        let mut sensors = facade(MockImuDevice::still());
        block_on(async {
            sensors.init().await.unwrap();

            let first = sensors.read_6().await.unwrap();
            assert!((first.gyro.x - 12.0 / 16.4).abs() < 1e-4);

            for _ in 1..BIAS_SAMPLES {
                sensors.read_6().await.unwrap();
            }
            assert!(sensors.is_calibrated());
            assert_eq!(sensors.calibration_status(), CalibrationStatus::Converged);

            let after = sensors.read_6().await.unwrap();
            assert_eq!(after.gyro, GyroSample::ZERO);
        });
    }

    #[test]
    fn accel_settles_on_one_g_down() {
        let mut sensors = facade(MockImuDevice::still());
        let data = block_on(async {
            sensors.init().await.unwrap();
            let mut last = SensorData6::default();
            for _ in 0..600 {
                last = sensors.read_6().await.unwrap();
            }
            last
        });
        assert!(data.accel.x.abs() < 1e-3);
        assert!(data.accel.y.abs() < 1e-3);
        assert!((data.accel.z - 1.0).abs() < 0.01);
    }

    #[test]
    fn missing_magnetometer_reads_zero() {
        let mut sensors = facade(MockImuDevice::still());
        let data = block_on(async {
            sensors.init().await.unwrap();
            sensors.read_9().await.unwrap()
        });
        assert!(!sensors.has_magnetometer());
        assert_eq!(data.mag, MagSample::ZERO);
    }

    #[test]
    fn magnetometer_is_scaled_to_microtesla() {
        let mut device = MockImuDevice::still();
        device.with_mag = true;
        let mut sensors = facade(device);
        let data = block_on(async {
            sensors.init().await.unwrap();
            sensors.read_9().await.unwrap()
        });
        assert!(sensors.has_magnetometer());
        assert!((data.mag.x - 20.0).abs() < 1e-3);
        assert_eq!(data.mag.y, 0.0);
        assert!((data.mag.z + 40.0).abs() < 1e-3);
    }

    #[test]
    fn self_test_passes_for_healthy_device() {
        let mut sensors = facade(MockImuDevice::still());
        let pass = block_on(async {
            sensors.init().await.unwrap();
            sensors.self_test().await
        });
        assert!(pass);
    }

    #[test]
    fn self_test_fails_on_weak_response_absent_device_or_no_init() {
        let mut weak = MockImuDevice::still();
        weak.self_test_response = RawImu::default();
        let mut sensors = facade(weak);
        assert!(!block_on(async {
            sensors.init().await.unwrap();
            sensors.self_test().await
        }));

        let mut absent = MockImuDevice::still();
        absent.present = false;
        let mut sensors = facade(absent);
        assert!(!block_on(async {
            sensors.init().await.unwrap();
            sensors.self_test().await
        }));

        let mut sensors = facade(MockImuDevice::still());
        assert!(!block_on(sensors.self_test()));
    }

    #[test]
    fn timed_out_self_test_turns_excitation_off() {
        let mut device = MockImuDevice::still();
        device.excited_read_delay = Some(Duration::from_millis(100));
        let mut sensors = facade(device);

        let (pass, data) = block_on(async {
            sensors.init().await.unwrap();
            let pass = sensors.self_test().await;
            (pass, sensors.read_6().await.unwrap())
        });

        assert!(!pass);
        assert!(!sensors.device().self_test_enabled());
        assert!((data.gyro.x - 12.0 / 16.4).abs() < 1e-4);
        assert!((data.gyro.y + 7.0 / 16.4).abs() < 1e-4);
    }

    #[test]
    fn expired_window_leaves_vehicle_uncalibrated_until_recalibrate() {
        let config = SensorConfig {
            calibration_timeout: Duration::from_ticks(0),
            ..SensorConfig::default()
        };
        let mut sensors = SensorAcquisition::new(MockImuDevice::still(), config);

        block_on(async {
            sensors.init().await.unwrap();
            for _ in 0..2 * BIAS_SAMPLES {
                sensors.read_6().await.unwrap();
            }
        });
        assert_eq!(sensors.calibration_status(), CalibrationStatus::TimedOut);
        assert!(!sensors.is_calibrated());

        sensors.config.calibration_timeout = Duration::from_millis(1000);
        sensors.calibration = CalibrationWindow::new(sensors.config.calibration_timeout);
        sensors.recalibrate();
        block_on(async {
            for _ in 0..BIAS_SAMPLES {
                sensors.read_6().await.unwrap();
            }
        });
        assert!(sensors.is_calibrated());
    }
}
