//! Gyro bias calibration
//!
//! The vehicle must sit still at power-up. Raw samples go into a fixed
//! 32-entry ring buffer; once it is full, per-axis mean and variance are
//! computed with integer accumulation. When every axis is below its
//! stillness threshold the mean is latched as the bias.

use embassy_time::{Duration, Instant};

use crate::config::{ACCEL_SCALE_SAMPLES, BIAS_SAMPLES};

#[allow(unused_imports)]
use micromath::F32Ext;

/// Accepted zero-offset in raw LSB.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bias {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Bias {
    pub fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

pub struct BiasCalibrator {
    buffer: [[i16; 3]; BIAS_SAMPLES],
    index: usize,
    buffer_full: bool,
    bias_found: bool,
    bias: Bias,
    threshold: [i64; 3],
}

impl BiasCalibrator {
    pub fn new(threshold: [i64; 3]) -> Self {
        Self {
            buffer: [[0; 3]; BIAS_SAMPLES],
            index: 0,
            buffer_full: false,
            bias_found: false,
            bias: Bias::default(),
            threshold,
        }
    }

    pub fn add_sample(&mut self, raw: [i16; 3]) {
        self.buffer[self.index] = raw;
        self.index += 1;
        if self.index >= BIAS_SAMPLES {
            self.index = 0;
            self.buffer_full = true;
        }
    }

    /// `Some(bias)` once the buffer has shown stillness; latched afterwards.
    pub fn evaluate(&mut self) -> Option<Bias> {
        if self.bias_found {
            return Some(self.bias);
        }
        if !self.buffer_full {
            return None;
        }

        let (mean, variance) = self.mean_and_variance();
        let still = variance
            .iter()
            .zip(self.threshold.iter())
            .all(|(var, limit)| var < limit);

        if still {
            self.bias = mean;
            self.bias_found = true;
            crate::log_info!("gyro bias found: {} {} {}", mean.x, mean.y, mean.z);
            Some(mean)
        } else {
            None
        }
    }

    /// Per-axis mean (LSB) and population variance (LSB²).
    ///
    /// Sums are `i64`: 32 × i16² stays below 2^35.
    pub fn mean_and_variance(&self) -> (Bias, [i64; 3]) {
        let n = BIAS_SAMPLES as i64;
        let mut sum = [0i64; 3];
        let mut sum_sq = [0i64; 3];

        for sample in self.buffer.iter() {
            for axis in 0..3 {
                let v = sample[axis] as i64;
                sum[axis] += v;
                sum_sq[axis] += v * v;
            }
        }

        let mut variance = [0i64; 3];
        for axis in 0..3 {
            variance[axis] = (sum_sq[axis] - sum[axis] * sum[axis] / n) / n;
        }

        let mean = Bias {
            x: sum[0] as f32 / n as f32,
            y: sum[1] as f32 / n as f32,
            z: sum[2] as f32 / n as f32,
        };
        (mean, variance)
    }

    pub fn is_buffer_full(&self) -> bool {
        self.buffer_full
    }

    pub fn bias_found(&self) -> bool {
        self.bias_found
    }

    /// Zero until found.
    pub fn bias(&self) -> Bias {
        self.bias
    }
}

// ── Wall-clock gate ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStatus {
    Pending,
    Converged,
    /// Terminal for this attempt; the vehicle stays un-calibrated.
    TimedOut,
}

/// Fails the calibration attempt if the bias has not converged within
/// `timeout` of the first polled sample.
pub struct CalibrationWindow {
    timeout: Duration,
    started_at: Option<Instant>,
    status: CalibrationStatus,
}

impl CalibrationWindow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, started_at: None, status: CalibrationStatus::Pending }
    }

    pub fn poll(&mut self, found: bool, now: Instant) -> CalibrationStatus {
        if self.status != CalibrationStatus::Pending {
            return self.status;
        }
        let started = *self.started_at.get_or_insert(now);

        if found {
            self.status = CalibrationStatus::Converged;
        } else if now.saturating_duration_since(started) >= self.timeout {
            self.status = CalibrationStatus::TimedOut;
            crate::log_warn!("gyro calibration timed out after {} ms", self.timeout.as_millis());
        }
        self.status
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.status = CalibrationStatus::Pending;
    }
}

// ── Accelerometer scale ───────────────────────────────────────────────────────

/// Plausible still-vehicle accelerometer magnitude (g)
const ACCEL_SCALE_BOUNDS: (f32, f32) = (0.5, 1.5);

/// Averages the accelerometer magnitude while the vehicle is known still so
/// a still reading normalises to exactly 1 g.
pub struct AccelScaleEstimator {
    sum: f32,
    count: u32,
    scale: Option<f32>,
}

impl AccelScaleEstimator {
    pub const fn new() -> Self {
        Self { sum: 0.0, count: 0, scale: None }
    }

    pub fn add_sample(&mut self, accel_g: [f32; 3]) {
        if self.scale.is_some() {
            return;
        }
        let [x, y, z] = accel_g;
        self.sum += (x * x + y * y + z * z).sqrt();
        self.count += 1;

        if self.count >= ACCEL_SCALE_SAMPLES {
            let mean = self.sum / self.count as f32;
            if (ACCEL_SCALE_BOUNDS.0..=ACCEL_SCALE_BOUNDS.1).contains(&mean) {
                self.scale = Some(mean);
            } else {
                crate::log_warn!("discarding implausible accel scale {}", mean);
                self.sum = 0.0;
                self.count = 0;
            }
        }
    }

    /// 1.0 until an estimate is latched.
    pub fn scale(&self) -> f32 {
        self.scale.unwrap_or(1.0)
    }

    pub fn is_done(&self) -> bool {
        self.scale.is_some()
    }
}

impl Default for AccelScaleEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GYRO_VARIANCE_THRESHOLD;

    /// xorshift32, deterministic noise for the tests
    struct Noise(u32);

    impl Noise {
        fn next(&mut self) -> u32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 17;
            self.0 ^= self.0 << 5;
            self.0
        }

        fn around(&mut self, center: i16, spread: i16) -> i16 {
            let offset = (self.next() % (2 * spread as u32 + 1)) as i16 - spread;
            center + offset
        }
    }

    #[test]
    fn still_sensor_converges_within_one_buffer() {
        let mut cal = BiasCalibrator::new(GYRO_VARIANCE_THRESHOLD);
        let mut found_at = None;

        for i in 0..BIAS_SAMPLES {
            cal.add_sample([12, -40, 3]);
            if let Some(bias) = cal.evaluate() {
                found_at = Some(i + 1);
                assert_eq!(bias, Bias { x: 12.0, y: -40.0, z: 3.0 });
                break;
            }
        }

        assert_eq!(found_at, Some(BIAS_SAMPLES));
        assert!(cal.bias_found());
    }

    #[test]
    fn noisy_sensor_never_converges() {
        let mut cal = BiasCalibrator::new(GYRO_VARIANCE_THRESHOLD);
        let mut noise = Noise(0x1234_5678);

        for _ in 0..10 * BIAS_SAMPLES {
            cal.add_sample([noise.around(0, 400), noise.around(5, 400), noise.around(-5, 400)]);
            assert_eq!(cal.evaluate(), None);
        }
        assert!(cal.is_buffer_full());
        assert!(!cal.bias_found());
    }

    #[test]
    fn bias_is_latched_once_found() {
        let mut cal = BiasCalibrator::new(GYRO_VARIANCE_THRESHOLD);
        for _ in 0..BIAS_SAMPLES {
            cal.add_sample([100, 100, 100]);
        }
        let bias = cal.evaluate().unwrap();

        for i in 0..BIAS_SAMPLES {
            cal.add_sample([i as i16 * 1000, 0, 0]);
        }
        assert_eq!(cal.evaluate(), Some(bias));
    }

    #[test]
    fn ring_buffer_overwrites_oldest_entry() {
        let mut cal = BiasCalibrator::new([0, 0, 0]);
        for _ in 0..BIAS_SAMPLES {
            cal.add_sample([1000, 0, 0]);
        }
        for _ in 0..BIAS_SAMPLES {
            cal.add_sample([-8, 0, 0]);
        }
        let (mean, variance) = cal.mean_and_variance();
        assert_eq!(mean.x, -8.0);
        assert_eq!(variance, [0, 0, 0]);
    }

    #[test]
    fn variance_matches_population_formula() {
        let mut cal = BiasCalibrator::new(GYRO_VARIANCE_THRESHOLD);
        for i in 0..BIAS_SAMPLES {
            let v = if i % 2 == 0 { 10 } else { -10 };
            cal.add_sample([v, 0, 0]);
        }
        let (mean, variance) = cal.mean_and_variance();
        assert_eq!(mean.x, 0.0);
        assert_eq!(variance[0], 100);
    }

    #[test]
    fn window_times_out_only_after_budget() {
        let mut window = CalibrationWindow::new(Duration::from_millis(1000));
        let t0 = Instant::from_millis(5_000);

        assert_eq!(window.poll(false, t0), CalibrationStatus::Pending);
        assert_eq!(
            window.poll(false, t0 + Duration::from_millis(999)),
            CalibrationStatus::Pending
        );
        assert_eq!(
            window.poll(false, t0 + Duration::from_millis(1000)),
            CalibrationStatus::TimedOut
        );
        // late convergence does not rescue the attempt
        assert_eq!(
            window.poll(true, t0 + Duration::from_millis(1001)),
            CalibrationStatus::TimedOut
        );

        window.reset();
        let late = t0 + Duration::from_millis(2000);
        assert_eq!(window.poll(true, late), CalibrationStatus::Converged);
    }

    #[test]
    fn noisy_sensor_fed_at_tick_rate_fails_after_one_second() {
        let mut cal = BiasCalibrator::new(GYRO_VARIANCE_THRESHOLD);
        let mut window = CalibrationWindow::new(crate::config::CALIBRATION_TIMEOUT);
        let mut noise = Noise(42);
        let t0 = Instant::from_millis(0);

        let mut failed_at = None;
        for tick in 0..1000u64 {
            cal.add_sample([noise.around(0, 300), noise.around(0, 300), noise.around(0, 300)]);
            let found = cal.evaluate().is_some();
            let now = t0 + Duration::from_millis(tick * 2);
            if window.poll(found, now) == CalibrationStatus::TimedOut {
                failed_at = Some(now);
                break;
            }
        }

        assert_eq!(failed_at, Some(Instant::from_millis(1000)));
    }

    #[test]
    fn accel_scale_latches_mean_magnitude() {
        let mut est = AccelScaleEstimator::new();
        assert_eq!(est.scale(), 1.0);
        for _ in 0..ACCEL_SCALE_SAMPLES {
            est.add_sample([0.0, 0.6, 0.8 * 1.02]);
        }
        assert!(est.is_done());
        let expected = (0.36f32 + (0.8 * 1.02f32) * (0.8 * 1.02)).sqrt();
        assert!((est.scale() - expected).abs() < 1e-4);
    }

    #[test]
    fn accel_scale_discards_implausible_estimate() {
        let mut est = AccelScaleEstimator::new();
        for _ in 0..ACCEL_SCALE_SAMPLES {
            est.add_sample([0.0, 0.0, 3.0]);
        }
        assert!(!est.is_done());
        assert_eq!(est.scale(), 1.0);
    }
}
