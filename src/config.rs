//! Build-time tuning.
//!
//! Timing constants are contractually fixed at build time. The grouped
//! structs only exist so tests can run the same code with other values.

use embassy_time::Duration;

// ── Control loop ──────────────────────────────────────────────────────────────

/// Control tick rate: 500 Hz
pub const CONTROL_LOOP_HZ: u64 = 500;
/// Control tick period (2 ms)
pub const CONTROL_PERIOD: Duration = Duration::from_millis(1000 / CONTROL_LOOP_HZ);
/// Attitude layer runs every tick
pub const ATTITUDE_RATE_DIVIDER: u32 = 1;
/// Altitude hold runs every 5th tick (100 Hz)
pub const ALTITUDE_RATE_DIVIDER: u32 = 5;
/// Lag (in periods) after which the schedule re-anchors instead of catching up
pub const MAX_CATCH_UP_PERIODS: u32 = 25;

// ── Sensors ───────────────────────────────────────────────────────────────────

/// IMU sample rate used for filter coefficient derivation
pub const IMU_SAMPLE_RATE_HZ: f32 = 500.0;
/// Wanted accelerometer low-pass cutoff (Hz)
pub const ACCEL_LPF_CUTOFF_HZ: f32 = 4.0;
/// Gyro bias buffer capacity
pub const BIAS_SAMPLES: usize = 32;
/// Per-axis stillness threshold on the gyro sample variance (LSB²)
pub const GYRO_VARIANCE_THRESHOLD: [i64; 3] = [50, 50, 50];
/// Budget for the gyro bias to converge
pub const CALIBRATION_TIMEOUT: Duration = Duration::from_millis(1000);
/// Accelerometer magnitude samples averaged into the scale estimate
pub const ACCEL_SCALE_SAMPLES: u32 = 200;
/// Mounting trim (degrees), roll about x then pitch about y
pub const TRIM_ROLL_DEG: f32 = 0.0;
pub const TRIM_PITCH_DEG: f32 = 0.0;

/// Whole self-test procedure must finish within this
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_millis(500);
/// Settle time after toggling the device self-test excitation
pub const SELF_TEST_SETTLE: Duration = Duration::from_millis(20);
/// Samples averaged on each side of the excitation
pub const SELF_TEST_SAMPLES: u32 = 8;
/// Accepted gyro self-test response (deg/s)
pub const GYRO_SELF_TEST_ENVELOPE: (f32, f32) = (10.0, 105.0);
/// Accepted accelerometer self-test response (g)
pub const ACCEL_SELF_TEST_ENVELOPE: (f32, f32) = (0.225, 0.675);

// ── Radio link ────────────────────────────────────────────────────────────────

/// Timeout for deliberate blocking queue calls
pub const QUEUE_TIMEOUT: Duration = Duration::from_millis(100);
/// Opportunistic outbound drain during dispatch
pub const PIGGYBACK_TIMEOUT: Duration = Duration::from_ticks(0);
/// Inbound enqueue from dispatch; a full queue drops the new packet
pub const INBOUND_ENQUEUE_TIMEOUT: Duration = Duration::from_ticks(0);
pub const INBOUND_QUEUE_CAPACITY: usize = 5;
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1;

/// Sensor pipeline tuning, validated by `SensorAcquisition::init`.
#[derive(Clone, Copy, Debug)]
pub struct SensorConfig {
    pub sample_rate_hz: f32,
    pub accel_cutoff_hz: f32,
    pub gyro_variance_threshold: [i64; 3],
    pub calibration_timeout: Duration,
    pub trim_roll_deg: f32,
    pub trim_pitch_deg: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: IMU_SAMPLE_RATE_HZ,
            accel_cutoff_hz: ACCEL_LPF_CUTOFF_HZ,
            gyro_variance_threshold: GYRO_VARIANCE_THRESHOLD,
            calibration_timeout: CALIBRATION_TIMEOUT,
            trim_roll_deg: TRIM_ROLL_DEG,
            trim_pitch_deg: TRIM_PITCH_DEG,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub period: Duration,
    pub attitude_divider: u32,
    pub altitude_divider: u32,
    pub max_catch_up_periods: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: CONTROL_PERIOD,
            attitude_divider: ATTITUDE_RATE_DIVIDER,
            altitude_divider: ALTITUDE_RATE_DIVIDER,
            max_catch_up_periods: MAX_CATCH_UP_PERIODS,
        }
    }
}
