//! Sensor sample types handed from the acquisition facade to the control law.
//!
//! All types are `Copy` so they can be passed through embassy channels.
//! Each physical quantity is range-checked: `new` rejects values outside the
//! declared range, `saturating` clamps them (used inside the pipeline, where
//! rotation and bias removal can nudge a valid reading past the bound).

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::drivers::alignment::AlignedVector;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Component lifecycle, checked at the start of every lifecycle operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initialized,
    Running,
}

impl Lifecycle {
    pub fn is_initialized(self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

// ── Range-checked samples ─────────────────────────────────────────────────────

/// Component outside the declared physical range (or not finite).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutOfRange(pub f32);

macro_rules! bounded_vector {
    ($(#[$meta:meta])* $name:ident, $limit:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq)]
        pub struct $name {
            pub x: f32,
            pub y: f32,
            pub z: f32,
        }

        impl $name {
            pub const LIMIT: f32 = $limit;
            pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

            pub fn new(x: f32, y: f32, z: f32) -> Result<Self, OutOfRange> {
                for v in [x, y, z] {
                    if !v.is_finite() || v.abs() > Self::LIMIT {
                        return Err(OutOfRange(v));
                    }
                }
                Ok(Self { x, y, z })
            }

            /// Clamp into range; NaN becomes zero.
            pub fn saturating(x: f32, y: f32, z: f32) -> Self {
                let clamp = |v: f32| {
                    if v.is_nan() {
                        0.0
                    } else {
                        v.clamp(-Self::LIMIT, Self::LIMIT)
                    }
                };
                Self { x: clamp(x), y: clamp(y), z: clamp(z) }
            }

            pub fn as_array(&self) -> [f32; 3] {
                [self.x, self.y, self.z]
            }
        }
    };
}

bounded_vector!(
    /// Angular rate, deg/s
    GyroSample,
    3000.0
);
bounded_vector!(
    /// Specific force, g
    AccelSample,
    16.0
);
bounded_vector!(
    /// Magnetic field, µT
    MagSample,
    1200.0
);

impl AccelSample {
    /// Gravity direction handed to the control law. Zero when the magnitude
    /// is below `MIN_MAGNITUDE` (free fall, dead sensor).
    pub fn unit(&self) -> [f32; 3] {
        AlignedVector { x: self.x, y: self.y, z: self.z }.unit()
    }
}

// ── Facade outputs ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorData6 {
    pub gyro: GyroSample,
    pub accel: AccelSample,
}

/// `mag` is `MagSample::ZERO` when the magnetometer is absent; check
/// `SensorAcquisition::has_magnetometer` before trusting it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorData9 {
    pub gyro: GyroSample,
    pub accel: AccelSample,
    pub mag: MagSample,
}

impl From<SensorData9> for SensorData6 {
    fn from(data: SensorData9) -> Self {
        Self { gyro: data.gyro, accel: data.accel }
    }
}
