//! Gravity alignment of the accelerometer.
//!
//! Rotates filtered accelerometer readings by the mounting trim so that the
//! sensor's "down" matches the vehicle's vertical axis: roll about x first,
//! then pitch about y. The trigonometry is cached and only recomputed when
//! the trim changes.

#[allow(unused_imports)]
use micromath::F32Ext;

/// Magnitudes below this (g) are treated as zero before normalisation.
pub const MIN_MAGNITUDE: f32 = 1.0e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AlignedVector {
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector, or zero when the magnitude sits inside the floor band.
    ///
    /// Never divides by less than `MIN_MAGNITUDE`.
    pub fn unit(&self) -> [f32; 3] {
        let magnitude = self.magnitude();
        if !(magnitude >= MIN_MAGNITUDE) || !magnitude.is_finite() {
            return [0.0; 3];
        }
        [self.x / magnitude, self.y / magnitude, self.z / magnitude]
    }

    pub fn as_array(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GravityAlignment {
    cos_pitch: f32,
    sin_pitch: f32,
    cos_roll: f32,
    sin_roll: f32,
}

impl GravityAlignment {
    pub fn new(trim_roll_deg: f32, trim_pitch_deg: f32) -> Self {
        let mut alignment = Self::identity();
        alignment.set_trim(trim_roll_deg, trim_pitch_deg);
        alignment
    }

    pub const fn identity() -> Self {
        Self { cos_pitch: 1.0, sin_pitch: 0.0, cos_roll: 1.0, sin_roll: 0.0 }
    }

    pub fn set_trim(&mut self, trim_roll_deg: f32, trim_pitch_deg: f32) {
        let roll = trim_roll_deg.to_radians();
        let pitch = trim_pitch_deg.to_radians();
        self.cos_roll = roll.cos();
        self.sin_roll = roll.sin();
        self.cos_pitch = pitch.cos();
        self.sin_pitch = pitch.sin();
    }

    pub fn align(&self, accel: [f32; 3]) -> AlignedVector {
        let [x, y, z] = accel;

        // about x
        let rx = x;
        let ry = y * self.cos_roll - z * self.sin_roll;
        let rz = y * self.sin_roll + z * self.cos_roll;

        // about y
        AlignedVector {
            x: rx * self.cos_pitch + rz * self.sin_pitch,
            y: ry,
            z: -rx * self.sin_pitch + rz * self.cos_pitch,
        }
    }
}

impl Default for GravityAlignment {
    fn default() -> Self {
        Self::identity()
    }
}
