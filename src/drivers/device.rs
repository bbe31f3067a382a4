//! IMU device boundary.
//!
//! Register-level I/O lives behind `ImuDevice`; the acquisition facade only
//! sees raw counts and the scale factors needed to turn them into units.

/// One raw reading, device frame, LSB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawImu {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    /// `None` when the device has no magnetometer
    pub mag: Option<[i16; 3]>,
}

/// LSB per physical unit for the configured full-scale ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuScale {
    pub gyro_lsb_per_dps: f32,
    pub accel_lsb_per_g: f32,
    pub mag_lsb_per_ut: f32,
}

/// ±2000 dps / ±16 g, the ranges the flight board runs at
pub const DEFAULT_SCALE: ImuScale = ImuScale {
    gyro_lsb_per_dps: 16.4,
    accel_lsb_per_g: 2048.0,
    mag_lsb_per_ut: 10.9,
};

#[allow(async_fn_in_trait)]
pub trait ImuDevice {
    type Error: core::fmt::Debug;

    /// Bring the device out of reset into continuous measurement.
    async fn init(&mut self) -> Result<(), Self::Error>;

    /// `true` when the identity register reads back the expected value.
    async fn probe(&mut self) -> Result<bool, Self::Error>;

    async fn read_raw(&mut self) -> Result<RawImu, Self::Error>;

    /// Enable or disable the built-in excitation on every axis.
    async fn set_self_test(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn scale(&self) -> ImuScale;

    fn has_magnetometer(&self) -> bool;
}
