pub mod alignment;
pub mod calibrator;
pub mod crtp;
pub mod device;
pub mod filter;
pub mod syslink;

#[cfg(feature = "firmware")]
pub mod dshot;
#[cfg(feature = "firmware")]
pub mod icm42688;
