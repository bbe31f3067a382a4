use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};
use embassy_time::{Duration, Timer};

use crate::drivers::device::{ImuDevice, ImuScale, RawImu, DEFAULT_SCALE};

// ── Bank 0 registers ──────────────────────────────────────────────────────────
const DEVICE_CONFIG: u8 = 0x11;
const ACCEL_DATA_X1: u8 = 0x1F;
const PWR_MGMT0: u8 = 0x4E;
const GYRO_CONFIG0: u8 = 0x4F;
const ACCEL_CONFIG0: u8 = 0x50;
const SELF_TEST_CONFIG: u8 = 0x70;
const WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x47;
/// ±2000 dps / ±16 g (FS_SEL = 0), ODR 500 Hz
const ODR_500HZ_FULL_SCALE: u8 = 0x0F;
/// Gyro and accel in low-noise mode
const PWR_LOW_NOISE: u8 = 0x0F;
/// EN_{G,A}{X,Y,Z} + ACCEL_ST_POWER
const SELF_TEST_ALL_AXES: u8 = 0x7F;

pub struct Icm42688<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Icm42688<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    async fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error> {
        let buf = [reg & 0x7F, value];
        self.cs.set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs.set_high();
        res
    }

    async fn read_reg(&mut self, reg: u8) -> Result<u8, Error> {
        let tx = [reg | 0x80, 0x00];
        let mut rx = [0u8; 2];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();

        res?;
        Ok(rx[1])
    }
}

impl<'d, T: Instance> ImuDevice for Icm42688<'d, T> {
    type Error = Error;

    async fn init(&mut self) -> Result<(), Error> {
        // Soft reset
        self.write_reg(DEVICE_CONFIG, 0x01).await?;
        Timer::after(Duration::from_millis(10)).await;

        self.write_reg(GYRO_CONFIG0, ODR_500HZ_FULL_SCALE).await?;
        self.write_reg(ACCEL_CONFIG0, ODR_500HZ_FULL_SCALE).await?;
        self.write_reg(PWR_MGMT0, PWR_LOW_NOISE).await?;
        Timer::after(Duration::from_millis(50)).await; // gyro startup

        Ok(())
    }

    async fn probe(&mut self) -> Result<bool, Error> {
        Ok(self.read_reg(WHO_AM_I).await? == WHO_AM_I_VALUE)
    }

    async fn read_raw(&mut self) -> Result<RawImu, Error> {
        let mut tx = [0u8; 13];
        tx[0] = ACCEL_DATA_X1 | 0x80;
        let mut rx = [0u8; 13];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();
        res?;

        let word = |i: usize| i16::from_be_bytes([rx[i], rx[i + 1]]);
        Ok(RawImu {
            accel: [word(1), word(3), word(5)],
            gyro: [word(7), word(9), word(11)],
            mag: None,
        })
    }

    async fn set_self_test(&mut self, enabled: bool) -> Result<(), Error> {
        let value = if enabled { SELF_TEST_ALL_AXES } else { 0x00 };
        self.write_reg(SELF_TEST_CONFIG, value).await
    }

    fn scale(&self) -> ImuScale {
        DEFAULT_SCALE
    }

    fn has_magnetometer(&self) -> bool {
        false
    }
}
