#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Pin, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use flight_substrate::board::{Board, StatusLed};
use flight_substrate::config::{SchedulerConfig, SensorConfig};
use flight_substrate::drivers::crtp::CrtpPacket;
use flight_substrate::drivers::dshot::Dshot300;
use flight_substrate::drivers::icm42688::Icm42688;
use flight_substrate::tasks::control_task::{control_task, SampleForwarder};
use flight_substrate::tasks::radio_task::{radio_task, UartFrameSink};
use flight_substrate::{ControlScheduler, LinkHandle, RadioLink, SensorAcquisition, SensorData9};

// ── Shared state ──────────────────────────────────────────────────────────────
static RADIO_LINK: RadioLink = RadioLink::new();
//  Cap=1: telemetry only wants the LATEST sample
static SAMPLE_CHAN: Channel<CriticalSectionRawMutex, (SensorData9, bool), 1> = Channel::new();

/// CRTP port of the sensor telemetry stream
const TELEMETRY_PORT: u8 = 0x05;
/// 10 Hz out of the 500 Hz attitude rate
const TELEMETRY_DIVIDER: u32 = 50;

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    UART4 => embassy_stm32::usart::InterruptHandler<peripherals::UART4>;
});

/// gyro (0.1 dps) and accel (mg) as little-endian i16, then flags and RSSI
fn telemetry_packet(data: &SensorData9, calibrated: bool, rssi: u8) -> Option<CrtpPacket> {
    let mut payload = [0u8; 14];
    let words = [
        data.gyro.x * 10.0,
        data.gyro.y * 10.0,
        data.gyro.z * 10.0,
        data.accel.x * 1000.0,
        data.accel.y * 1000.0,
        data.accel.z * 1000.0,
    ];
    for (chunk, value) in payload.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&(value as i16).to_le_bytes());
    }
    payload[12] = calibrated as u8;
    payload[13] = rssi;
    CrtpPacket::with_port(TELEMETRY_PORT, 0, &payload).ok()
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;

    // 2. SPI1 @ 10 MHz: ICM-42688 IMU (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PB12)
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(10_000_000);
    let spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, spi_config);
    let cs_imu = Output::new(p.PB12.degrade(), Level::High, Speed::VeryHigh);
    let imu = Icm42688::new(spi, cs_imu);

    // 3. Radio UART4 @ 1 Mbaud syslink (TX=PA0, RX=PA1)
    let mut radio_config = UsartConfig::default();
    radio_config.baudrate = 1_000_000;
    let radio_uart = Uart::new(
        p.UART4, p.PA1, p.PA0,
        Irqs,
        p.DMA1_CH4, p.DMA1_CH2,
        radio_config,
    ).unwrap();
    let (radio_tx, radio_rx) = radio_uart.split();

    // 4. Subsystems, 'static for the scheduler registry
    static LED: StaticCell<StatusLed> = StaticCell::new();
    static MOTOR: StaticCell<Dshot300> = StaticCell::new();
    static LINK: StaticCell<LinkHandle<'static>> = StaticCell::new();
    let led = LED.init(StatusLed::new(p.PC13.degrade()));
    let motor = MOTOR.init(Dshot300::new(p.PB0.degrade()));
    let link = LINK.init(RADIO_LINK.handle());

    // 5. Scheduler: sensors + control law + subsystems
    let sensors = SensorAcquisition::new(imu, SensorConfig::default());
    let law = SampleForwarder::new(SAMPLE_CHAN.sender());
    let mut scheduler = ControlScheduler::new(sensors, law, SchedulerConfig::default());
    scheduler.register(led).unwrap();
    scheduler.register(motor).unwrap();
    scheduler.register(link).unwrap();

    // 6. Spawn all tasks
    spawner.spawn(radio_task(
        radio_rx,
        UartFrameSink::new(radio_tx),
        &RADIO_LINK,
    )).unwrap();

    spawner.spawn(control_task(scheduler)).unwrap();

    // 7. Main task: drain commands, stream telemetry
    let link = RADIO_LINK.handle();
    let samples = SAMPLE_CHAN.receiver();
    let mut count: u32 = 0;
    loop {
        let (data, calibrated) = samples.receive().await;
        count = count.wrapping_add(1);

        while let Some(packet) = link.receive(Duration::from_ticks(0)).await {
            flight_substrate::log_debug!(
                "crtp port {} ch {} ({} bytes)",
                packet.port(),
                packet.channel(),
                packet.size()
            );
        }

        if count % TELEMETRY_DIVIDER != 0 {
            continue;
        }
        if let Some(packet) = telemetry_packet(&data, calibrated, link.latest_signal_strength()) {
            if !link.send(packet).await {
                flight_substrate::log_debug!("telemetry slot still occupied");
            }
        }
    }
}
