use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH2, DMA1_CH4, UART4};
use embassy_stm32::usart::{Error, UartRx, UartTx};

use crate::drivers::syslink::{write_frame, SyslinkPacket, SyslinkParser, SYSLINK_MAX_WIRE};
use crate::link::{DispatchOutcome, FrameSink, RadioLink};

pub struct UartFrameSink {
    tx: UartTx<'static, UART4, DMA1_CH4>,
}

impl UartFrameSink {
    pub fn new(tx: UartTx<'static, UART4, DMA1_CH4>) -> Self {
        Self { tx }
    }
}

impl FrameSink for UartFrameSink {
    type Error = Error;

    async fn send_frame(&mut self, frame: &SyslinkPacket) -> Result<(), Error> {
        let mut buf = [0u8; SYSLINK_MAX_WIRE];
        let len = write_frame(&mut buf, frame);
        self.tx.write(&buf[..len]).await
    }
}

/// Radio task: reassembles syslink frames from UART4 and dispatches each one.
#[task]
pub async fn radio_task(
    mut rx: UartRx<'static, UART4, DMA1_CH2>,
    mut sink: UartFrameSink,
    link: &'static RadioLink,
) {
    let mut parser = SyslinkParser::new();
    let mut checksum_errors = 0u32;
    let mut buf = [0u8; 64];

    loop {
        let len = match rx.read_until_idle(&mut buf).await {
            Ok(len) => len,
            Err(_) => {
                crate::log_warn!("radio uart rx error");
                continue;
            }
        };

        for &byte in &buf[..len] {
            let Some(frame) = parser.push_byte(byte) else {
                continue;
            };
            if let DispatchOutcome::Unhandled(kind) = link.dispatch(&frame, &mut sink).await {
                crate::log_debug!("syslink type {} not routed", kind.as_u8());
            }
        }

        if parser.checksum_errors() != checksum_errors {
            checksum_errors = parser.checksum_errors();
            crate::log_warn!("syslink checksum errors: {}", checksum_errors);
        }
    }
}
