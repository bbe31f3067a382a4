use embassy_stm32::gpio::{AnyPin, Level, Output, Speed};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

use crate::scheduler::{Subsystem, SubsystemKind};

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000), // 8 MHz crystal
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: None,
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self { p }
    }
}

/// Active-low status LED; lit once bring-up reaches it.
pub struct StatusLed {
    pin: Output<'static, AnyPin>,
}

impl StatusLed {
    pub fn new(pin: AnyPin) -> Self {
        Self { pin: Output::new(pin, Level::High, Speed::Low) }
    }

    pub fn toggle(&mut self) {
        self.pin.toggle();
    }
}

impl Subsystem for StatusLed {
    fn name(&self) -> &'static str {
        "status led"
    }

    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Indicators
    }

    fn init(&mut self) {
        self.pin.set_low();
    }

    fn self_test(&mut self) -> bool {
        self.pin.is_set_low()
    }
}
