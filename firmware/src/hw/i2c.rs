//! EFM32 I2C controller binding for the core driver.

use bus_core::BusId;
use bus_core::bus::{BusCommand, BusHardware, IrqFlags};
use bus_core::config::{BusSettings, clock_divider};
use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;

use super::{RegisterBlock, cmu};
use crate::board;

const CTRL: usize = 0x00;
const CMD: usize = 0x04;
const STATE: usize = 0x08;
const CLKDIV: usize = 0x10;
const RXDATA: usize = 0x1C;
const TXDATA: usize = 0x2C;
const IF: usize = 0x34;
const IFS: usize = 0x38;
const IFC: usize = 0x3C;
const IEN: usize = 0x40;
const ROUTEPEN: usize = 0x44;
const ROUTELOC0: usize = 0x48;

const CTRL_EN: u32 = 1 << 0;
const CTRL_CLHR_SHIFT: u32 = 8;
const STATE_STATE_MASK: u32 = 0x7 << 5;
const ROUTEPEN_SDAPEN: u32 = 1 << 0;
const ROUTEPEN_SCLPEN: u32 = 1 << 1;
const ROUTELOC0_SCLLOC_SHIFT: u32 = 8;

/// External interrupt lines of the two controllers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum I2cIrq {
    I2c0 = 16,
    I2c1 = 42,
}

impl I2cIrq {
    pub const fn of(bus: BusId) -> Self {
        match bus {
            BusId::Bus0 => I2cIrq::I2c0,
            BusId::Bus1 => I2cIrq::I2c1,
        }
    }

    /// Bus serviced by external interrupt `irqn`.
    pub const fn bus(irqn: i16) -> Option<BusId> {
        match irqn {
            16 => Some(BusId::Bus0),
            42 => Some(BusId::Bus1),
            _ => None,
        }
    }
}

// SAFETY: both discriminants are valid external interrupt numbers on the PG12.
unsafe impl InterruptNumber for I2cIrq {
    fn number(self) -> u16 {
        self as u16
    }
}

/// One memory-mapped I2C controller.
pub struct EfmI2c {
    bus: BusId,
    regs: RegisterBlock,
}

impl EfmI2c {
    pub const fn new(bus: BusId) -> Self {
        let base = match bus {
            BusId::Bus0 => 0x4000_C000,
            BusId::Bus1 => 0x4000_C400,
        };
        Self {
            bus,
            // SAFETY: I2C0/I2C1 register blocks of the EFM32PG12.
            regs: unsafe { RegisterBlock::new(base) },
        }
    }
}

impl BusHardware for EfmI2c {
    fn enable_clock(&mut self) {
        cmu::enable_i2c_clock(self.bus);
    }

    fn apply_settings(&mut self, settings: &BusSettings) {
        let reference = settings.reference_hz(board::HFPERCLK_HZ);
        let divider = clock_divider(reference, settings.bus_freq_hz, settings.clock_ratio);

        self.regs.write(CTRL, 0);
        self.regs.write(CLKDIV, u32::from(divider));
        self.regs
            .write(CTRL, settings.clock_ratio.field() << CTRL_CLHR_SHIFT);

        let mut pins = 0;
        if settings.sda_pin_enable {
            pins |= ROUTEPEN_SDAPEN;
        }
        if settings.scl_pin_enable {
            pins |= ROUTEPEN_SCLPEN;
        }
        self.regs.write(
            ROUTELOC0,
            u32::from(settings.sda_location)
                | (u32::from(settings.scl_location) << ROUTELOC0_SCLLOC_SHIFT),
        );
        self.regs.write(ROUTEPEN, pins);

        if settings.enable {
            self.regs.modify(CTRL, |ctrl| ctrl | CTRL_EN);
        }
    }

    fn command(&mut self, command: BusCommand) {
        self.regs.write(CMD, command.bits());
    }

    fn write_data(&mut self, byte: u8) {
        self.regs.write(TXDATA, u32::from(byte));
    }

    fn read_data(&mut self) -> u8 {
        self.regs.read(RXDATA).to_le_bytes()[0]
    }

    fn is_idle(&self) -> bool {
        self.regs.read(STATE) & STATE_STATE_MASK == 0
    }

    fn flags(&self) -> IrqFlags {
        IrqFlags::from_bits_truncate(self.regs.read(IF))
    }

    fn set_flags(&mut self, flags: IrqFlags) {
        self.regs.write(IFS, flags.bits());
    }

    fn clear_flags(&mut self, flags: IrqFlags) {
        self.regs.write(IFC, flags.bits());
    }

    fn enabled(&self) -> IrqFlags {
        IrqFlags::from_bits_truncate(self.regs.read(IEN))
    }

    fn set_enabled(&mut self, flags: IrqFlags) {
        self.regs.write(IEN, flags.bits());
    }

    fn unmask_interrupt(&mut self) {
        let irq = I2cIrq::of(self.bus);
        NVIC::unpend(irq);
        // SAFETY: the handler for this line only touches the driver through
        // its critical-section mutex.
        unsafe { NVIC::unmask(irq) };
    }
}
