//! Clock management unit: the few switches the bus driver needs.

use bus_core::BusId;

use super::RegisterBlock;

// SAFETY: CMU register block of the EFM32PG12.
const CMU: RegisterBlock = unsafe { RegisterBlock::new(0x400E_4000) };

const CTRL: usize = 0x000;
const OSCENCMD: usize = 0x060;
const STATUS: usize = 0x090;
const HFPERCLKEN0: usize = 0x0C0;

const CTRL_HFPERCLKEN: u32 = 1 << 20;
const OSCENCMD_LFRCODIS: u32 = 1 << 7;
const OSCENCMD_LFXOEN: u32 = 1 << 8;
const OSCENCMD_LFXODIS: u32 = 1 << 9;
const STATUS_LFXORDY: u32 = 1 << 17;

const fn i2c_clock_bit(bus: BusId) -> u32 {
    match bus {
        BusId::Bus0 => 1 << 11,
        BusId::Bus1 => 1 << 12,
    }
}

/// Enables the high-frequency peripheral clock tree and the LFXO.
pub fn open() {
    CMU.modify(CTRL, |ctrl| ctrl | CTRL_HFPERCLKEN);
    CMU.write(OSCENCMD, OSCENCMD_LFRCODIS);
    start_lfxo();
}

/// Gates the peripheral clock of one bus controller on.
pub fn enable_i2c_clock(bus: BusId) {
    CMU.modify(HFPERCLKEN0, |enables| enables | i2c_clock_bit(bus));
}

/// Stops the LFXO; only the ULFRCO keeps running afterwards.
pub fn stop_lfxo() {
    CMU.write(OSCENCMD, OSCENCMD_LFXODIS);
}

/// Starts the LFXO and waits until it is stable.
pub fn start_lfxo() {
    CMU.write(OSCENCMD, OSCENCMD_LFXOEN);
    while CMU.read(STATUS) & STATUS_LFXORDY == 0 {
        core::hint::spin_loop();
    }
}
