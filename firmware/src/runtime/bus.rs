//! Thread-mode access to the shared bus driver.
//!
//! The driver lives in a critical-section mutex shared with the controller
//! interrupt handlers. Every helper here locks it only for one driver call so
//! the completion interrupts can run between polls.

use core::cell::RefCell;

use bus_core::bus::IrqFlags;
use bus_core::config::BusSettings;
use bus_core::{BusDriver, BusId, TransferRequest, start_blocking, start_within};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::{ENERGY, EVENTS};
use crate::fault;
use crate::hw::i2c::EfmI2c;
use crate::telemetry::TraceForwarder;

type SharedDriver = Mutex<CriticalSectionRawMutex, RefCell<BusDriver<EfmI2c>>>;

static DRIVER: SharedDriver = Mutex::new(RefCell::new(BusDriver::new(
    EfmI2c::new(BusId::Bus0),
    EfmI2c::new(BusId::Bus1),
)));

fn with_driver<R>(f: impl FnOnce(&mut BusDriver<EfmI2c>) -> R) -> R {
    DRIVER.lock(|driver| f(&mut driver.borrow_mut()))
}

pub fn configure(bus: BusId, settings: &BusSettings) {
    with_driver(|driver| driver.configure(bus, settings)).unwrap_or_else(|err| fault::halt(err));
    defmt::info!(
        "{} configured: {=u32} Hz, ratio {}",
        bus,
        settings.bus_freq_hz,
        settings.clock_ratio
    );
}

/// Starts `request`, spinning for as long as the previous transaction runs.
pub fn start(bus: BusId, request: &TransferRequest) {
    start_blocking(|| with_driver(|driver| driver.try_start(bus, &ENERGY, request)))
        .unwrap_or_else(|err| fault::halt(err));
}

/// Starts `request`, halting if the bus stays busy for `polls` attempts.
pub fn start_bounded(bus: BusId, request: &TransferRequest, polls: u32) {
    start_within(polls, || {
        with_driver(|driver| driver.try_start(bus, &ENERGY, request))
    })
    .unwrap_or_else(|err| fault::halt_start(err));
}

pub fn is_idle(bus: BusId) -> bool {
    with_driver(|driver| driver.is_idle(bus))
}

/// Spins until `bus` is idle and returns the word of its last transaction.
pub fn wait_result(bus: BusId) -> u32 {
    while !is_idle(bus) {
        core::hint::spin_loop();
    }
    with_driver(|driver| driver.last_result(bus)).unwrap_or_default()
}

/// Runs `request` to completion and returns its data word.
pub fn transfer(bus: BusId, request: &TransferRequest) -> u32 {
    start(bus, request);
    wait_result(bus)
}

pub fn last_result(bus: BusId) -> Option<u32> {
    with_driver(|driver| driver.last_result(bus))
}

pub fn forward_trace(forwarder: &mut TraceForwarder, bus: BusId) {
    with_driver(|driver| forwarder.forward(bus, driver.trace(bus)));
}

/// Controller interrupt body for `bus`.
pub fn service(bus: BusId) {
    let serviced: IrqFlags = with_driver(|driver| driver.on_interrupt(bus, &ENERGY, &EVENTS))
        .unwrap_or_else(|err| fault::halt(err));
    defmt::trace!("{} serviced {}", bus, serviced);
}
