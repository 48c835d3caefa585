#![no_std]

// Shared logic for the interrupt-driven I2C master driver.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and keeping register access behind the `BusHardware`
// trait, so the same state machine runs on the EFM32 target and in host tests.

pub mod bus;
pub mod config;
pub mod driver;
pub mod energy;
pub mod fault;
pub mod scheduler;
pub mod trace;

pub use bus::{BusEvent, Direction, ProtocolState, TransferRequest};
pub use driver::{BUS_COUNT, BusDriver, BusId, StartError, start_blocking, start_within};
pub use energy::{EnergyArbiter, EnergyMode};
pub use fault::Fault;
pub use scheduler::{CompletionSink, CompletionToken, EventFlags};
