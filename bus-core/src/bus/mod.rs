//! I2C master transaction types shared by firmware and host targets.
//!
//! A transaction always opens with a register-select write phase: START,
//! device address with the write bit, register byte. Reads then issue a
//! repeated START with the read bit and collect the payload, writes shift the
//! payload straight after the register byte. Everything in this module is
//! `no_std` friendly; register access lives behind [`BusHardware`].

use core::fmt;

use bitflags::bitflags;

use crate::energy::EnergyMode;
use crate::fault::Fault;
use crate::scheduler::CompletionToken;

pub mod hardware;
pub mod machine;
pub mod reset;
pub mod sim;

pub use hardware::BusHardware;
pub use machine::{BusMachine, Transaction};
pub use reset::reset_bus;

/// Largest payload a single transaction carries.
pub const MAX_TRANSFER_BYTES: u8 = 4;

/// First energy mode the controller cannot operate in.
pub const BUS_ENERGY_BLOCK: EnergyMode = EnergyMode::Em2;

/// Transfer direction, encoded as the R/W bit after the device address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Write,
    Read,
}

impl Direction {
    /// R/W bit value on the wire.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Direction::Write => 0,
            Direction::Read => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Write => f.write_str("write"),
            Direction::Read => f.write_str("read"),
        }
    }
}

/// Seven-bit device address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Validates a raw seven-bit address.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidAddress`] when `raw` needs more than seven bits.
    pub const fn new(raw: u8) -> Result<Self, Fault> {
        if raw > 0x7F {
            Err(Fault::InvalidAddress(raw))
        } else {
            Ok(Self(raw))
        }
    }

    /// Raw seven-bit value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Address byte sent after a (repeated) START.
    #[must_use]
    pub const fn address_byte(self, direction: Direction) -> u8 {
        (self.0 << 1) | direction.bit()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Protocol phase of an in-flight transaction.
///
/// Names follow the handler that consumes the next event: `WriteData` waits
/// for the register byte ACK of a read and `ReadData` shifts write payload.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolState {
    /// Address (write) sent, waiting for the device ACK.
    #[default]
    InitWrite,
    /// Register byte sent on a read, repeated START follows the ACK.
    WriteData,
    /// Read address sent, waiting for payload bytes.
    InitRead,
    /// Shifting write payload, one byte per ACK.
    ReadData,
    /// STOP requested, waiting for the controller to confirm it.
    ReceiveData,
    /// Reserved terminal state; never entered by a correct run.
    EndProcess,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProtocolState::InitWrite => "init-write",
            ProtocolState::WriteData => "write-data",
            ProtocolState::InitRead => "init-read",
            ProtocolState::ReadData => "read-data",
            ProtocolState::ReceiveData => "receive-data",
            ProtocolState::EndProcess => "end-process",
        };
        f.write_str(label)
    }
}

/// Hardware events the state machine reacts to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    Acknowledge,
    ReceiveDataValid,
    StopDetected,
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusEvent::Acknowledge => f.write_str("ACK"),
            BusEvent::ReceiveDataValid => f.write_str("RXDATAV"),
            BusEvent::StopDetected => f.write_str("MSTOP"),
        }
    }
}

bitflags! {
    /// Controller interrupt flags; bit positions follow the `I2Cn_IF` layout.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct IrqFlags: u32 {
        const START = 1 << 0;
        const RSTART = 1 << 1;
        const ADDR = 1 << 2;
        const TXC = 1 << 3;
        const TXBL = 1 << 4;
        const RXDATAV = 1 << 5;
        const ACK = 1 << 6;
        const NACK = 1 << 7;
        const MSTOP = 1 << 8;
        const ARBLOST = 1 << 9;
        const BUSERR = 1 << 10;
        const BUSHOLD = 1 << 11;
        const TXOF = 1 << 12;
        const RXUF = 1 << 13;
        const BITO = 1 << 14;
        const CLTO = 1 << 15;
        const SSTOP = 1 << 16;
        const RXFULL = 1 << 17;
        const CLERR = 1 << 18;

        /// The three events the transaction state machine consumes.
        const DRIVER_EVENTS = Self::ACK.bits() | Self::RXDATAV.bits() | Self::MSTOP.bits();
    }
}

impl IrqFlags {
    /// Driver events contained in `self`, in dispatch priority order.
    pub fn events(self) -> impl Iterator<Item = BusEvent> {
        [
            (IrqFlags::ACK, BusEvent::Acknowledge),
            (IrqFlags::RXDATAV, BusEvent::ReceiveDataValid),
            (IrqFlags::MSTOP, BusEvent::StopDetected),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, event)| event)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for IrqFlags {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        defmt::write!(fmt, "IrqFlags({=u32:#x})", self.bits());
    }
}

bitflags! {
    /// Controller commands; bit positions follow the `I2Cn_CMD` layout.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct BusCommand: u32 {
        const START = 1 << 0;
        const STOP = 1 << 1;
        const ACK = 1 << 2;
        const NACK = 1 << 3;
        const CONT = 1 << 4;
        const ABORT = 1 << 5;
        const CLEARTX = 1 << 6;
        const CLEARPC = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BusCommand {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        defmt::write!(fmt, "BusCommand({=u32:#x})", self.bits());
    }
}

/// Parameters of one register read or write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferRequest {
    pub address: DeviceAddress,
    pub direction: Direction,
    pub register: u8,
    /// Payload for writes; seed word for reads (bytes above `len` survive).
    pub data: u32,
    pub len: u8,
    pub token: CompletionToken,
}

impl TransferRequest {
    /// Reads `len` bytes starting at `register`.
    #[must_use]
    pub const fn read(
        address: DeviceAddress,
        register: u8,
        len: u8,
        token: CompletionToken,
    ) -> Self {
        Self {
            address,
            direction: Direction::Read,
            register,
            data: 0,
            len,
            token,
        }
    }

    /// Writes the low `len` bytes of `value` to `register`, most significant first.
    #[must_use]
    pub const fn write(
        address: DeviceAddress,
        register: u8,
        value: u32,
        len: u8,
        token: CompletionToken,
    ) -> Self {
        Self {
            address,
            direction: Direction::Write,
            register,
            data: value,
            len,
            token,
        }
    }

    /// Returns a copy whose read result is packed over `seed`.
    #[must_use]
    pub const fn with_seed(mut self, seed: u32) -> Self {
        self.data = seed;
        self
    }

    /// Checks the byte count against [`MAX_TRANSFER_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidLength`] for zero or oversized transfers.
    pub const fn validate(&self) -> Result<(), Fault> {
        if self.len == 0 || self.len > MAX_TRANSFER_BYTES {
            Err(Fault::InvalidLength(self.len))
        } else {
            Ok(())
        }
    }
}
