//! Simulated controller with one attached register-file device.
//!
//! [`SimBus`] reacts to commands and data writes the way the EFM32 controller
//! does at event granularity: address and data bytes raise ACK (or NACK when
//! nobody answers), received bytes raise RXDATAV, and STOP raises MSTOP. It
//! never fires interrupts on its own; callers drive the driver's interrupt
//! entry point while [`SimBus::pending`](BusHardware::pending) is non-empty.
//! Every wire-level action lands in an operation log for assertions.

use core::fmt;

use heapless::Vec;

use super::{BusCommand, BusHardware, IrqFlags};
use crate::config::BusSettings;

/// Operation log depth; oldest entries are kept and newer ones dropped once
/// full. Dropped entries are counted, see [`SimBus::dropped_ops`].
pub const SIM_LOG_CAPACITY: usize = 64;

/// Wire-level action observed by the simulated controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusOp {
    Start,
    RepeatedStart,
    /// Byte shifted out by the master (address or data).
    Tx(u8),
    /// Byte handed to the master through the receive buffer.
    Rx(u8),
    Ack,
    Nack,
    Stop,
    /// START and STOP issued in the same command write.
    StartStop,
    Abort,
    ClearTx,
}

impl fmt::Display for BusOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusOp::Start => f.write_str("START"),
            BusOp::RepeatedStart => f.write_str("RSTART"),
            BusOp::Tx(byte) => write!(f, "TX {byte:#04x}"),
            BusOp::Rx(byte) => write!(f, "RX {byte:#04x}"),
            BusOp::Ack => f.write_str("ACK"),
            BusOp::Nack => f.write_str("NACK"),
            BusOp::Stop => f.write_str("STOP"),
            BusOp::StartStop => f.write_str("START|STOP"),
            BusOp::Abort => f.write_str("ABORT"),
            BusOp::ClearTx => f.write_str("CLEARTX"),
        }
    }
}

/// Register-file slave with an auto-incrementing register pointer.
#[derive(Clone, Debug)]
pub struct SimDevice {
    address: u8,
    registers: [u8; 256],
    pointer: u8,
}

impl SimDevice {
    /// Creates a device answering at the seven-bit `address`, all registers zero.
    #[must_use]
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            registers: [0; 256],
            pointer: 0,
        }
    }

    /// Seven-bit address the device answers to.
    #[must_use]
    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Reads a register without going through the bus.
    #[must_use]
    pub fn register(&self, register: u8) -> u8 {
        self.registers[usize::from(register)]
    }

    /// Writes a register without going through the bus.
    pub fn set_register(&mut self, register: u8, value: u8) {
        self.registers[usize::from(register)] = value;
    }

    fn next_outbound(&mut self) -> u8 {
        let value = self.registers[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        value
    }

    fn accept(&mut self, byte: u8) {
        self.registers[usize::from(self.pointer)] = byte;
        self.pointer = self.pointer.wrapping_add(1);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    /// START issued, next transmit byte is an address.
    Addressing { repeated: bool },
    /// Addressed for write; `selected` once the register byte arrived.
    Transmitting { selected: bool },
    /// Addressed for read; the receive buffer holds `pending`.
    Receiving { pending: u8 },
    /// Nobody answered; only STOP or ABORT get the controller out.
    Stalled,
}

/// Event-level model of one controller plus its attached device.
#[derive(Clone, Debug)]
pub struct SimBus {
    device: SimDevice,
    phase: Phase,
    flags: IrqFlags,
    enabled: IrqFlags,
    clock_enabled: bool,
    unmasked: bool,
    settings: Option<BusSettings>,
    log: Vec<BusOp, SIM_LOG_CAPACITY>,
    dropped: usize,
}

impl SimBus {
    /// Creates an idle controller wired to `device`.
    #[must_use]
    pub const fn new(device: SimDevice) -> Self {
        Self {
            device,
            phase: Phase::Idle,
            flags: IrqFlags::empty(),
            enabled: IrqFlags::empty(),
            clock_enabled: false,
            unmasked: false,
            settings: None,
            log: Vec::new(),
            dropped: 0,
        }
    }

    /// Attached device.
    #[must_use]
    pub const fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Attached device, mutably.
    pub fn device_mut(&mut self) -> &mut SimDevice {
        &mut self.device
    }

    /// Wire-level operations observed so far.
    #[must_use]
    pub fn ops(&self) -> &[BusOp] {
        &self.log
    }

    /// Operations that did not fit in the log since the last clear.
    #[must_use]
    pub const fn dropped_ops(&self) -> usize {
        self.dropped
    }

    /// Forgets the recorded operations.
    pub fn clear_ops(&mut self) {
        self.log.clear();
        self.dropped = 0;
    }

    /// Settings last applied by `configure`.
    #[must_use]
    pub const fn settings(&self) -> Option<&BusSettings> {
        self.settings.as_ref()
    }

    /// Returns `true` once the peripheral clock was enabled.
    #[must_use]
    pub const fn clock_enabled(&self) -> bool {
        self.clock_enabled
    }

    /// Returns `true` once the interrupt line was unmasked.
    #[must_use]
    pub const fn interrupt_unmasked(&self) -> bool {
        self.unmasked
    }

    /// Forces the controller out of IDLE, as if another master held the bus.
    pub fn hold_bus(&mut self) {
        self.phase = Phase::Stalled;
    }

    fn push(&mut self, op: BusOp) {
        if self.log.push(op).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    fn raise(&mut self, flags: IrqFlags) {
        self.flags |= flags;
    }

    fn address_byte(&mut self, byte: u8) {
        if byte >> 1 != self.device.address() {
            self.raise(IrqFlags::NACK);
            self.phase = Phase::Stalled;
            return;
        }

        self.raise(IrqFlags::ACK);
        if byte & 1 == 1 {
            let pending = self.device.next_outbound();
            self.phase = Phase::Receiving { pending };
            self.raise(IrqFlags::RXDATAV);
        } else {
            self.phase = Phase::Transmitting { selected: false };
        }
    }

    fn stop(&mut self) {
        self.push(BusOp::Stop);
        self.phase = Phase::Idle;
        self.raise(IrqFlags::MSTOP);
    }
}

impl BusHardware for SimBus {
    fn enable_clock(&mut self) {
        self.clock_enabled = true;
    }

    fn apply_settings(&mut self, settings: &BusSettings) {
        self.settings = Some(*settings);
    }

    fn command(&mut self, command: BusCommand) {
        if command.contains(BusCommand::ABORT) {
            self.push(BusOp::Abort);
            self.phase = Phase::Idle;
        }
        if command.contains(BusCommand::CLEARTX) {
            self.push(BusOp::ClearTx);
        }
        if command.contains(BusCommand::START | BusCommand::STOP) {
            self.push(BusOp::StartStop);
            self.phase = Phase::Idle;
            self.raise(IrqFlags::MSTOP);
            return;
        }
        if command.contains(BusCommand::ACK) {
            self.push(BusOp::Ack);
            if let Phase::Receiving { .. } = self.phase {
                let pending = self.device.next_outbound();
                self.phase = Phase::Receiving { pending };
                self.raise(IrqFlags::RXDATAV);
            }
        }
        if command.contains(BusCommand::NACK) {
            self.push(BusOp::Nack);
        }
        if command.contains(BusCommand::START) {
            let repeated = self.phase != Phase::Idle;
            self.push(if repeated {
                BusOp::RepeatedStart
            } else {
                BusOp::Start
            });
            self.phase = Phase::Addressing { repeated };
        }
        if command.contains(BusCommand::STOP) {
            self.stop();
        }
    }

    fn write_data(&mut self, byte: u8) {
        self.push(BusOp::Tx(byte));
        match self.phase {
            Phase::Addressing { .. } => self.address_byte(byte),
            Phase::Transmitting { selected: false } => {
                self.device.pointer = byte;
                self.phase = Phase::Transmitting { selected: true };
                self.raise(IrqFlags::ACK);
            }
            Phase::Transmitting { selected: true } => {
                self.device.accept(byte);
                self.raise(IrqFlags::ACK);
            }
            Phase::Idle | Phase::Receiving { .. } | Phase::Stalled => {
                self.raise(IrqFlags::TXOF);
            }
        }
    }

    fn read_data(&mut self) -> u8 {
        self.flags.remove(IrqFlags::RXDATAV);
        match self.phase {
            Phase::Receiving { pending } => {
                self.push(BusOp::Rx(pending));
                pending
            }
            _ => {
                self.raise(IrqFlags::RXUF);
                0
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    fn flags(&self) -> IrqFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: IrqFlags) {
        self.flags |= flags;
    }

    fn clear_flags(&mut self, flags: IrqFlags) {
        self.flags.remove(flags);
    }

    fn enabled(&self) -> IrqFlags {
        self.enabled
    }

    fn set_enabled(&mut self, flags: IrqFlags) {
        self.enabled = flags;
    }

    fn unmask_interrupt(&mut self) {
        self.unmasked = true;
    }
}
