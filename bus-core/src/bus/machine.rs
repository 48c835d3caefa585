//! Transaction state machine driven by controller interrupts.
//!
//! Foreground code only touches a [`BusMachine`] through [`BusMachine::begin`],
//! and only while it is idle. From the START command onwards the three event
//! handlers own it until the stop event hands it back.

use super::{
    BUS_ENERGY_BLOCK, BusCommand, BusEvent, BusHardware, DeviceAddress, Direction, ProtocolState,
    TransferRequest,
};
use crate::driver::BusId;
use crate::energy::EnergyArbiter;
use crate::fault::Fault;
use crate::scheduler::{CompletionSink, CompletionToken};
use crate::trace::{BusTrace, TraceEvent};

/// Parameters and progress of the in-flight transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transaction {
    pub direction: Direction,
    pub address: DeviceAddress,
    pub register: u8,
    /// Payload word; bytes are positioned by their remaining count.
    pub data: u32,
    pub len: u8,
    pub remaining: u8,
    pub token: CompletionToken,
}

impl Transaction {
    fn from_request(request: &TransferRequest) -> Self {
        Self {
            direction: request.direction,
            address: request.address,
            register: request.register,
            data: request.data,
            len: request.len,
            remaining: request.len,
            token: request.token,
        }
    }

    /// Counts one byte off, returning the shift of the byte it frees up.
    fn next_shift(&mut self) -> Option<u32> {
        self.remaining = self.remaining.checked_sub(1)?;
        Some(8 * u32::from(self.remaining))
    }

    fn outbound_byte(&self, shift: u32) -> u8 {
        (self.data >> shift).to_le_bytes()[0]
    }

    fn store_inbound(&mut self, shift: u32, byte: u8) {
        self.data &= !(0xFF << shift);
        self.data |= u32::from(byte) << shift;
    }
}

/// Per-bus protocol state.
pub struct BusMachine {
    bus: BusId,
    state: ProtocolState,
    active: Option<Transaction>,
    last_result: Option<u32>,
    trace: BusTrace,
}

impl BusMachine {
    /// Creates an idle machine for `bus`.
    #[must_use]
    pub const fn new(bus: BusId) -> Self {
        Self {
            bus,
            state: ProtocolState::InitWrite,
            active: None,
            last_result: None,
            trace: BusTrace::new(),
        }
    }

    /// Returns `true` when a new transaction may start.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ProtocolState {
        self.state
    }

    /// The in-flight transaction, if any.
    #[must_use]
    pub const fn active(&self) -> Option<&Transaction> {
        self.active.as_ref()
    }

    /// Data word of the most recently completed transaction.
    #[must_use]
    pub const fn last_result(&self) -> Option<u32> {
        self.last_result
    }

    /// Protocol trace for this bus.
    #[must_use]
    pub const fn trace(&self) -> &BusTrace {
        &self.trace
    }

    pub(crate) fn trace_mut(&mut self) -> &mut BusTrace {
        &mut self.trace
    }

    /// Drops any transaction state; used when the bus is (re)configured.
    pub(crate) fn clear(&mut self) {
        self.state = ProtocolState::InitWrite;
        self.active = None;
    }

    /// Seeds a transaction and issues the START condition.
    ///
    /// Returns `WouldBlock` while the previous transaction is still in flight;
    /// nothing is touched in that case.
    ///
    /// # Errors
    ///
    /// Fails with [`Fault::InvalidLength`] for a bad byte count,
    /// [`Fault::BusNotIdle`] when the controller is busy on the wire, or an
    /// energy fault when the bus blocker cannot be taken.
    pub fn begin<H: BusHardware>(
        &mut self,
        hw: &mut H,
        energy: &EnergyArbiter,
        request: &TransferRequest,
    ) -> nb::Result<(), Fault> {
        if !self.is_idle() {
            return Err(nb::Error::WouldBlock);
        }
        request.validate()?;
        if !hw.is_idle() {
            return Err(nb::Error::Other(Fault::BusNotIdle(self.bus)));
        }

        energy.block(BUS_ENERGY_BLOCK)?;

        let transaction = Transaction::from_request(request);
        self.active = Some(transaction);
        self.state = ProtocolState::InitWrite;
        self.trace.record(TraceEvent::Started {
            address: transaction.address,
            direction: transaction.direction,
            register: transaction.register,
            len: transaction.len,
        });

        hw.command(BusCommand::START);
        hw.write_data(transaction.address.address_byte(Direction::Write));
        Ok(())
    }

    /// Dispatches one hardware event to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedEvent`] when the event is illegal in the
    /// current state, or an energy fault from the release on completion.
    pub fn handle<H: BusHardware, S: CompletionSink + ?Sized>(
        &mut self,
        event: BusEvent,
        hw: &mut H,
        energy: &EnergyArbiter,
        sink: &S,
    ) -> Result<(), Fault> {
        match event {
            BusEvent::Acknowledge => self.on_acknowledge(hw),
            BusEvent::ReceiveDataValid => self.on_receive(hw),
            BusEvent::StopDetected => self.on_stop(energy, sink),
        }
    }

    /// The addressed device accepted the last byte.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedEvent`] outside the write phases.
    pub fn on_acknowledge<H: BusHardware>(&mut self, hw: &mut H) -> Result<(), Fault> {
        let unexpected = self.unexpected(BusEvent::Acknowledge);
        let transaction = self.active.as_mut().ok_or(unexpected)?;

        match self.state {
            ProtocolState::InitWrite => {
                hw.write_data(transaction.register);
                self.trace
                    .record(TraceEvent::RegisterSelected(transaction.register));
                self.state = match transaction.direction {
                    Direction::Read => ProtocolState::WriteData,
                    Direction::Write => ProtocolState::ReadData,
                };
            }
            ProtocolState::WriteData => {
                hw.command(BusCommand::START);
                hw.write_data(transaction.address.address_byte(Direction::Read));
                self.trace.record(TraceEvent::RepeatedStart);
                self.state = ProtocolState::InitRead;
            }
            ProtocolState::InitRead => {}
            ProtocolState::ReadData => {
                let shift = transaction.next_shift().ok_or(unexpected)?;
                let byte = transaction.outbound_byte(shift);
                hw.write_data(byte);
                self.trace.record(TraceEvent::ByteSent(byte));
                if transaction.remaining == 0 {
                    hw.command(BusCommand::STOP);
                    self.trace.record(TraceEvent::StopRequested);
                    self.state = ProtocolState::ReceiveData;
                }
            }
            // The final written byte is acknowledged after STOP was queued.
            ProtocolState::ReceiveData if transaction.direction == Direction::Write => {}
            ProtocolState::ReceiveData | ProtocolState::EndProcess => return Err(unexpected),
        }
        Ok(())
    }

    /// A received byte is waiting in the controller.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedEvent`] outside [`ProtocolState::InitRead`].
    pub fn on_receive<H: BusHardware>(&mut self, hw: &mut H) -> Result<(), Fault> {
        let unexpected = self.unexpected(BusEvent::ReceiveDataValid);
        if self.state != ProtocolState::InitRead {
            return Err(unexpected);
        }
        let transaction = self.active.as_mut().ok_or(unexpected)?;
        let shift = transaction.next_shift().ok_or(unexpected)?;

        let byte = hw.read_data();
        transaction.store_inbound(shift, byte);
        self.trace.record(TraceEvent::ByteReceived(byte));

        if transaction.remaining > 0 {
            hw.command(BusCommand::ACK);
        } else {
            hw.command(BusCommand::NACK);
            hw.command(BusCommand::STOP);
            self.trace.record(TraceEvent::StopRequested);
            self.state = ProtocolState::ReceiveData;
        }
        Ok(())
    }

    /// The controller finished sending STOP.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedEvent`] unless a STOP was requested, or
    /// [`Fault::EnergyUnderflow`] when the bus blocker is already gone.
    pub fn on_stop<S: CompletionSink + ?Sized>(
        &mut self,
        energy: &EnergyArbiter,
        sink: &S,
    ) -> Result<(), Fault> {
        let unexpected = self.unexpected(BusEvent::StopDetected);
        if !matches!(
            self.state,
            ProtocolState::ReadData | ProtocolState::ReceiveData
        ) {
            return Err(unexpected);
        }
        let transaction = self.active.ok_or(unexpected)?;

        energy.unblock(BUS_ENERGY_BLOCK)?;
        self.active = None;
        self.state = ProtocolState::InitWrite;
        self.last_result = Some(transaction.data);
        self.trace.record(TraceEvent::Completed {
            token: transaction.token,
            data: transaction.data,
        });
        sink.notify(transaction.token);
        Ok(())
    }

    const fn unexpected(&self, event: BusEvent) -> Fault {
        Fault::UnexpectedEvent {
            event,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::sim::{SimBus, SimDevice};

    #[test]
    fn acknowledge_after_the_transaction_ended_is_fatal() {
        let mut hw = SimBus::new(SimDevice::new(0x55));
        let mut machine = BusMachine::new(BusId::Bus0);
        let address = DeviceAddress::new(0x55).unwrap();
        let request = TransferRequest::read(address, 0x13, 1, CompletionToken::NONE);
        machine.active = Some(Transaction::from_request(&request));
        machine.state = ProtocolState::EndProcess;

        assert_eq!(
            machine.on_acknowledge(&mut hw),
            Err(Fault::UnexpectedEvent {
                event: BusEvent::Acknowledge,
                state: ProtocolState::EndProcess,
            })
        );
        assert!(hw.ops().is_empty());
    }
}
