//! Driver façade over the bus controllers of one chip.
//!
//! [`BusDriver`] owns a [`BusHardware`] binding and a [`BusMachine`] per
//! controller instance and exposes the four operations the rest of the system
//! uses: configure a bus, start a transaction, poll for idle, and service the
//! controller interrupt. Callers share one driver between thread and
//! interrupt context behind a critical-section mutex.

use core::{fmt, hint};

use crate::bus::{BusHardware, BusMachine, IrqFlags, ProtocolState, TransferRequest, reset_bus};
use crate::config::BusSettings;
use crate::energy::EnergyArbiter;
use crate::fault::Fault;
use crate::scheduler::CompletionSink;
use crate::trace::{BusTrace, TraceEvent};

/// Number of controller instances on the chip.
pub const BUS_COUNT: usize = 2;

/// Controller instance selector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusId {
    Bus0,
    Bus1,
}

impl BusId {
    /// Deterministic index for lookups into per-bus tables.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            BusId::Bus0 => 0,
            BusId::Bus1 => 1,
        }
    }

    /// Resolves a raw instance number.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnknownBus`] for anything but `0` or `1`.
    pub const fn from_index(index: u8) -> Result<Self, Fault> {
        match index {
            0 => Ok(BusId::Bus0),
            1 => Ok(BusId::Bus1),
            other => Err(Fault::UnknownBus(other)),
        }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusId::Bus0 => f.write_str("I2C0"),
            BusId::Bus1 => f.write_str("I2C1"),
        }
    }
}

/// Outcome of a bounded start attempt that did not start a transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// The bus stayed busy for every poll; nothing was started.
    TimedOut,
    Fault(Fault),
}

impl From<Fault> for StartError {
    fn from(fault: Fault) -> Self {
        StartError::Fault(fault)
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::TimedOut => f.write_str("bus stayed busy"),
            StartError::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

/// Retries `attempt` until it stops reporting `WouldBlock`.
///
/// `attempt` is normally a closure that locks the shared driver and calls
/// [`BusDriver::try_start`]; the lock must be released between polls so the
/// completion interrupt can run. There is no upper bound on the wait.
///
/// # Errors
///
/// Returns the first fault `attempt` reports.
pub fn start_blocking<F>(mut attempt: F) -> Result<(), Fault>
where
    F: FnMut() -> nb::Result<(), Fault>,
{
    loop {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(nb::Error::WouldBlock) => hint::spin_loop(),
            Err(nb::Error::Other(fault)) => return Err(fault),
        }
    }
}

/// Like [`start_blocking`], but gives up after `polls` busy answers.
///
/// # Errors
///
/// Returns [`StartError::TimedOut`] when every poll saw a busy bus, or the
/// first fault `attempt` reports.
pub fn start_within<F>(polls: u32, mut attempt: F) -> Result<(), StartError>
where
    F: FnMut() -> nb::Result<(), Fault>,
{
    for _ in 0..polls {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(nb::Error::WouldBlock) => hint::spin_loop(),
            Err(nb::Error::Other(fault)) => return Err(StartError::Fault(fault)),
        }
    }
    Err(StartError::TimedOut)
}

struct BusInstance<H> {
    hw: H,
    machine: BusMachine,
    configured: bool,
}

impl<H> BusInstance<H> {
    const fn new(bus: BusId, hw: H) -> Self {
        Self {
            hw,
            machine: BusMachine::new(bus),
            configured: false,
        }
    }
}

/// Interrupt-driven I2C master driver for every controller instance.
pub struct BusDriver<H> {
    buses: [BusInstance<H>; BUS_COUNT],
}

impl<H: BusHardware> BusDriver<H> {
    /// Wraps the two controller bindings; neither bus is configured yet.
    #[must_use]
    pub const fn new(bus0: H, bus1: H) -> Self {
        Self {
            buses: [
                BusInstance::new(BusId::Bus0, bus0),
                BusInstance::new(BusId::Bus1, bus1),
            ],
        }
    }

    fn instance(&self, bus: BusId) -> &BusInstance<H> {
        &self.buses[bus.as_index()]
    }

    fn instance_mut(&mut self, bus: BusId) -> &mut BusInstance<H> {
        &mut self.buses[bus.as_index()]
    }

    /// Brings `bus` up as a master with `settings` and leaves it idle.
    ///
    /// Enables the peripheral clock, checks that the controller's interrupt
    /// flags respond to software writes, programs timing and routing, enables
    /// the requested interrupts and finishes with a bus reset.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::SlaveModeUnsupported`] for a non-master role,
    /// [`Fault::TransactionInFlight`] when the bus is mid-transaction, or
    /// [`Fault::ControlFlagStuck`] when the START flag does not follow
    /// software set/clear.
    pub fn configure(&mut self, bus: BusId, settings: &BusSettings) -> Result<(), Fault> {
        if !settings.master {
            return Err(Fault::SlaveModeUnsupported);
        }
        let instance = self.instance_mut(bus);
        if !instance.machine.is_idle() {
            return Err(Fault::TransactionInFlight(bus));
        }

        let hw = &mut instance.hw;
        hw.enable_clock();
        if !hw.flags().contains(IrqFlags::START) {
            hw.set_flags(IrqFlags::START);
            if !hw.flags().contains(IrqFlags::START) {
                return Err(Fault::ControlFlagStuck(bus));
            }
        }
        hw.clear_flags(IrqFlags::START);
        if hw.flags().contains(IrqFlags::START) {
            return Err(Fault::ControlFlagStuck(bus));
        }

        hw.apply_settings(settings);
        let enables = hw.enabled() | settings.interrupts.flags();
        hw.set_enabled(enables);
        hw.unmask_interrupt();

        reset_bus(hw);
        instance.machine.clear();
        instance.machine.trace_mut().record(TraceEvent::Reset);
        instance.configured = true;
        Ok(())
    }

    /// Starts `request` on `bus` if the bus is free.
    ///
    /// `WouldBlock` means the previous transaction on `bus` has not completed;
    /// the caller retries after servicing interrupts.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::BusNotConfigured`] before [`configure`](Self::configure)
    /// succeeded, plus any fault from [`BusMachine::begin`].
    pub fn try_start(
        &mut self,
        bus: BusId,
        energy: &EnergyArbiter,
        request: &TransferRequest,
    ) -> nb::Result<(), Fault> {
        let instance = self.instance_mut(bus);
        if !instance.configured {
            return Err(nb::Error::Other(Fault::BusNotConfigured(bus)));
        }
        instance.machine.begin(&mut instance.hw, energy, request)
    }

    /// Services the controller interrupt for `bus`.
    ///
    /// Snapshots the flags that are both raised and enabled, clears them, then
    /// dispatches acknowledge, receive and stop in that order. Returns the
    /// serviced flags.
    ///
    /// # Errors
    ///
    /// Returns the first fault raised by the state machine; remaining events of
    /// the snapshot are not dispatched.
    pub fn on_interrupt<S: CompletionSink + ?Sized>(
        &mut self,
        bus: BusId,
        energy: &EnergyArbiter,
        sink: &S,
    ) -> Result<IrqFlags, Fault> {
        let instance = self.instance_mut(bus);
        let pending = instance.hw.pending();
        instance.hw.clear_flags(pending);

        for event in pending.events() {
            instance
                .machine
                .handle(event, &mut instance.hw, energy, sink)?;
        }
        Ok(pending)
    }

    /// Resets `bus` outside of configuration, e.g. after a slave wedged SDA.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::BusNotConfigured`] before configuration and
    /// [`Fault::TransactionInFlight`] while a transaction owns the bus.
    pub fn recover(&mut self, bus: BusId) -> Result<(), Fault> {
        let instance = self.instance_mut(bus);
        if !instance.configured {
            return Err(Fault::BusNotConfigured(bus));
        }
        if !instance.machine.is_idle() {
            return Err(Fault::TransactionInFlight(bus));
        }
        reset_bus(&mut instance.hw);
        instance.machine.trace_mut().record(TraceEvent::Reset);
        Ok(())
    }

    /// Returns `true` when `bus` can accept a new transaction.
    #[must_use]
    pub fn is_idle(&self, bus: BusId) -> bool {
        self.instance(bus).machine.is_idle()
    }

    /// Returns `true` once `bus` has been configured.
    #[must_use]
    pub fn is_configured(&self, bus: BusId) -> bool {
        self.instance(bus).configured
    }

    /// Protocol state of `bus`.
    #[must_use]
    pub fn state(&self, bus: BusId) -> ProtocolState {
        self.instance(bus).machine.state()
    }

    /// Data word of the most recent transaction completed on `bus`.
    #[must_use]
    pub fn last_result(&self, bus: BusId) -> Option<u32> {
        self.instance(bus).machine.last_result()
    }

    /// Protocol trace of `bus`.
    #[must_use]
    pub fn trace(&self, bus: BusId) -> &BusTrace {
        self.instance(bus).machine.trace()
    }

    /// State machine of `bus`.
    #[must_use]
    pub fn machine(&self, bus: BusId) -> &BusMachine {
        &self.instance(bus).machine
    }

    /// Controller binding of `bus`.
    #[must_use]
    pub fn hardware(&self, bus: BusId) -> &H {
        &self.instance(bus).hw
    }

    /// Controller binding of `bus`, mutably.
    pub fn hardware_mut(&mut self, bus: BusId) -> &mut H {
        &mut self.instance_mut(bus).hw
    }
}
