//! Contract violations surfaced by the bus driver and the energy arbiter.
//!
//! Every variant describes a broken invariant rather than a recoverable
//! condition: firmware halts on the first one it sees, host tooling reports
//! it and leaves the affected bus parked.

use core::fmt;

use crate::bus::{BusEvent, ProtocolState};
use crate::driver::BusId;
use crate::energy::EnergyMode;

/// Fatal driver error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A hardware event arrived in a protocol state that cannot handle it.
    UnexpectedEvent {
        event: BusEvent,
        state: ProtocolState,
    },
    /// Bus index outside the supported instance table.
    UnknownBus(u8),
    /// Transaction requested before the bus was configured.
    BusNotConfigured(BusId),
    /// Controller reported activity when a new transaction was about to start.
    BusNotIdle(BusId),
    /// Recovery requested while a transaction is still in flight.
    TransactionInFlight(BusId),
    /// Byte count outside `1..=MAX_TRANSFER_BYTES`.
    InvalidLength(u8),
    /// Device address does not fit in seven bits.
    InvalidAddress(u8),
    /// Only the master role is implemented.
    SlaveModeUnsupported,
    /// The START interrupt flag could not be set and cleared during configure.
    ControlFlagStuck(BusId),
    /// Blocker count for the mode would exceed the configured ceiling.
    EnergyOverflow(EnergyMode),
    /// Release without a matching block.
    EnergyUnderflow(EnergyMode),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnexpectedEvent { event, state } => {
                write!(f, "unexpected {event} in state {state}")
            }
            Fault::UnknownBus(index) => write!(f, "unknown bus index {index}"),
            Fault::BusNotConfigured(bus) => write!(f, "{bus} has not been configured"),
            Fault::BusNotIdle(bus) => write!(f, "{bus} controller is not idle"),
            Fault::TransactionInFlight(bus) => {
                write!(f, "{bus} has a transaction in flight")
            }
            Fault::InvalidLength(len) => write!(f, "invalid transfer length {len}"),
            Fault::InvalidAddress(address) => {
                write!(f, "device address {address:#04x} exceeds 7 bits")
            }
            Fault::SlaveModeUnsupported => f.write_str("slave mode is not supported"),
            Fault::ControlFlagStuck(bus) => write!(f, "{bus} control-flow flag stuck"),
            Fault::EnergyOverflow(mode) => write!(f, "too many blockers on {mode}"),
            Fault::EnergyUnderflow(mode) => write!(f, "unbalanced release of {mode}"),
        }
    }
}
