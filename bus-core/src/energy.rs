//! Energy-mode arbitration.
//!
//! Peripherals that cannot survive a given sleep depth register a blocker on
//! the first mode they cannot operate in. The arbiter keeps one counter per
//! mode and reports the shallowest blocked mode; the idle loop uses that to
//! pick how deep the core may sleep.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

use crate::fault::Fault;

/// Number of energy modes tracked by the arbiter.
pub const ENERGY_MODE_COUNT: usize = 5;

/// Maximum number of concurrent blockers per mode.
pub const MAX_BLOCKERS: u8 = 4;

/// Processor energy modes, shallowest first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnergyMode {
    /// Running.
    Em0,
    /// Sleep: core clock gated, high-frequency peripherals alive.
    Em1,
    /// Deep sleep: low-frequency peripherals alive.
    Em2,
    /// Stop: only asynchronous and ultra-low-frequency sources alive.
    Em3,
    /// Shutoff.
    Em4,
}

/// Every energy mode in rank order.
pub const ALL_ENERGY_MODES: [EnergyMode; ENERGY_MODE_COUNT] = [
    EnergyMode::Em0,
    EnergyMode::Em1,
    EnergyMode::Em2,
    EnergyMode::Em3,
    EnergyMode::Em4,
];

impl EnergyMode {
    /// Deterministic index for lookups into the counter table.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            EnergyMode::Em0 => 0,
            EnergyMode::Em1 => 1,
            EnergyMode::Em2 => 2,
            EnergyMode::Em3 => 3,
            EnergyMode::Em4 => 4,
        }
    }

    /// Attempts to construct an [`EnergyMode`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(EnergyMode::Em0),
            1 => Some(EnergyMode::Em1),
            2 => Some(EnergyMode::Em2),
            3 => Some(EnergyMode::Em3),
            4 => Some(EnergyMode::Em4),
            _ => None,
        }
    }

    /// Deepest mode the arbiter knows about.
    #[must_use]
    pub const fn deepest() -> Self {
        EnergyMode::Em4
    }
}

impl fmt::Display for EnergyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EM{}", self.as_index())
    }
}

/// Hardware hook that actually puts the core to sleep.
pub trait SleepController {
    /// Enters `mode` and returns once an interrupt wakes the core.
    fn enter(&mut self, mode: EnergyMode);
}

/// Reference-counted table of sleep blockers.
///
/// All methods take `&self` so a single instance can live in a `static` and
/// be shared between foreground code and interrupt handlers; each mutation
/// runs inside a critical section.
pub struct EnergyArbiter {
    counts: Mutex<Cell<[u8; ENERGY_MODE_COUNT]>>,
}

impl EnergyArbiter {
    /// Creates an arbiter with every counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: Mutex::new(Cell::new([0; ENERGY_MODE_COUNT])),
        }
    }

    /// Clears every blocker.
    pub fn reset(&self) {
        critical_section::with(|cs| self.counts.borrow(cs).set([0; ENERGY_MODE_COUNT]));
    }

    /// Forbids the core from entering `mode` or anything deeper.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::EnergyOverflow`] when `mode` already has
    /// [`MAX_BLOCKERS`] blockers; the table is left untouched.
    pub fn block(&self, mode: EnergyMode) -> Result<(), Fault> {
        critical_section::with(|cs| {
            let cell = self.counts.borrow(cs);
            let mut counts = cell.get();
            let slot = &mut counts[mode.as_index()];
            if *slot >= MAX_BLOCKERS {
                return Err(Fault::EnergyOverflow(mode));
            }
            *slot += 1;
            cell.set(counts);
            Ok(())
        })
    }

    /// Drops one blocker previously registered with [`block`](Self::block).
    ///
    /// # Errors
    ///
    /// Returns [`Fault::EnergyUnderflow`] when `mode` has no blockers.
    pub fn unblock(&self, mode: EnergyMode) -> Result<(), Fault> {
        critical_section::with(|cs| {
            let cell = self.counts.borrow(cs);
            let mut counts = cell.get();
            let slot = &mut counts[mode.as_index()];
            *slot = slot.checked_sub(1).ok_or(Fault::EnergyUnderflow(mode))?;
            cell.set(counts);
            Ok(())
        })
    }

    /// Number of active blockers on `mode`.
    #[must_use]
    pub fn blockers(&self, mode: EnergyMode) -> u8 {
        critical_section::with(|cs| self.counts.borrow(cs).get()[mode.as_index()])
    }

    /// Shallowest mode with a blocker, or [`EnergyMode::deepest`] when none.
    #[must_use]
    pub fn lowest_blocked(&self) -> EnergyMode {
        let counts = critical_section::with(|cs| self.counts.borrow(cs).get());
        ALL_ENERGY_MODES
            .into_iter()
            .find(|mode| counts[mode.as_index()] != 0)
            .unwrap_or(EnergyMode::deepest())
    }

    /// Mode the idle loop may enter, or `None` when the core has to stay awake.
    #[must_use]
    pub fn sleep_target(&self) -> Option<EnergyMode> {
        match self.lowest_blocked() {
            EnergyMode::Em0 | EnergyMode::Em1 => None,
            EnergyMode::Em2 => Some(EnergyMode::Em1),
            EnergyMode::Em3 => Some(EnergyMode::Em2),
            EnergyMode::Em4 => Some(EnergyMode::Em3),
        }
    }

    /// Sleeps as deep as the current blockers allow.
    ///
    /// The decision and the sleep entry happen inside one critical section so
    /// a blocker registered by an interrupt cannot slip in between them; the
    /// wake-up interrupt is serviced once the section is released.
    pub fn enter_sleep<S: SleepController>(&self, controller: &mut S) -> Option<EnergyMode> {
        critical_section::with(|_| {
            let target = self.sleep_target();
            if let Some(mode) = target {
                controller.enter(mode);
            }
            target
        })
    }
}

impl Default for EnergyArbiter {
    fn default() -> Self {
        Self::new()
    }
}
