//! Completion notifications.
//!
//! A finished transaction posts its [`CompletionToken`] to a
//! [`CompletionSink`]. The stock sink is [`EventFlags`], an atomic bitmask the
//! foreground loop drains; each token is an event bit (or a set of bits) owned
//! by whichever higher-level driver started the transaction.

use core::fmt;

use portable_atomic::{AtomicU32, Ordering};

/// Opaque value handed back untouched when a transaction completes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionToken(u32);

impl CompletionToken {
    /// Token that schedules nothing.
    pub const NONE: Self = Self(0);

    /// Wraps raw event bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw event bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Receiver for completion tokens, called from interrupt context.
pub trait CompletionSink {
    /// Posts `token`. Must not block.
    fn notify(&self, token: CompletionToken);
}

/// Event bitmask shared between interrupt handlers and the main loop.
pub struct EventFlags {
    bits: AtomicU32,
}

impl EventFlags {
    /// Creates an empty event set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Clears every pending event.
    pub fn reset(&self) {
        self.bits.store(0, Ordering::SeqCst);
    }

    /// Marks `events` as pending.
    pub fn post(&self, events: u32) {
        self.bits.fetch_or(events, Ordering::SeqCst);
    }

    /// Clears `events` without touching the others.
    pub fn remove(&self, events: u32) {
        self.bits.fetch_and(!events, Ordering::SeqCst);
    }

    /// Snapshot of the pending events.
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.bits.load(Ordering::SeqCst)
    }

    /// Returns `true` when no event is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Atomically drains every pending event.
    #[must_use]
    pub fn take(&self) -> u32 {
        self.bits.swap(0, Ordering::SeqCst)
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSink for EventFlags {
    fn notify(&self, token: CompletionToken) {
        self.post(token.bits());
    }
}
