//! Per-bus protocol trace.
//!
//! Every step the state machine takes is appended to a fixed-capacity ring so
//! the last few transactions can be inspected after the fact: the emulator
//! prints it, the firmware forwards the newest record to defmt.

use core::fmt;

use heapless::HistoryBuf;

use crate::bus::{DeviceAddress, Direction};
use crate::scheduler::CompletionToken;

/// Number of trace records retained per bus.
pub const TRACE_CAPACITY: usize = 32;

/// Identifier attached to each trace record.
pub type TraceSeq = u32;

/// Protocol step recorded by the state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceEvent {
    Started {
        address: DeviceAddress,
        direction: Direction,
        register: u8,
        len: u8,
    },
    RegisterSelected(u8),
    RepeatedStart,
    ByteSent(u8),
    ByteReceived(u8),
    StopRequested,
    Completed {
        token: CompletionToken,
        data: u32,
    },
    Reset,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Started {
                address,
                direction,
                register,
                len,
            } => write!(f, "start {direction} dev={address} reg={register:#04x} len={len}"),
            TraceEvent::RegisterSelected(register) => write!(f, "register {register:#04x}"),
            TraceEvent::RepeatedStart => f.write_str("repeated-start"),
            TraceEvent::ByteSent(byte) => write!(f, "tx {byte:#04x}"),
            TraceEvent::ByteReceived(byte) => write!(f, "rx {byte:#04x}"),
            TraceEvent::StopRequested => f.write_str("stop"),
            TraceEvent::Completed { token, data } => {
                write!(f, "complete token={token} data={data:#010x}")
            }
            TraceEvent::Reset => f.write_str("bus-reset"),
        }
    }
}

/// Trace record stored in the ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TraceRecord {
    pub seq: TraceSeq,
    pub event: TraceEvent,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:<4} {}", self.seq, self.event)
    }
}

/// Fixed-capacity ring of [`TraceRecord`]s.
pub struct BusTrace {
    ring: HistoryBuf<TraceRecord, TRACE_CAPACITY>,
    next_seq: TraceSeq,
}

impl BusTrace {
    /// Creates an empty trace.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_seq: 0,
        }
    }

    /// Appends `event`, evicting the oldest record once full.
    pub fn record(&mut self, event: TraceEvent) -> TraceSeq {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.ring.write(TraceRecord { seq, event });
        seq
    }

    /// Most recent record, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TraceRecord> {
        self.ring.recent()
    }

    /// Records in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TraceRecord> {
        self.ring.oldest_ordered()
    }

    /// Records newer than `seq`, oldest first.
    pub fn since(&self, seq: TraceSeq) -> impl Iterator<Item = &TraceRecord> {
        self.oldest_first().filter(move |record| {
            let age = record.seq.wrapping_sub(seq);
            age != 0 && age < 1 << 31
        })
    }

    /// Number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }
}

impl Default for BusTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_newest_records_in_order() {
        let mut trace = BusTrace::new();
        let total = u8::try_from(TRACE_CAPACITY + 3).unwrap();
        for byte in 0..total {
            trace.record(TraceEvent::ByteSent(byte));
        }

        assert_eq!(trace.len(), TRACE_CAPACITY);
        let first = trace.oldest_first().next().copied().unwrap();
        assert_eq!(first.seq, 3);
        assert_eq!(first.event, TraceEvent::ByteSent(3));
        assert_eq!(
            trace.latest().unwrap().event,
            TraceEvent::ByteSent(total - 1)
        );
    }

    #[test]
    fn since_skips_already_seen_records() {
        let mut trace = BusTrace::new();
        trace.record(TraceEvent::RepeatedStart);
        let mark = trace.record(TraceEvent::StopRequested);
        trace.record(TraceEvent::Reset);

        let newer: heapless::Vec<TraceEvent, 4> =
            trace.since(mark).map(|record| record.event).collect();
        assert_eq!(newer.as_slice(), &[TraceEvent::Reset]);
    }
}
