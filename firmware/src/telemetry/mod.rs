//! Forwards the driver's protocol trace to the log.
//!
//! The core keeps a small trace ring per bus; the main loop hands each ring to
//! a [`TraceForwarder`] after servicing events so every new record shows up
//! once on defmt (target) or stdout (host builds).

use bus_core::trace::{BusTrace, TraceRecord, TraceSeq};
use bus_core::{BUS_COUNT, BusId};

/// Remembers the last record forwarded per bus.
pub struct TraceForwarder {
    forwarded: [Option<TraceSeq>; BUS_COUNT],
}

impl TraceForwarder {
    pub const fn new() -> Self {
        Self {
            forwarded: [None; BUS_COUNT],
        }
    }

    /// Logs every record of `trace` not forwarded yet and returns how many.
    pub fn forward(&mut self, bus: BusId, trace: &BusTrace) -> usize {
        let cursor = self.forwarded[bus.as_index()];
        let slot = &mut self.forwarded[bus.as_index()];
        let mut count = 0;

        let mut emit = |record: &TraceRecord| {
            emit_log(bus, record);
            *slot = Some(record.seq);
            count += 1;
        };
        match cursor {
            Some(seen) => trace.since(seen).for_each(&mut emit),
            None => trace.oldest_first().for_each(&mut emit),
        }
        count
    }
}

impl Default for TraceForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
fn emit_log(bus: BusId, record: &TraceRecord) {
    defmt::debug!("trace:{} {}", bus, record);
}

#[cfg(not(target_os = "none"))]
fn emit_log(bus: BusId, record: &TraceRecord) {
    println!("trace:{bus} {record}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus_core::trace::TraceEvent;

    #[test]
    fn forwards_each_record_once() {
        let mut trace = BusTrace::new();
        let mut forwarder = TraceForwarder::new();

        trace.record(TraceEvent::Reset);
        trace.record(TraceEvent::RepeatedStart);
        assert_eq!(forwarder.forward(BusId::Bus1, &trace), 2);
        assert_eq!(forwarder.forward(BusId::Bus1, &trace), 0);

        trace.record(TraceEvent::StopRequested);
        assert_eq!(forwarder.forward(BusId::Bus1, &trace), 1);
        assert_eq!(
            forwarder.forward(BusId::Bus0, &trace),
            3,
            "buses keep independent cursors"
        );
    }
}
