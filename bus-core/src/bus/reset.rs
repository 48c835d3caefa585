use core::hint;

use super::{BusCommand, BusHardware, IrqFlags};

/// Forces the controller back to an idle, interrupt-clean state.
///
/// Aborts whatever the controller was doing, then issues START and STOP in the
/// same write so a slave holding SDA low gets clocked out, and waits for the
/// resulting MSTOP. Interrupts stay disabled for the whole sequence and the
/// caller's enable mask is restored at the end. Blocks with no timeout.
pub fn reset_bus<H: BusHardware>(hw: &mut H) {
    hw.command(BusCommand::ABORT);

    let saved_enables = hw.enabled();
    hw.set_enabled(IrqFlags::empty());
    let raised = hw.flags();
    hw.clear_flags(raised);

    hw.command(BusCommand::CLEARTX);
    hw.command(BusCommand::START | BusCommand::STOP);

    while !hw.flags().contains(IrqFlags::MSTOP) {
        hint::spin_loop();
    }
    let raised = hw.flags();
    hw.clear_flags(raised);

    hw.command(BusCommand::ABORT);
    hw.set_enabled(saved_enables);
}
