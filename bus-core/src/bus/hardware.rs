//! Register-level seam between the state machine and a bus controller.

use super::{BusCommand, IrqFlags};
use crate::config::BusSettings;

/// Operations the driver needs from one I2C controller instance.
///
/// Implemented by the memory-mapped EFM32 binding in the firmware crate and by
/// [`SimBus`](super::sim::SimBus) for host tests and the emulator.
pub trait BusHardware {
    /// Turns on the controller's peripheral clock.
    fn enable_clock(&mut self);

    /// Programs timing, role and pin routing. Does not touch interrupt enables.
    fn apply_settings(&mut self, settings: &BusSettings);

    /// Issues one or more commands in a single register write.
    fn command(&mut self, command: BusCommand);

    /// Loads the transmit buffer.
    fn write_data(&mut self, byte: u8);

    /// Pops the receive buffer.
    fn read_data(&mut self) -> u8;

    /// Returns `true` when the controller state machine reports IDLE.
    fn is_idle(&self) -> bool;

    /// Raw interrupt flags.
    fn flags(&self) -> IrqFlags;

    /// Sets interrupt flags from software.
    fn set_flags(&mut self, flags: IrqFlags);

    /// Clears interrupt flags.
    fn clear_flags(&mut self, flags: IrqFlags);

    /// Current interrupt-enable mask.
    fn enabled(&self) -> IrqFlags;

    /// Replaces the interrupt-enable mask.
    fn set_enabled(&mut self, flags: IrqFlags);

    /// Unmasks the controller's line in the interrupt controller.
    fn unmask_interrupt(&mut self) {}

    /// Flags that are both raised and enabled.
    fn pending(&self) -> IrqFlags {
        self.flags() & self.enabled()
    }
}
