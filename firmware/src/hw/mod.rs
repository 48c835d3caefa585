//! Memory-mapped peripheral access for the EFM32PG12.
//!
//! Peripherals are reached through raw volatile accesses on fixed base
//! addresses; [`RegisterBlock`] keeps the pointer arithmetic in one place.

use core::ptr;

pub mod cmu;
pub mod i2c;
pub mod sleep;

/// Base address plus 32-bit register accessors.
#[derive(Copy, Clone)]
pub struct RegisterBlock {
    base: usize,
}

impl RegisterBlock {
    /// # Safety
    ///
    /// `base` must be the start of a peripheral register block that stays
    /// mapped for the program lifetime.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    const fn address(self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    pub fn read(self, offset: usize) -> u32 {
        // SAFETY: the block was constructed over mapped peripheral registers.
        unsafe { ptr::read_volatile(self.address(offset)) }
    }

    pub fn write(self, offset: usize, value: u32) {
        // SAFETY: the block was constructed over mapped peripheral registers.
        unsafe { ptr::write_volatile(self.address(offset), value) }
    }

    pub fn modify(self, offset: usize, f: impl FnOnce(u32) -> u32) {
        self.write(offset, f(self.read(offset)));
    }
}
