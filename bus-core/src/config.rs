//! Bus configuration surface.
//!
//! [`BusSettings`] carries everything `configure` applies to a controller:
//! protocol timing, pin routing and which of the three driver events raise an
//! interrupt. Frequencies are in hertz.

use core::fmt;

use crate::bus::IrqFlags;

/// Highest SCL frequency that meets standard-mode timing with a 4:4 ratio.
pub const STANDARD_MAX_FREQ_HZ: u32 = 92_000;
/// Highest SCL frequency that meets fast-mode timing with a 6:3 ratio.
pub const FAST_MAX_FREQ_HZ: u32 = 392_157;
/// Highest SCL frequency that meets fast-mode-plus timing with an 11:6 ratio.
pub const FAST_PLUS_MAX_FREQ_HZ: u32 = 987_167;

/// Fixed SCL overhead in reference clock cycles added by the controller.
const SCL_OVERHEAD_CYCLES: u32 = 8;
/// Width of the CLKDIV field.
const MAX_CLOCK_DIVIDER: u16 = 0x1FF;

/// SCL low/high period ratio.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockRatio {
    /// 4:4
    Standard,
    /// 6:3
    Asymmetric,
    /// 11:6
    Fast,
}

impl ClockRatio {
    /// Low and high period lengths in divided clock cycles.
    #[must_use]
    pub const fn periods(self) -> (u32, u32) {
        match self {
            ClockRatio::Standard => (4, 4),
            ClockRatio::Asymmetric => (6, 3),
            ClockRatio::Fast => (11, 6),
        }
    }

    /// Value of the CLHR control field.
    #[must_use]
    pub const fn field(self) -> u32 {
        match self {
            ClockRatio::Standard => 0,
            ClockRatio::Asymmetric => 1,
            ClockRatio::Fast => 2,
        }
    }
}

impl fmt::Display for ClockRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (low, high) = self.periods();
        write!(f, "{low}:{high}")
    }
}

/// Per-event interrupt enables.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptEnables {
    pub ack: bool,
    pub rx_data: bool,
    pub stop: bool,
}

impl InterruptEnables {
    /// Every driver event enabled.
    pub const ALL: Self = Self {
        ack: true,
        rx_data: true,
        stop: true,
    };

    /// Flags to OR into the interrupt-enable register.
    #[must_use]
    pub fn flags(self) -> IrqFlags {
        let mut flags = IrqFlags::empty();
        flags.set(IrqFlags::ACK, self.ack);
        flags.set(IrqFlags::RXDATAV, self.rx_data);
        flags.set(IrqFlags::MSTOP, self.stop);
        flags
    }
}

/// Protocol, routing and interrupt settings for one bus controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusSettings {
    /// Enable the controller once configured.
    pub enable: bool,
    /// Master role; slave operation is rejected.
    pub master: bool,
    /// Reference clock; `0` selects the current peripheral clock.
    pub ref_freq_hz: u32,
    /// Maximum SCL frequency.
    pub bus_freq_hz: u32,
    pub clock_ratio: ClockRatio,
    pub scl_pin_enable: bool,
    pub sda_pin_enable: bool,
    /// Raw SCL route location number.
    pub scl_location: u8,
    /// Raw SDA route location number.
    pub sda_location: u8,
    pub interrupts: InterruptEnables,
}

impl BusSettings {
    /// Fast-mode master with both pins routed at location 0 and every event enabled.
    #[must_use]
    pub const fn fast_mode() -> Self {
        Self {
            enable: true,
            master: true,
            ref_freq_hz: 0,
            bus_freq_hz: FAST_MAX_FREQ_HZ,
            clock_ratio: ClockRatio::Asymmetric,
            scl_pin_enable: true,
            sda_pin_enable: true,
            scl_location: 0,
            sda_location: 0,
            interrupts: InterruptEnables::ALL,
        }
    }

    /// Returns a copy routed to the given SCL/SDA locations.
    #[must_use]
    pub const fn with_route(mut self, scl_location: u8, sda_location: u8) -> Self {
        self.scl_location = scl_location;
        self.sda_location = sda_location;
        self
    }

    /// Reference clock to use given the live peripheral clock.
    #[must_use]
    pub const fn reference_hz(&self, peripheral_clock_hz: u32) -> u32 {
        if self.ref_freq_hz == 0 {
            peripheral_clock_hz
        } else {
            self.ref_freq_hz
        }
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self::fast_mode()
    }
}

/// Smallest clock divider that keeps SCL at or below `bus_hz`.
///
/// The controller produces `f_scl = f_ref / ((n_low + n_high) * (div + 1) + 8)`.
/// Results are clamped to the 9-bit divider field; a zero bus frequency
/// selects the slowest clock.
#[must_use]
pub fn clock_divider(ref_hz: u32, bus_hz: u32, ratio: ClockRatio) -> u16 {
    if bus_hz == 0 {
        return MAX_CLOCK_DIVIDER;
    }

    let (low, high) = ratio.periods();
    let cycles_per_period = u64::from(low + high) * u64::from(bus_hz);
    let overhead = u64::from(SCL_OVERHEAD_CYCLES) * u64::from(bus_hz);
    let budget = u64::from(ref_hz).saturating_sub(overhead);
    let multiplier = budget.div_ceil(cycles_per_period);
    let divider = multiplier.saturating_sub(1);

    u16::try_from(divider)
        .unwrap_or(MAX_CLOCK_DIVIDER)
        .min(MAX_CLOCK_DIVIDER)
}

/// SCL frequency produced by `divider`.
#[must_use]
pub fn scl_frequency(ref_hz: u32, divider: u16, ratio: ClockRatio) -> u32 {
    let (low, high) = ratio.periods();
    let period = (low + high) * (u32::from(divider) + 1) + SCL_OVERHEAD_CYCLES;
    ref_hz / period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divider_never_exceeds_requested_frequency() {
        for ratio in [ClockRatio::Standard, ClockRatio::Asymmetric, ClockRatio::Fast] {
            for bus_hz in [STANDARD_MAX_FREQ_HZ, FAST_MAX_FREQ_HZ, FAST_PLUS_MAX_FREQ_HZ] {
                let div = clock_divider(19_000_000, bus_hz, ratio);
                assert!(
                    scl_frequency(19_000_000, div, ratio) <= bus_hz,
                    "ratio {ratio} at {bus_hz} Hz overshoots with divider {div}"
                );
                if div > 0 {
                    assert!(
                        scl_frequency(19_000_000, div - 1, ratio) > bus_hz,
                        "divider {div} is not the smallest for {bus_hz} Hz"
                    );
                }
            }
        }
    }

    #[test]
    fn fast_mode_from_19mhz_matches_hand_calculation() {
        // (19_000_000 - 8 * 392_157) / (9 * 392_157) = 4.49 -> 5 -> div 4
        assert_eq!(
            clock_divider(19_000_000, FAST_MAX_FREQ_HZ, ClockRatio::Asymmetric),
            4
        );
    }

    #[test]
    fn divider_clamps_to_field_width() {
        assert_eq!(clock_divider(40_000_000, 1, ClockRatio::Standard), 0x1FF);
        assert_eq!(clock_divider(40_000_000, 0, ClockRatio::Standard), 0x1FF);
        assert_eq!(clock_divider(1_000, 1_000_000, ClockRatio::Fast), 0);
    }

    #[test]
    fn interrupt_enables_map_to_flags() {
        let enables = InterruptEnables {
            ack: true,
            rx_data: false,
            stop: true,
        };
        assert_eq!(enables.flags(), IrqFlags::ACK | IrqFlags::MSTOP);
        assert_eq!(InterruptEnables::ALL.flags(), IrqFlags::DRIVER_EVENTS);
    }

    #[test]
    fn zero_reference_selects_peripheral_clock() {
        let settings = BusSettings::fast_mode();
        assert_eq!(settings.reference_hz(19_000_000), 19_000_000);

        let explicit = BusSettings {
            ref_freq_hz: 26_000_000,
            ..settings
        };
        assert_eq!(explicit.reference_hz(19_000_000), 26_000_000);
    }
}
