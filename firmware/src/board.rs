//! Pearl Gecko starter kit wiring for the light-sensor bus.

use bus_core::config::BusSettings;
use bus_core::{BusId, EnergyMode};

/// High-frequency peripheral clock after reset (HFRCO at 19 MHz, no prescaler).
pub const HFPERCLK_HZ: u32 = 19_000_000;

/// Controller the Si1133 hangs off.
pub const SENSOR_BUS: BusId = BusId::Bus1;

/// Route location shared by both sensor lines.
pub const SENSOR_ROUTE_LOCATION: u8 = 17;

/// Fast mode, 6:3 clock ratio, every driver event enabled.
pub const SENSOR_SETTINGS: BusSettings = BusSettings::fast_mode()
    .with_route(SENSOR_ROUTE_LOCATION, SENSOR_ROUTE_LOCATION);

/// Deepest mode the application never enters, held for the whole run.
pub const SYSTEM_ENERGY_BLOCK: EnergyMode = EnergyMode::Em3;

/// Event bit posted when a sensor read completes.
pub const SENSOR_READ_EVENT: u32 = 0x0000_0008;
/// Event bit posted once the boot sequence finished.
pub const BOOT_EVENT: u32 = 0x0000_0010;
/// Event bit posted when a light measurement read completes.
pub const MEASUREMENT_EVENT: u32 = 0x0000_0020;

/// Polls granted to a bounded start before the bus is considered wedged.
pub const START_POLL_BUDGET: u32 = 100_000;

#[cfg(test)]
mod tests {
    use super::*;
    use bus_core::config::FAST_MAX_FREQ_HZ;

    #[test]
    fn sensor_bus_runs_fast_mode_on_location_17() {
        assert_eq!(SENSOR_SETTINGS.bus_freq_hz, FAST_MAX_FREQ_HZ);
        assert_eq!(SENSOR_SETTINGS.scl_location, 17);
        assert_eq!(SENSOR_SETTINGS.sda_location, 17);
        assert!(SENSOR_SETTINGS.master);
        assert_eq!(SENSOR_READ_EVENT & BOOT_EVENT, 0);
        assert_eq!(MEASUREMENT_EVENT & (SENSOR_READ_EVENT | BOOT_EVENT), 0);
    }
}
