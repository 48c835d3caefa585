use bus_core::EnergyMode;
use bus_core::energy::SleepController;
use cortex_m::asm;
use cortex_m::peripheral::SCB;

use super::cmu;

/// Enters EM1..EM3 with `WFI`, picking sleep depth through `SLEEPDEEP`.
pub struct CoreSleep {
    scb: SCB,
}

impl CoreSleep {
    pub fn new(scb: SCB) -> Self {
        Self { scb }
    }
}

impl SleepController for CoreSleep {
    fn enter(&mut self, mode: EnergyMode) {
        match mode {
            EnergyMode::Em0 => {}
            EnergyMode::Em1 => {
                self.scb.clear_sleepdeep();
                asm::wfi();
            }
            EnergyMode::Em2 => {
                self.scb.set_sleepdeep();
                asm::wfi();
            }
            EnergyMode::Em3 | EnergyMode::Em4 => {
                self.scb.set_sleepdeep();
                cmu::stop_lfxo();
                asm::wfi();
                cmu::start_lfxo();
            }
        }
    }
}
