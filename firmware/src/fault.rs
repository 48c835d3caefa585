use bus_core::{Fault, StartError};

/// Reports a broken driver invariant and stops the system.
pub fn halt(fault: Fault) -> ! {
    defmt::error!("fault: {}", fault);
    panic!("driver fault");
}

/// Halts on a failed bounded start; a timeout means the bus is wedged.
pub fn halt_start(error: StartError) -> ! {
    match error {
        StartError::Fault(fault) => halt(fault),
        StartError::TimedOut => {
            defmt::error!("bus stayed busy past the poll budget");
            panic!("bus wedged");
        }
    }
}
