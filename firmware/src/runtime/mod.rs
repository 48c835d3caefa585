use bus_core::{EnergyArbiter, EventFlags};
use cortex_m::interrupt;
use cortex_m::register::primask;
use cortex_m_rt::{entry, exception};
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;

use crate::board;
use crate::fault;
use crate::hw::cmu;
use crate::hw::i2c::I2cIrq;
use crate::hw::sleep::CoreSleep;
use crate::sensor;
use crate::telemetry::TraceForwarder;

pub mod bus;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(crate) static ENERGY: EnergyArbiter = EnergyArbiter::new();
pub(crate) static EVENTS: EventFlags = EventFlags::new();

#[entry]
fn main() -> ! {
    let Some(core) = cortex_m::Peripherals::take() else {
        panic!("core peripherals already taken");
    };

    cmu::open();
    ENERGY.reset();
    EVENTS.reset();
    ENERGY
        .block(board::SYSTEM_ENERGY_BLOCK)
        .unwrap_or_else(|err| fault::halt(err));

    bus::configure(board::SENSOR_BUS, &board::SENSOR_SETTINGS);
    boot_sensor();

    let mut sleep = CoreSleep::new(core.SCB);
    let mut forwarder = TraceForwarder::new();
    loop {
        critical_section::with(|_| {
            if EVENTS.is_empty() {
                ENERGY.enter_sleep(&mut sleep);
            }
        });

        let events = EVENTS.take();
        if events & board::BOOT_EVENT != 0 {
            defmt::info!("boot complete, requesting part id");
            request_part_id();
        }
        if events & board::SENSOR_READ_EVENT != 0 {
            report_part_id();
            request_measurement();
        }
        if events & board::MEASUREMENT_EVENT != 0 {
            report_measurement();
        }
        bus::forward_trace(&mut forwarder, board::SENSOR_BUS);
    }
}

/// Resets the sensor's command counter and checks it reads back as zero.
fn boot_sensor() {
    let sensor_bus = board::SENSOR_BUS;
    let reset = sensor::reset_command_counter().unwrap_or_else(|err| fault::halt(err));
    let response = sensor::read_response().unwrap_or_else(|err| fault::halt(err));

    bus::start(sensor_bus, &reset);
    let counter = sensor::command_counter(bus::transfer(sensor_bus, &response));
    if counter != 0 {
        defmt::warn!("command counter at {=u32} after reset", counter);
    }
    EVENTS.post(board::BOOT_EVENT);
}

fn request_part_id() {
    let request =
        sensor::read_part_id(board::SENSOR_READ_EVENT).unwrap_or_else(|err| fault::halt(err));
    bus::start_bounded(board::SENSOR_BUS, &request, board::START_POLL_BUDGET);
}

fn request_measurement() {
    let request =
        sensor::read_measurement(board::MEASUREMENT_EVENT).unwrap_or_else(|err| fault::halt(err));
    bus::start_bounded(board::SENSOR_BUS, &request, board::START_POLL_BUDGET);
}

fn report_measurement() {
    match bus::last_result(board::SENSOR_BUS) {
        Some(result) => defmt::info!("measurement {=u16:#x}", sensor::measurement(result)),
        None => defmt::warn!("measurement event without a completed transaction"),
    }
}

fn report_part_id() {
    let Some(result) = bus::last_result(board::SENSOR_BUS) else {
        defmt::warn!("read event without a completed transaction");
        return;
    };
    let part_id = sensor::part_id(result);
    if part_id == sensor::EXPECTED_PART_ID {
        defmt::info!("Si1133 part id {=u8:#x}", part_id);
    } else {
        defmt::warn!(
            "unexpected part id {=u8:#x}, wanted {=u8:#x}",
            part_id,
            sensor::EXPECTED_PART_ID
        );
    }
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    match I2cIrq::bus(irqn) {
        Some(bus_id) => bus::service(bus_id),
        None => panic!("unhandled interrupt {irqn}"),
    }
}
