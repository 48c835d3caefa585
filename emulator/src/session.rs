//! Emulated MCU: the core driver running against a simulated sensor bus.
//!
//! Interrupts are delivered synchronously: after each start the session keeps
//! calling the driver's interrupt entry point while the simulated controller
//! has enabled flags raised, the same way the NVIC would on hardware.

use bus_core::bus::sim::{SimBus, SimDevice};
use bus_core::bus::{BUS_ENERGY_BLOCK, BusHardware, DeviceAddress};
use bus_core::config::BusSettings;
use bus_core::energy::ALL_ENERGY_MODES;
use bus_core::{
    BusDriver, BusId, CompletionToken, EnergyArbiter, EventFlags, Fault, TransferRequest,
};

use crate::console::{self, ConsoleCommand, EnergyAction, HELP_LINES};

/// Bus the emulated sensor is wired to.
pub const SENSOR_BUS: BusId = BusId::Bus1;
/// Default sensor address.
pub const SENSOR_ADDRESS: u8 = 0x55;
/// Event bit posted when a console transaction completes.
pub const CONSOLE_EVENT: u32 = 0x0000_0001;

/// Interrupts serviced per transaction before it is declared stalled.
const MAX_INTERRUPTS: usize = 64;

/// Power-on contents of the emulated sensor.
const SENSOR_DEFAULTS: &[(u8, u8)] = &[(0x00, 0x33), (0x01, 0x11), (0x02, 0x10)];

pub struct Session {
    driver: BusDriver<SimBus>,
    energy: EnergyArbiter,
    events: EventFlags,
    target: DeviceAddress,
    fault: Option<Fault>,
    command_count: usize,
}

impl Session {
    /// Boots the emulated MCU with a freshly powered sensor.
    ///
    /// # Errors
    ///
    /// Returns the fault raised while configuring the sensor bus.
    pub fn new() -> Result<Self, Fault> {
        let mut sensor = SimDevice::new(SENSOR_ADDRESS);
        for &(register, value) in SENSOR_DEFAULTS {
            sensor.set_register(register, value);
        }
        Self::boot(sensor)
    }

    fn boot(sensor: SimDevice) -> Result<Self, Fault> {
        let mut driver = BusDriver::new(
            SimBus::new(SimDevice::new(0x00)),
            SimBus::new(sensor),
        );
        driver.configure(
            SENSOR_BUS,
            &BusSettings::fast_mode().with_route(17, 17),
        )?;

        Ok(Self {
            driver,
            energy: EnergyArbiter::new(),
            events: EventFlags::new(),
            target: DeviceAddress::new(SENSOR_ADDRESS)?,
            fault: None,
            command_count: 0,
        })
    }

    /// Number of commands handled so far.
    pub fn command_count(&self) -> usize {
        self.command_count
    }

    /// Driver under emulation.
    pub fn driver(&self) -> &BusDriver<SimBus> {
        &self.driver
    }

    /// Energy arbiter of the emulated MCU.
    pub fn energy(&self) -> &EnergyArbiter {
        &self.energy
    }

    /// Parses and runs one console line, returning the lines to print.
    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        self.command_count += 1;
        match console::parse_command(line) {
            Ok(command) => self.execute(command),
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        match command {
            ConsoleCommand::Read { register, len } => {
                let request = TransferRequest::read(
                    self.target,
                    register,
                    len,
                    CompletionToken::new(CONSOLE_EVENT),
                );
                vec![self.transfer(&request)]
            }
            ConsoleCommand::Write {
                register,
                value,
                len,
            } => {
                let request = TransferRequest::write(
                    self.target,
                    register,
                    value,
                    len,
                    CompletionToken::new(CONSOLE_EVENT),
                );
                vec![self.transfer(&request)]
            }
            ConsoleCommand::Peek { register } => {
                let value = self.sensor().register(register);
                vec![format!("sensor[{register:#04x}] = {value:#04x}")]
            }
            ConsoleCommand::Poke { register, value } => {
                self.driver
                    .hardware_mut(SENSOR_BUS)
                    .device_mut()
                    .set_register(register, value);
                vec![format!("sensor[{register:#04x}] <- {value:#04x}")]
            }
            ConsoleCommand::Target { address } => match DeviceAddress::new(address) {
                Ok(target) => {
                    self.target = target;
                    vec![format!("target {target}")]
                }
                Err(fault) => vec![format!("ERR {fault}")],
            },
            ConsoleCommand::Energy(action) => self.energy_command(action),
            ConsoleCommand::Status => self.status(),
            ConsoleCommand::Trace => self
                .driver
                .trace(SENSOR_BUS)
                .oldest_first()
                .map(ToString::to_string)
                .collect(),
            ConsoleCommand::Recover => match self.driver.recover(SENSOR_BUS) {
                Ok(()) => vec![format!("{SENSOR_BUS} reset")],
                Err(fault) => vec![format!("ERR {fault}")],
            },
            ConsoleCommand::Reset => self.restart(),
            ConsoleCommand::Help => HELP_LINES.iter().map(|line| (*line).to_string()).collect(),
        }
    }

    fn sensor(&self) -> &SimDevice {
        self.driver.hardware(SENSOR_BUS).device()
    }

    /// Starts `request`, then delivers interrupts until the bus goes idle.
    fn transfer(&mut self, request: &TransferRequest) -> String {
        if let Some(fault) = self.fault {
            return format!("ERR bus halted by earlier fault: {fault}; run `reset`");
        }

        loop {
            match self.driver.try_start(SENSOR_BUS, &self.energy, request) {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => {
                    if let Err(line) = self.pump() {
                        return line;
                    }
                    if !self.driver.is_idle(SENSOR_BUS) {
                        return "ERR previous transaction is stalled; run `reset`".to_string();
                    }
                }
                Err(nb::Error::Other(fault)) => return self.halt(fault),
            }
        }

        if let Err(line) = self.pump() {
            return line;
        }
        if !self.driver.is_idle(SENSOR_BUS) {
            return format!(
                "ERR {} did not answer; transaction stalled holding {}",
                self.target, BUS_ENERGY_BLOCK
            );
        }

        let posted = self.events.take();
        let data = self.driver.last_result(SENSOR_BUS).unwrap_or_default();
        format!(
            "OK {} reg={:#04x} len={} -> {data:#010x} (events {posted:#x})",
            request.direction, request.register, request.len
        )
    }

    /// Services interrupts until nothing enabled is pending.
    fn pump(&mut self) -> Result<usize, String> {
        let mut serviced = 0;
        while !self.driver.hardware(SENSOR_BUS).pending().is_empty() {
            if serviced == MAX_INTERRUPTS {
                return Err("ERR interrupt storm on the sensor bus".to_string());
            }
            if let Err(fault) = self
                .driver
                .on_interrupt(SENSOR_BUS, &self.energy, &self.events)
            {
                return Err(self.halt(fault));
            }
            serviced += 1;
        }
        Ok(serviced)
    }

    fn halt(&mut self, fault: Fault) -> String {
        self.fault = Some(fault);
        format!("ERR {fault}")
    }

    fn energy_command(&mut self, action: Option<EnergyAction>) -> Vec<String> {
        let outcome = match action {
            None => Ok(()),
            Some(EnergyAction::Block(mode)) => self.energy.block(mode),
            Some(EnergyAction::Release(mode)) => self.energy.unblock(mode),
        };
        let mut lines = Vec::new();
        if let Err(fault) = outcome {
            lines.push(format!("ERR {fault}"));
        }
        lines.push(self.energy_line());
        lines
    }

    fn energy_line(&self) -> String {
        let counts: Vec<String> = ALL_ENERGY_MODES
            .iter()
            .map(|mode| format!("{mode}={}", self.energy.blockers(*mode)))
            .collect();
        let sleep = self
            .energy
            .sleep_target()
            .map_or_else(|| "awake".to_string(), |mode| mode.to_string());
        format!(
            "energy {} lowest-blocked={} sleep={sleep}",
            counts.join(" "),
            self.energy.lowest_blocked()
        )
    }

    fn status(&self) -> Vec<String> {
        let bus = SENSOR_BUS;
        let activity = if self.driver.is_idle(bus) {
            "idle"
        } else {
            "busy"
        };
        let last = self
            .driver
            .last_result(bus)
            .map_or_else(|| "none".to_string(), |word| format!("{word:#010x}"));
        let mut lines = vec![
            format!(
                "{bus} {activity} state={} target={} last={last}",
                self.driver.state(bus),
                self.target
            ),
            self.energy_line(),
        ];
        if let Some(fault) = self.fault {
            lines.push(format!("halted: {fault}"));
        }
        lines
    }

    /// Power-cycles the emulated MCU; the sensor keeps its registers.
    fn restart(&mut self) -> Vec<String> {
        let sensor = self.sensor().clone();
        match Self::boot(sensor) {
            Ok(session) => {
                let command_count = self.command_count;
                *self = session;
                self.command_count = command_count;
                vec!["MCU restarted".to_string()]
            }
            Err(fault) => vec![format!("ERR {fault}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new().expect("emulated boot succeeds")
    }

    #[test]
    fn read_reports_the_part_id() {
        let mut session = session();
        let lines = session.handle_command("read 0x00");
        assert_eq!(
            lines,
            vec!["OK read reg=0x00 len=1 -> 0x00000033 (events 0x1)".to_string()]
        );
        assert_eq!(session.energy().blockers(BUS_ENERGY_BLOCK), 0);
    }

    #[test]
    fn write_lands_in_the_sensor_register_file() {
        let mut session = session();
        let lines = session.handle_command("write 0x0a 0xbeef 2");
        assert!(lines[0].starts_with("OK write"), "{lines:?}");

        assert_eq!(
            session.handle_command("peek 0x0a"),
            vec!["sensor[0x0a] = 0xbe".to_string()]
        );
        assert_eq!(
            session.handle_command("peek 0x0b"),
            vec!["sensor[0x0b] = 0xef".to_string()]
        );
    }

    #[test]
    fn absent_device_stalls_until_reset() {
        let mut session = session();
        session.handle_command("target 0x20");

        let lines = session.handle_command("read 0x00");
        assert!(lines[0].contains("stalled"), "{lines:?}");
        assert!(!session.driver().is_idle(SENSOR_BUS));
        assert_eq!(session.energy().blockers(BUS_ENERGY_BLOCK), 1);

        assert!(session.handle_command("recover")[0].starts_with("ERR"));
        session.handle_command("reset");
        assert!(session.driver().is_idle(SENSOR_BUS));
        assert_eq!(session.energy().blockers(BUS_ENERGY_BLOCK), 0);
        assert_eq!(session.command_count(), 4);
    }

    #[test]
    fn invalid_length_halts_the_bus() {
        let mut session = session();
        let lines = session.handle_command("read 0x00 5");
        assert_eq!(lines, vec!["ERR invalid transfer length 5".to_string()]);

        let retry = session.handle_command("read 0x00");
        assert!(retry[0].contains("earlier fault"), "{retry:?}");
        assert!(session.handle_command("status").iter().any(|line| line.starts_with("halted")));
    }

    #[test]
    fn energy_command_tracks_manual_blockers() {
        let mut session = session();
        let lines = session.handle_command("energy block 1");
        assert_eq!(
            lines,
            vec!["energy EM0=0 EM1=1 EM2=0 EM3=0 EM4=0 lowest-blocked=EM1 sleep=awake".to_string()]
        );

        let lines = session.handle_command("energy release 2");
        assert_eq!(lines[0], "ERR unbalanced release of EM2");
    }

    #[test]
    fn trace_lists_protocol_steps() {
        let mut session = session();
        session.handle_command("read 0x00");
        let trace = session.handle_command("trace");
        assert!(trace.first().is_some_and(|line| line.ends_with("bus-reset")));
        assert!(trace.last().is_some_and(|line| line.contains("complete")));
    }

    #[test]
    fn syntax_errors_are_reported_inline() {
        let mut session = session();
        let lines = session.handle_command("launch rockets");
        assert!(lines[0].starts_with("ERR"), "{lines:?}");
    }
}
