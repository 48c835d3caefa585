use core::cell::Cell;

use bus_core::bus::sim::{BusOp, SimBus, SimDevice};
use bus_core::bus::{BUS_ENERGY_BLOCK, BusHardware, DeviceAddress, IrqFlags};
use bus_core::config::BusSettings;
use bus_core::trace::TraceEvent;
use bus_core::{
    BusDriver, BusEvent, BusId, CompletionSink, CompletionToken, EnergyArbiter, EnergyMode,
    EventFlags, Fault, ProtocolState, StartError, TransferRequest, start_within,
};

const SENSOR: u8 = 0x55;
const BUS: BusId = BusId::Bus1;

#[derive(Default)]
struct CountingSink {
    posts: Cell<u32>,
    last: Cell<CompletionToken>,
}

impl CompletionSink for CountingSink {
    fn notify(&self, token: CompletionToken) {
        self.posts.set(self.posts.get() + 1);
        self.last.set(token);
    }
}

fn configured_driver() -> BusDriver<SimBus> {
    let mut driver = BusDriver::new(
        SimBus::new(SimDevice::new(0x10)),
        SimBus::new(SimDevice::new(SENSOR)),
    );
    driver
        .configure(BUS, &BusSettings::fast_mode().with_route(17, 17))
        .expect("configure sensor bus");
    driver.hardware_mut(BUS).clear_ops();
    driver
}

fn sensor() -> DeviceAddress {
    DeviceAddress::new(SENSOR).expect("valid address")
}

/// Services interrupts until the simulated controller has nothing pending.
fn service<S: CompletionSink>(
    driver: &mut BusDriver<SimBus>,
    energy: &EnergyArbiter,
    sink: &S,
) -> Result<usize, Fault> {
    let mut interrupts = 0;
    while !driver.hardware(BUS).pending().is_empty() {
        driver.on_interrupt(BUS, energy, sink)?;
        interrupts += 1;
        assert!(interrupts < 32, "controller never went quiet");
    }
    Ok(interrupts)
}

#[test]
fn two_byte_read_follows_the_register_select_handshake() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let sink = CountingSink::default();
    let token = CompletionToken::new(0x40);

    let device = driver.hardware_mut(BUS).device_mut();
    device.set_register(0x13, 0xBE);
    device.set_register(0x14, 0xEF);

    driver
        .try_start(BUS, &energy, &TransferRequest::read(sensor(), 0x13, 2, token))
        .expect("bus should be free");
    assert!(!driver.is_idle(BUS));
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 1);

    service(&mut driver, &energy, &sink).expect("transaction should not fault");

    assert_eq!(
        driver.hardware(BUS).ops(),
        &[
            BusOp::Start,
            BusOp::Tx(0xAA),
            BusOp::Tx(0x13),
            BusOp::RepeatedStart,
            BusOp::Tx(0xAB),
            BusOp::Rx(0xBE),
            BusOp::Ack,
            BusOp::Rx(0xEF),
            BusOp::Nack,
            BusOp::Stop,
        ]
    );
    assert_eq!(driver.last_result(BUS), Some(0xBEEF));
    assert!(driver.is_idle(BUS));
    assert_eq!(driver.state(BUS), ProtocolState::InitWrite);
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 0);
    assert_eq!(sink.posts.get(), 1, "completion must be posted exactly once");
    assert_eq!(sink.last.get(), token);
}

#[test]
fn reads_pack_the_first_byte_most_significant() {
    for len in 1..=4u8 {
        let mut driver = configured_driver();
        let energy = EnergyArbiter::new();
        let events = EventFlags::new();

        let payload = [0xA1, 0xB2, 0xC3, 0xD4];
        for (offset, value) in (0u8..).zip(payload) {
            driver
                .hardware_mut(BUS)
                .device_mut()
                .set_register(0x20 + offset, value);
        }

        driver
            .try_start(
                BUS,
                &energy,
                &TransferRequest::read(sensor(), 0x20, len, CompletionToken::new(1)),
            )
            .expect("start read");
        service(&mut driver, &energy, &events).expect("read completes");

        let expected = payload[..usize::from(len)]
            .iter()
            .fold(0u32, |word, byte| (word << 8) | u32::from(*byte));
        assert_eq!(
            driver.last_result(BUS),
            Some(expected),
            "{len}-byte read packed the wrong word"
        );
        assert_eq!(events.take(), 1);
    }
}

#[test]
fn read_result_keeps_seed_bytes_above_the_transfer_length() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();
    driver.hardware_mut(BUS).device_mut().set_register(0x00, 0x12);

    let request =
        TransferRequest::read(sensor(), 0x00, 1, CompletionToken::NONE).with_seed(0xDEAD_BE00);
    driver.try_start(BUS, &energy, &request).expect("start read");
    service(&mut driver, &energy, &events).expect("read completes");

    assert_eq!(driver.last_result(BUS), Some(0xDEAD_BE12));
    assert!(events.is_empty(), "an empty token schedules nothing");
}

#[test]
fn write_shifts_payload_most_significant_byte_first() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let sink = CountingSink::default();

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::write(sensor(), 0x0A, 0x0012_3456, 3, CompletionToken::new(8)),
        )
        .expect("start write");
    service(&mut driver, &energy, &sink).expect("write completes");

    assert_eq!(
        driver.hardware(BUS).ops(),
        &[
            BusOp::Start,
            BusOp::Tx(0xAA),
            BusOp::Tx(0x0A),
            BusOp::Tx(0x12),
            BusOp::Tx(0x34),
            BusOp::Tx(0x56),
            BusOp::Stop,
        ]
    );
    let device = driver.hardware(BUS).device();
    assert_eq!(device.register(0x0A), 0x12);
    assert_eq!(device.register(0x0B), 0x34);
    assert_eq!(device.register(0x0C), 0x56);
    assert!(driver.is_idle(BUS));
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 0);
    assert_eq!(sink.posts.get(), 1);
}

#[test]
fn second_start_waits_for_the_first_completion() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();
    driver.hardware_mut(BUS).device_mut().set_register(0x11, 0x7E);

    let first = TransferRequest::read(sensor(), 0x11, 1, CompletionToken::new(0b01));
    let second =
        TransferRequest::write(sensor(), 0x0B, 0x42, 1, CompletionToken::new(0b10));

    driver.try_start(BUS, &energy, &first).expect("first start");
    assert_eq!(
        driver.try_start(BUS, &energy, &second),
        Err(nb::Error::WouldBlock)
    );
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 1);
    let active = driver.machine(BUS).active().copied().expect("first in flight");
    assert_eq!(active.token, CompletionToken::new(0b01));

    service(&mut driver, &energy, &events).expect("first completes");
    assert_eq!(events.take(), 0b01);
    assert_eq!(driver.last_result(BUS), Some(0x7E));
    assert_eq!(driver.hardware(BUS).device().register(0x0B), 0);

    driver.try_start(BUS, &energy, &second).expect("second start");
    service(&mut driver, &energy, &events).expect("second completes");
    assert_eq!(events.take(), 0b10);
    assert_eq!(driver.hardware(BUS).device().register(0x0B), 0x42);
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 0);
}

#[test]
fn transactions_on_one_bus_leave_the_other_untouched() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::read(sensor(), 0x00, 1, CompletionToken::new(1)),
        )
        .expect("start read");
    service(&mut driver, &energy, &events).expect("read completes");

    assert!(driver.hardware(BusId::Bus0).ops().is_empty());
    assert!(!driver.is_configured(BusId::Bus0));
    assert_eq!(driver.last_result(BusId::Bus0), None);
}

#[test]
fn unanswered_address_holds_the_bus_until_the_bounded_start_gives_up() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();
    let absent = DeviceAddress::new(0x21).expect("valid address");

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::read(absent, 0x00, 1, CompletionToken::new(1)),
        )
        .expect("start is accepted before the address phase");
    assert!(driver.hardware(BUS).flags().contains(IrqFlags::NACK));
    assert_eq!(service(&mut driver, &energy, &events), Ok(0));

    let retry = TransferRequest::read(sensor(), 0x00, 1, CompletionToken::new(2));
    let mut polls = 0;
    let outcome = start_within(3, || {
        polls += 1;
        driver.try_start(BUS, &energy, &retry)
    });

    assert_eq!(outcome, Err(StartError::TimedOut));
    assert_eq!(polls, 3);
    assert!(events.is_empty());
    assert_eq!(
        energy.blockers(BUS_ENERGY_BLOCK),
        1,
        "the stalled transaction keeps its blocker"
    );
}

#[test]
fn start_rejects_bad_requests_without_touching_the_arbiter() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();

    for len in [0, 5] {
        assert_eq!(
            driver.try_start(
                BUS,
                &energy,
                &TransferRequest::read(sensor(), 0x00, len, CompletionToken::NONE),
            ),
            Err(nb::Error::Other(Fault::InvalidLength(len)))
        );
    }
    assert_eq!(DeviceAddress::new(0x80), Err(Fault::InvalidAddress(0x80)));

    driver.hardware_mut(BUS).hold_bus();
    assert_eq!(
        driver.try_start(
            BUS,
            &energy,
            &TransferRequest::read(sensor(), 0x00, 1, CompletionToken::NONE),
        ),
        Err(nb::Error::Other(Fault::BusNotIdle(BUS)))
    );
    assert_eq!(energy.blockers(EnergyMode::Em2), 0);
    assert!(driver.is_idle(BUS));
}

#[test]
fn unconfigured_bus_refuses_to_start() {
    let mut driver = BusDriver::new(
        SimBus::new(SimDevice::new(SENSOR)),
        SimBus::new(SimDevice::new(SENSOR)),
    );
    let energy = EnergyArbiter::new();

    assert_eq!(
        driver.try_start(
            BusId::Bus0,
            &energy,
            &TransferRequest::read(sensor(), 0x00, 1, CompletionToken::NONE),
        ),
        Err(nb::Error::Other(Fault::BusNotConfigured(BusId::Bus0)))
    );
}

#[test]
fn stop_without_a_requested_stop_is_fatal() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver.hardware_mut(BUS).set_flags(IrqFlags::MSTOP);
    assert_eq!(
        driver.on_interrupt(BUS, &energy, &events),
        Err(Fault::UnexpectedEvent {
            event: BusEvent::StopDetected,
            state: ProtocolState::InitWrite,
        })
    );
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 0);
}

#[test]
fn receive_outside_the_read_phase_is_fatal() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::write(sensor(), 0x0B, 0x01, 1, CompletionToken::new(1)),
        )
        .expect("start write");
    driver.hardware_mut(BUS).set_flags(IrqFlags::RXDATAV);

    assert_eq!(
        driver.on_interrupt(BUS, &energy, &events),
        Err(Fault::UnexpectedEvent {
            event: BusEvent::ReceiveDataValid,
            state: ProtocolState::ReadData,
        })
    );
}

/// Services interrupts one at a time until the machine reaches `state`.
fn step_until(
    driver: &mut BusDriver<SimBus>,
    energy: &EnergyArbiter,
    sink: &EventFlags,
    state: ProtocolState,
) {
    for _ in 0..8 {
        if driver.state(BUS) == state {
            return;
        }
        driver
            .on_interrupt(BUS, energy, sink)
            .expect("transaction steps cleanly");
    }
    panic!("never reached {state:?}, stuck in {:?}", driver.state(BUS));
}

#[test]
fn ack_after_final_read_byte_is_fatal() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::read(sensor(), 0x13, 1, CompletionToken::new(1)),
        )
        .expect("start read");
    step_until(&mut driver, &energy, &events, ProtocolState::ReceiveData);
    driver.hardware_mut(BUS).set_flags(IrqFlags::ACK);

    assert_eq!(
        driver.on_interrupt(BUS, &energy, &events),
        Err(Fault::UnexpectedEvent {
            event: BusEvent::Acknowledge,
            state: ProtocolState::ReceiveData,
        })
    );
    assert!(!driver.is_idle(BUS));
    assert!(events.is_empty());
}

#[test]
fn trailing_ack_after_final_write_byte_is_ignored() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::write(sensor(), 0x0B, 0x5A, 1, CompletionToken::new(4)),
        )
        .expect("start write");
    step_until(&mut driver, &energy, &events, ProtocolState::ReceiveData);

    let pending = driver.hardware(BUS).pending();
    assert_eq!(pending, IrqFlags::ACK | IrqFlags::MSTOP);
    assert_eq!(driver.on_interrupt(BUS, &energy, &events), Ok(pending));
    assert!(driver.is_idle(BUS));
    assert_eq!(driver.state(BUS), ProtocolState::InitWrite);
    assert_eq!(energy.blockers(BUS_ENERGY_BLOCK), 0);
    assert_eq!(events.take(), 4);
}

#[test]
fn ack_without_a_transaction_is_fatal() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();

    driver.hardware_mut(BUS).set_flags(IrqFlags::ACK);
    assert_eq!(
        driver.on_interrupt(BUS, &energy, &events),
        Err(Fault::UnexpectedEvent {
            event: BusEvent::Acknowledge,
            state: ProtocolState::InitWrite,
        })
    );
    assert!(driver.hardware(BUS).ops().is_empty());
}

#[test]
fn trace_records_each_protocol_step() {
    let mut driver = configured_driver();
    let energy = EnergyArbiter::new();
    let events = EventFlags::new();
    let mark = driver
        .trace(BUS)
        .latest()
        .map(|record| record.seq)
        .expect("configure records a reset");

    driver.hardware_mut(BUS).device_mut().set_register(0x00, 0xCC);
    driver
        .try_start(
            BUS,
            &energy,
            &TransferRequest::read(sensor(), 0x00, 1, CompletionToken::new(4)),
        )
        .expect("start read");
    service(&mut driver, &energy, &events).expect("read completes");

    let steps: heapless::Vec<TraceEvent, 8> = driver
        .trace(BUS)
        .since(mark)
        .map(|record| record.event)
        .collect();
    assert_eq!(
        steps.as_slice(),
        &[
            TraceEvent::Started {
                address: sensor(),
                direction: bus_core::Direction::Read,
                register: 0x00,
                len: 1,
            },
            TraceEvent::RegisterSelected(0x00),
            TraceEvent::RepeatedStart,
            TraceEvent::ByteReceived(0xCC),
            TraceEvent::StopRequested,
            TraceEvent::Completed {
                token: CompletionToken::new(4),
                data: 0xCC,
            },
        ]
    );
}
