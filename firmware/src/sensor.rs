//! Si1133 light sensor transactions used by the boot sequence.
//!
//! Only the handful of registers needed to prove the bus works: the command
//! register, the first response register (whose low nibble counts accepted
//! commands), the part id and the first two measurement output bytes.

use bus_core::bus::DeviceAddress;
use bus_core::{CompletionToken, Fault, TransferRequest};

/// Seven-bit bus address of the sensor.
pub const SENSOR_ADDRESS: u8 = 0x55;

pub const PART_ID_REGISTER: u8 = 0x00;
pub const COMMAND_REGISTER: u8 = 0x0B;
pub const RESPONSE0_REGISTER: u8 = 0x11;
pub const HOSTOUT0_REGISTER: u8 = 0x13;

/// Command that zeroes the command counter.
pub const RESET_COMMAND_COUNTER: u32 = 0x00;

/// Part id reported by a genuine Si1133.
pub const EXPECTED_PART_ID: u8 = 0x33;

const COMMAND_COUNTER_MASK: u32 = 0x0F;

fn address() -> Result<DeviceAddress, Fault> {
    DeviceAddress::new(SENSOR_ADDRESS)
}

/// Clears the sensor's command counter.
pub fn reset_command_counter() -> Result<TransferRequest, Fault> {
    Ok(TransferRequest::write(
        address()?,
        COMMAND_REGISTER,
        RESET_COMMAND_COUNTER,
        1,
        CompletionToken::NONE,
    ))
}

/// Reads RESPONSE0.
pub fn read_response() -> Result<TransferRequest, Fault> {
    Ok(TransferRequest::read(
        address()?,
        RESPONSE0_REGISTER,
        1,
        CompletionToken::NONE,
    ))
}

/// Reads the part id, posting `event` on completion.
pub fn read_part_id(event: u32) -> Result<TransferRequest, Fault> {
    Ok(TransferRequest::read(
        address()?,
        PART_ID_REGISTER,
        1,
        CompletionToken::new(event),
    ))
}

/// Reads the two-byte HOSTOUT0/1 measurement, posting `event` on completion.
pub fn read_measurement(event: u32) -> Result<TransferRequest, Fault> {
    Ok(TransferRequest::read(
        address()?,
        HOSTOUT0_REGISTER,
        2,
        CompletionToken::new(event),
    ))
}

/// Command counter carried in the low nibble of RESPONSE0.
pub const fn command_counter(response: u32) -> u32 {
    response & COMMAND_COUNTER_MASK
}

/// Part id byte from a completed part-id read.
pub const fn part_id(result: u32) -> u8 {
    result.to_le_bytes()[0]
}

/// HOSTOUT0:HOSTOUT1 value from a completed measurement read.
pub const fn measurement(result: u32) -> u16 {
    let [low, high, _, _] = result.to_le_bytes();
    u16::from_le_bytes([low, high])
}
