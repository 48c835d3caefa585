//! Console grammar for the bus emulator.
//!
//! One command per line, keywords are case-insensitive and numbers take
//! either decimal or `0x` hexadecimal form:
//!
//! ```text
//! read <register> [len]
//! write <register> <value> [len]
//! peek <register>
//! poke <register> <value>
//! target <address>
//! energy [block|release <mode>]
//! status | trace | recover | reset | help
//! ```

use core::fmt;

use bus_core::EnergyMode;
use winnow::ascii::{dec_uint, hex_digit1, space0, space1};
use winnow::combinator::{alt, dispatch, empty, eof, fail, opt, preceded, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

/// Parsed console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    Read { register: u8, len: u8 },
    Write { register: u8, value: u32, len: u8 },
    Peek { register: u8 },
    Poke { register: u8, value: u8 },
    Target { address: u8 },
    Energy(Option<EnergyAction>),
    Status,
    Trace,
    Recover,
    Reset,
    Help,
}

/// Manual arbiter manipulation from the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnergyAction {
    Block(EnergyMode),
    Release(EnergyMode),
}

/// Syntax error with the byte offset it was detected at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsoleError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "syntax error at column {}", self.offset + 1)
        } else {
            write!(f, "{} at column {}", self.message, self.offset + 1)
        }
    }
}

/// Usage lines printed by `help`.
pub const HELP_LINES: &[&str] = &[
    "read <reg> [len]           - read 1-4 bytes from the sensor",
    "write <reg> <value> [len]  - write 1-4 bytes, most significant first",
    "peek <reg> / poke <reg> <value> - inspect or patch the sensor register file",
    "target <addr>              - address used by read/write (default 0x55)",
    "energy [block|release <n>] - show or change the energy-mode blockers",
    "status                     - bus, energy and result summary",
    "trace                      - protocol trace of the sensor bus",
    "recover                    - run the bus reset on an idle bus",
    "reset                      - restart the emulated MCU, keeping sensor registers",
    "exit                       - leave the emulator",
];

/// Parses one console line.
///
/// # Errors
///
/// Returns a [`ConsoleError`] describing the first token that does not fit
/// the grammar.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let lowered = line.trim().to_ascii_lowercase();
    terminated(command, (space0, eof))
        .parse(lowered.as_str())
        .map_err(|err| ConsoleError {
            offset: err.offset(),
            message: err.inner().to_string(),
        })
}

fn command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    dispatch! {keyword;
        "read" => read_args,
        "write" => write_args,
        "peek" => preceded(space1, byte).map(|register| ConsoleCommand::Peek { register }),
        "poke" => (preceded(space1, byte), preceded(space1, byte))
            .map(|(register, value)| ConsoleCommand::Poke { register, value }),
        "target" => preceded(space1, byte).map(|address| ConsoleCommand::Target { address }),
        "energy" => opt(preceded(space1, energy_action)).map(ConsoleCommand::Energy),
        "status" => empty.value(ConsoleCommand::Status),
        "trace" => empty.value(ConsoleCommand::Trace),
        "recover" => empty.value(ConsoleCommand::Recover),
        "reset" => empty.value(ConsoleCommand::Reset),
        "help" => empty.value(ConsoleCommand::Help),
        _ => fail.context(StrContext::Label("command")),
    }
    .parse_next(input)
}

fn keyword<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphabetic())
        .context(StrContext::Label("command"))
        .parse_next(input)
}

fn read_args(input: &mut &str) -> ModalResult<ConsoleCommand> {
    let register = preceded(space1, byte).parse_next(input)?;
    let len = opt(preceded(space1, byte)).parse_next(input)?.unwrap_or(1);
    Ok(ConsoleCommand::Read { register, len })
}

fn write_args(input: &mut &str) -> ModalResult<ConsoleCommand> {
    let register = preceded(space1, byte).parse_next(input)?;
    let value = preceded(space1, number).parse_next(input)?;
    let len = opt(preceded(space1, byte)).parse_next(input)?.unwrap_or(1);
    Ok(ConsoleCommand::Write {
        register,
        value,
        len,
    })
}

fn energy_action(input: &mut &str) -> ModalResult<EnergyAction> {
    dispatch! {keyword;
        "block" => preceded(space1, energy_mode).map(EnergyAction::Block),
        "release" => preceded(space1, energy_mode).map(EnergyAction::Release),
        _ => fail.context(StrContext::Label("energy action")),
    }
    .parse_next(input)
}

fn energy_mode(input: &mut &str) -> ModalResult<EnergyMode> {
    preceded(opt("em"), byte)
        .verify_map(|index| EnergyMode::from_index(usize::from(index)))
        .context(StrContext::Expected(StrContextValue::Description(
            "energy mode 0-4",
        )))
        .parse_next(input)
}

fn byte(input: &mut &str) -> ModalResult<u8> {
    number
        .try_map(u8::try_from)
        .context(StrContext::Expected(StrContextValue::Description("byte")))
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<u32> {
    alt((
        preceded("0x", hex_digit1).try_map(|digits| u32::from_str_radix(digits, 16)),
        dec_uint,
    ))
    .context(StrContext::Expected(StrContextValue::Description("number")))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_defaults_to_a_single_byte() {
        assert_eq!(
            parse_command("read 0x11"),
            Ok(ConsoleCommand::Read {
                register: 0x11,
                len: 1
            })
        );
        assert_eq!(
            parse_command("  READ 19 2  "),
            Ok(ConsoleCommand::Read {
                register: 0x13,
                len: 2
            })
        );
    }

    #[test]
    fn write_takes_a_word_and_optional_length() {
        assert_eq!(
            parse_command("write 0x0b 0x1234 2"),
            Ok(ConsoleCommand::Write {
                register: 0x0B,
                value: 0x1234,
                len: 2
            })
        );
        assert_eq!(
            parse_command("write 0x0A 0X0B"),
            Ok(ConsoleCommand::Write {
                register: 0x0A,
                value: 0x0B,
                len: 1
            })
        );
    }

    #[test]
    fn energy_accepts_bare_and_prefixed_modes() {
        assert_eq!(parse_command("energy"), Ok(ConsoleCommand::Energy(None)));
        assert_eq!(
            parse_command("energy block em2"),
            Ok(ConsoleCommand::Energy(Some(EnergyAction::Block(
                EnergyMode::Em2
            ))))
        );
        assert_eq!(
            parse_command("energy release 3"),
            Ok(ConsoleCommand::Energy(Some(EnergyAction::Release(
                EnergyMode::Em3
            ))))
        );
        assert!(parse_command("energy block 7").is_err());
    }

    #[test]
    fn register_operands_must_fit_in_a_byte() {
        let err = parse_command("peek 0x100").expect_err("register overflows a byte");
        assert!(err.offset >= 4, "error should point past the keyword: {err}");
        assert!(parse_command("poke 1").is_err());
    }

    #[test]
    fn unknown_commands_and_trailing_junk_are_rejected() {
        assert!(parse_command("launch").is_err());
        assert!(parse_command("status now").is_err());
        assert_eq!(parse_command("help"), Ok(ConsoleCommand::Help));
        assert_eq!(
            parse_command("target 0x21"),
            Ok(ConsoleCommand::Target { address: 0x21 })
        );
    }
}
