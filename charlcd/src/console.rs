//! Line based console on stdin.
//!
//! Plain lines are printed on the display. Lines starting with `:` are commands:
//!
//! | Command                      | Effect                                   |
//! |------------------------------|------------------------------------------|
//! | `:clear`                     | clear the display                        |
//! | `:home`                      | cursor home, undo scrolling              |
//! | `:goto ROW COL`              | move the cursor                          |
//! | `:display on\|off`           | turn the display on or off               |
//! | `:cursor on\|off`            | show or hide the cursor                  |
//! | `:blink on\|off`             | blink the cursor or not                  |
//! | `:scroll left\|right`        | shift the display by one position        |
//! | `:move left\|right`          | move the cursor by one position          |
//! | `:entry left\|right [shift]` | cursor direction after each character    |
//! | `:cmd BYTE` / `:data BYTE`   | raw instruction / data byte (`0x` works) |
use charlcd_gpio::lcd::hd44780::{CursorDirection, LcdRequest};
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0} expects {1}")]
    BadArguments(&'static str, &'static str),
    #[error("invalid number: {0}")]
    BadNumber(#[from] ParseIntError),
}

/// Parses a console line into the request it stands for.
pub fn parse_line(line: &str) -> Result<LcdRequest, ConsoleError> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(LcdRequest::Print(line.to_string()));
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let request = match (name, args.as_slice()) {
        ("clear", []) => LcdRequest::Clear,
        ("home", []) => LcdRequest::Home,
        ("goto", [row, col]) => LcdRequest::SetCursor {
            row: row.parse()?,
            col: col.parse()?,
        },
        ("goto", _) => return Err(ConsoleError::BadArguments("goto", "ROW COL")),
        ("display", [state]) => LcdRequest::ShowDisplay(parse_switch("display", state)?),
        ("cursor", [state]) => LcdRequest::ShowCursor(parse_switch("cursor", state)?),
        ("blink", [state]) => LcdRequest::BlinkCursor(parse_switch("blink", state)?),
        ("display", _) => return Err(ConsoleError::BadArguments("display", "on or off")),
        ("cursor", _) => return Err(ConsoleError::BadArguments("cursor", "on or off")),
        ("blink", _) => return Err(ConsoleError::BadArguments("blink", "on or off")),
        ("scroll", [direction]) => LcdRequest::Scroll(parse_direction("scroll", direction)?),
        ("scroll", _) => return Err(ConsoleError::BadArguments("scroll", "left or right")),
        ("move", [direction]) => LcdRequest::MoveCursor(parse_direction("move", direction)?),
        ("move", _) => return Err(ConsoleError::BadArguments("move", "left or right")),
        ("entry", [direction]) => LcdRequest::EntryMode {
            direction: parse_direction("entry", direction)?,
            shift: false,
        },
        ("entry", [direction, "shift"]) => LcdRequest::EntryMode {
            direction: parse_direction("entry", direction)?,
            shift: true,
        },
        ("entry", _) => {
            return Err(ConsoleError::BadArguments("entry", "left or right, then optionally shift"));
        }
        ("cmd", [byte]) => LcdRequest::Command(parse_byte(byte)?),
        ("data", [byte]) => LcdRequest::Data(parse_byte(byte)?),
        ("cmd" | "data", _) => return Err(ConsoleError::BadArguments("cmd/data", "a byte")),
        _ => return Err(ConsoleError::UnknownCommand(command.to_string())),
    };
    Ok(request)
}

fn parse_switch(name: &'static str, state: &str) -> Result<bool, ConsoleError> {
    match state {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ConsoleError::BadArguments(name, "on or off")),
    }
}

fn parse_direction(name: &'static str, direction: &str) -> Result<CursorDirection, ConsoleError> {
    match direction {
        "left" => Ok(CursorDirection::Left),
        "right" => Ok(CursorDirection::Right),
        _ => Err(ConsoleError::BadArguments(name, "left or right")),
    }
}

fn parse_byte(s: &str) -> Result<u8, ConsoleError> {
    let byte = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_printed() {
        assert_eq!(
            parse_line("Hello, world"),
            Ok(LcdRequest::Print("Hello, world".to_string()))
        );
        assert_eq!(parse_line(""), Ok(LcdRequest::Print(String::new())));
    }

    #[test]
    fn commands_are_parsed() {
        assert_eq!(parse_line(":clear"), Ok(LcdRequest::Clear));
        assert_eq!(parse_line(":goto 1 4"), Ok(LcdRequest::SetCursor { row: 1, col: 4 }));
        assert_eq!(parse_line(":cursor on"), Ok(LcdRequest::ShowCursor(true)));
        assert_eq!(parse_line(":blink off"), Ok(LcdRequest::BlinkCursor(false)));
        assert_eq!(parse_line(":display off"), Ok(LcdRequest::ShowDisplay(false)));
        assert_eq!(
            parse_line(":scroll left"),
            Ok(LcdRequest::Scroll(CursorDirection::Left))
        );
        assert_eq!(
            parse_line(":move right"),
            Ok(LcdRequest::MoveCursor(CursorDirection::Right))
        );
        assert_eq!(
            parse_line(":entry left shift"),
            Ok(LcdRequest::EntryMode {
                direction: CursorDirection::Left,
                shift: true,
            })
        );
        assert_eq!(parse_line(":cmd 0x01"), Ok(LcdRequest::Command(0x01)));
        assert_eq!(parse_line(":data 65"), Ok(LcdRequest::Data(b'A')));
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert!(matches!(parse_line(":nope"), Err(ConsoleError::UnknownCommand(_))));
        assert!(matches!(parse_line(":goto 1"), Err(ConsoleError::BadArguments(..))));
        assert!(matches!(parse_line(":cursor maybe"), Err(ConsoleError::BadArguments(..))));
        assert!(matches!(parse_line(":data 0x100"), Err(ConsoleError::BadNumber(_))));
    }
}
