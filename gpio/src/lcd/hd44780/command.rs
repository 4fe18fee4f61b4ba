//! Instruction encoding for the HD44780 controller.
//!
//! Every function here is pure and returns the instruction byte to be written with RS low.

use crate::lcd::hd44780::{CursorDirection, Font};

/// Clears the display and sets the cursor to the home position.
pub const CLEAR_DISPLAY: u8 = 0b00000001;

/// Sets the cursor to the home position and undoes any display shift.
pub const RETURN_HOME: u8 = 0b00000010;

/// Nibble sent three times to force the controller into 8-bit mode, whatever state it's in.
pub const SYNC_8BIT_NIBBLE: u8 = 0b0011;

/// Nibble that switches the controller from 8-bit into 4-bit mode.
pub const SYNC_4BIT_NIBBLE: u8 = 0b0010;

/// Entry mode set: which way the cursor moves after each write, and whether the display
/// shifts along with it.
pub fn entry_mode(cursor_direction: CursorDirection, shift: bool) -> u8 {
    let mut command = 0b00000100;
    if cursor_direction == CursorDirection::Right {
        command |= 0b00000010;
    }
    if shift {
        command |= 0b00000001;
    }
    command
}

/// Display on/off control.
pub fn display_control(display_on: bool, cursor_on: bool, blink_on: bool) -> u8 {
    let mut command = 0b00001000;
    if display_on {
        command |= 0b00000100;
    }
    if cursor_on {
        command |= 0b00000010;
    }
    if blink_on {
        command |= 0b00000001;
    }
    command
}

/// Moves the cursor, or shifts the whole display, by one position.
pub fn cursor_shift(display_shift: bool, direction: CursorDirection) -> u8 {
    let mut command = 0b00010000;
    if display_shift {
        command |= 0b00001000;
    }
    if direction == CursorDirection::Right {
        command |= 0b00000100;
    }
    command
}

/// Function set. `eight_bit` is the DL bit; this driver always sends it cleared.
pub fn function_set(eight_bit: bool, two_lines: bool, font: Font) -> u8 {
    let mut command = 0b00100000;
    if eight_bit {
        command |= 0b00010000;
    }
    if two_lines {
        command |= 0b00001000;
    }
    if font == Font::Dots5x10 {
        command |= 0b00000100;
    }
    command
}

/// Sets the DDRAM address. Only the lower 7 bits are used.
pub fn set_ddram_address(address: u8) -> u8 {
    0b10000000 | (address & 0b01111111)
}
