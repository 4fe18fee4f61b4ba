use crate::lcd::hd44780::{LcdError, LcdResult};
use serde::{Deserialize, Serialize};
use std::thread::sleep;
use std::time::Duration;

/// Character font of the display.
///
/// The 5x10 font is only available on single line displays.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Font {
    #[default]
    #[serde(rename = "5x8")]
    Dots5x8,
    #[serde(rename = "5x10")]
    Dots5x10,
}

/// Direction in which text is written.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl TextDirection {
    /// Gets the direction the cursor moves in after a character is written.
    pub fn cursor_direction(self) -> CursorDirection {
        match self {
            TextDirection::LeftToRight => CursorDirection::Right,
            TextDirection::RightToLeft => CursorDirection::Left,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorDirection {
    /// Moves the cursor (or the display) to the left.
    Left,
    /// Moves the cursor (or the display) to the right.
    Right,
}

/// Physical layout of the display, applied by the function set instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub font: Font,
    pub lines: u8,
    pub cols: u8,
    pub direction: TextDirection,
}

impl DisplayConfig {
    /// Size of the display data RAM in characters.
    const DDRAM_SIZE: usize = 80;

    /// Checks that the layout fits into the controller's display data RAM.
    pub fn validate(&self) -> LcdResult<()> {
        if !(1..=4).contains(&self.lines) {
            return Err(LcdError::InvalidConfig("lines must be between 1 and 4"));
        }
        if !(1..=40).contains(&self.cols) {
            return Err(LcdError::InvalidConfig("cols must be between 1 and 40"));
        }
        if self.lines as usize * self.cols as usize > Self::DDRAM_SIZE {
            return Err(LcdError::InvalidConfig("lines * cols must not exceed 80"));
        }
        Ok(())
    }

    /// Whether the controller should run in two line mode (the N bit of function set).
    ///
    /// Four line displays are wired as two long lines, so anything above one line sets it.
    pub fn multiline(&self) -> bool {
        self.lines > 1
    }

    /// Checks the address against the DDRAM of the controller in this mode: `0x00..=0x4F` with
    /// one line, `0x00..=0x27` and `0x40..=0x67` otherwise.
    pub fn is_ddram_address(&self, address: u8) -> bool {
        if self.multiline() {
            matches!(address, 0x00..=0x27 | 0x40..=0x67)
        } else {
            address <= 0x4F
        }
    }

    /// Gets the DDRAM address of the first character in the given row.
    pub fn row_offset(&self, row: u8) -> u8 {
        match row {
            0 => 0x00,
            1 => 0x40,
            2 => self.cols,
            _ => 0x40 + self.cols,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            font: Font::Dots5x8,
            lines: 2,
            cols: 16,
            direction: TextDirection::LeftToRight,
        }
    }
}

/// GPIO numbers of the six lines used in 4-bit mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PinNumbers {
    pub enable: usize,
    pub register_select: usize,
    pub data4: usize,
    pub data5: usize,
    pub data6: usize,
    pub data7: usize,
}

impl PinNumbers {
    /// Creates the pin numbers from E, RS and a 4-bit data bus given as D4 D5 D6 D7.
    pub fn new(enable: usize, register_select: usize, data: [usize; 4]) -> Self {
        let [data4, data5, data6, data7] = data;
        PinNumbers {
            enable,
            register_select,
            data4,
            data5,
            data6,
            data7,
        }
    }
}

impl Default for PinNumbers {
    fn default() -> Self {
        PinNumbers::new(17, 27, [22, 23, 24, 25])
    }
}

/// Delays the controller needs, in microseconds.
///
/// These only have to be long enough. The defaults are comfortable for a HD44780 running off
/// its internal oscillator at 5 V; slower clones might need longer ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// How long E is held high.
    pub enable_pulse_us: u64,
    /// Wait after each instruction or data write.
    pub execution_us: u64,
    /// Wait after clear display and return home.
    pub long_execution_us: u64,
    /// Wait before the first instruction after power on.
    pub power_on_us: u64,
    /// Wait after each of the 4-bit synchronization nibbles.
    pub sync_us: u64,
}

impl Timing {
    /// No delays at all. For fake drivers.
    pub const fn immediate() -> Self {
        Timing {
            enable_pulse_us: 0,
            execution_us: 0,
            long_execution_us: 0,
            power_on_us: 0,
            sync_us: 0,
        }
    }

    pub(crate) fn wait(us: u64) {
        if us > 0 {
            sleep(Duration::from_micros(us));
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            enable_pulse_us: 1,
            execution_us: 100,
            long_execution_us: 2_000,
            power_on_us: 50_000,
            sync_us: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_layouts_that_do_not_fit() {
        let mut config = DisplayConfig::default();
        assert_eq!(config.validate(), Ok(()));

        config.lines = 0;
        assert!(config.validate().is_err());

        config.lines = 4;
        config.cols = 20;
        assert_eq!(config.validate(), Ok(()));

        config.cols = 40;
        assert!(config.validate().is_err());

        config.lines = 2;
        config.cols = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ddram_addresses_depend_on_the_line_mode() {
        let two_lines = DisplayConfig::default();
        assert!(two_lines.is_ddram_address(0x27));
        assert!(two_lines.is_ddram_address(0x40));
        assert!(two_lines.is_ddram_address(0x67));
        assert!(!two_lines.is_ddram_address(0x28));
        assert!(!two_lines.is_ddram_address(0x3F));
        assert!(!two_lines.is_ddram_address(0x68));

        let one_line = DisplayConfig {
            lines: 1,
            ..DisplayConfig::default()
        };
        assert!(one_line.is_ddram_address(0x4F));
        assert!(!one_line.is_ddram_address(0x50));
    }

    #[test]
    fn row_offsets_follow_the_ddram_layout() {
        let config = DisplayConfig {
            lines: 4,
            cols: 20,
            ..DisplayConfig::default()
        };
        let offsets: Vec<u8> = (0..4).map(|row| config.row_offset(row)).collect();
        assert_eq!(offsets, vec![0x00, 0x40, 0x14, 0x54]);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: DisplayConfig =
            serde_json::from_str(r#"{ "font": "5x10", "lines": 1 }"#).unwrap();
        assert_eq!(config.font, Font::Dots5x10);
        assert_eq!(config.lines, 1);
        assert_eq!(config.cols, 16);
        assert_eq!(config.direction, TextDirection::LeftToRight);
    }
}
