use crate::GpioDriver;
use crate::lcd::hd44780::{
    CursorDirection, DisplayConfig, LcdError, LcdPin, LcdResult, PinNumbers, PinSet, Timing,
    command, write_byte, write_nibble,
};
use log::{debug, trace, warn};
use std::fmt::{Display, Formatter};

/// State of a [HD44780Engine].
///
/// There is no "uninitialized" state: an engine only exists once its pins were acquired.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EngineState {
    /// All six pins are held, the controller hasn't been configured yet.
    PinsAcquired,
    /// The controller is in 4-bit mode and knows the display layout.
    FunctionSet,
    /// The display is on, cleared, and the entry mode is set.
    Ready,
    /// A pin write failed mid-transfer. The controller state is unknown; the only way out is
    /// [HD44780Engine::shutdown] and initializing again.
    Faulted,
}

impl EngineState {
    fn accepts_writes(self) -> bool {
        matches!(self, EngineState::FunctionSet | EngineState::Ready)
    }
}

impl Display for EngineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            EngineState::PinsAcquired => "pins acquired",
            EngineState::FunctionSet => "function set",
            EngineState::Ready => "ready",
            EngineState::Faulted => "faulted",
        };
        write!(f, "{}", str)
    }
}

/// Display on/off control flags, remembered so they can be toggled one at a time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayControl {
    pub display_on: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
}

impl Default for DisplayControl {
    fn default() -> Self {
        DisplayControl {
            display_on: true,
            cursor_on: false,
            blink_on: false,
        }
    }
}

/// Protocol engine for a HD44780 display in 4-bit mode.
///
/// Owns the [PinSet] and the [DisplayConfig]. Any pin failure moves the engine to
/// [EngineState::Faulted], after which every operation fails with [LcdError::Protocol]
/// without touching the pins.
#[derive(Debug)]
pub struct HD44780Engine<'a> {
    pins: PinSet<'a>,
    timing: Timing,
    state: EngineState,
    config: Option<DisplayConfig>,
    control: DisplayControl,
    powered_up: bool,
}

impl<'a> HD44780Engine<'a> {
    /// Acquires the pins. The controller isn't touched yet, see [Self::function_set].
    pub fn initialize(
        driver: &'a dyn GpioDriver,
        numbers: PinNumbers,
        timing: Timing,
    ) -> LcdResult<Self> {
        let pins = PinSet::acquire(driver, numbers)?;
        debug!("HD44780 engine: pins acquired");
        Ok(HD44780Engine {
            pins,
            timing,
            state: EngineState::PinsAcquired,
            config: None,
            control: DisplayControl::default(),
            powered_up: false,
        })
    }

    /// Runs the whole initialization: acquires the pins, sets the function and runs the
    /// [setup](Self::setup) sequence, leaving the engine [EngineState::Ready].
    ///
    /// On failure the pins are released and no engine is returned.
    pub fn start(
        driver: &'a dyn GpioDriver,
        numbers: PinNumbers,
        config: DisplayConfig,
        timing: Timing,
    ) -> LcdResult<Self> {
        let mut engine = Self::initialize(driver, numbers, timing)?;
        engine.function_set(config)?;
        engine.setup()?;
        Ok(engine)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Gets the display configuration applied by the last successful function set.
    pub fn config(&self) -> Option<DisplayConfig> {
        self.config
    }

    pub fn display_control(&self) -> DisplayControl {
        self.control
    }

    /// Runs `f` if the engine is in one of the `allowed` states, faulting it if `f` fails with
    /// a pin error.
    fn run<T>(
        &mut self,
        operation: &'static str,
        allowed: fn(EngineState) -> bool,
        f: impl FnOnce(&PinSet<'a>, &Timing) -> LcdResult<T>,
    ) -> LcdResult<T> {
        if !allowed(self.state) {
            return Err(LcdError::Protocol {
                operation,
                state: self.state,
            });
        }

        let result = f(&self.pins, &self.timing);
        if let Err(err @ LcdError::PinWrite { .. }) = &result {
            warn!("HD44780 engine faulted during {}: {}", operation, err);
            self.state = EngineState::Faulted;
        }
        result
    }

    /// Puts the controller into 4-bit mode and sends the function set instruction for `config`.
    ///
    /// Allowed before and after [setup](Self::setup); re-issuing it runs the whole sequence
    /// again. The configuration is stored only once every write succeeded.
    pub fn function_set(&mut self, config: DisplayConfig) -> LcdResult<()> {
        if self.state == EngineState::Faulted {
            return Err(LcdError::Protocol {
                operation: "function set",
                state: self.state,
            });
        }
        config.validate()?;

        let power_on_us = if self.powered_up { 0 } else { self.timing.power_on_us };
        let instruction = command::function_set(false, config.multiline(), config.font);

        self.run(
            "function set",
            |state| state != EngineState::Faulted,
            |pins, timing| {
                pins.write(LcdPin::RegisterSelect, false)?;
                Timing::wait(power_on_us);

                // Three times 0011 gets the controller into 8-bit mode from any state, even
                // halfway through a 4-bit byte. 0010 then switches it to 4-bit mode.
                for _ in 0..3 {
                    write_nibble(pins, command::SYNC_8BIT_NIBBLE, false, timing)?;
                    Timing::wait(timing.sync_us);
                }
                write_nibble(pins, command::SYNC_4BIT_NIBBLE, false, timing)?;
                Timing::wait(timing.execution_us);

                write_byte(pins, instruction, false, timing)
            },
        )?;

        self.powered_up = true;
        self.config = Some(config);
        if self.state == EngineState::PinsAcquired {
            self.state = EngineState::FunctionSet;
        }
        debug!("HD44780 engine: function set to {:?}", config);
        Ok(())
    }

    /// Turns the display on, clears it and sets the entry mode from the configured direction.
    pub fn setup(&mut self) -> LcdResult<()> {
        let direction = self.require_config("setup")?.direction;
        let control = DisplayControl::default();

        self.run("setup", EngineState::accepts_writes, |pins, timing| {
            write_byte(
                pins,
                command::display_control(control.display_on, control.cursor_on, control.blink_on),
                false,
                timing,
            )?;
            write_byte(pins, command::CLEAR_DISPLAY, false, timing)?;
            Timing::wait(timing.long_execution_us);
            write_byte(
                pins,
                command::entry_mode(direction.cursor_direction(), false),
                false,
                timing,
            )
        })?;

        self.control = control;
        self.state = EngineState::Ready;
        debug!("HD44780 engine: ready");
        Ok(())
    }

    fn require_config(&self, operation: &'static str) -> LcdResult<DisplayConfig> {
        self.config.ok_or(LcdError::Protocol {
            operation,
            state: self.state,
        })
    }

    /// Sends an instruction byte (RS low).
    pub fn write_command(&mut self, command: u8) -> LcdResult<()> {
        trace!("Command: {:#04x}", command);
        self.run("write command", EngineState::accepts_writes, |pins, timing| {
            write_byte(pins, command, false, timing)
        })
    }

    /// Sends a data byte (RS high), e.g. a character code.
    pub fn write_data(&mut self, data: u8) -> LcdResult<()> {
        trace!("Data: {:#04x}", data);
        self.run("write data", EngineState::accepts_writes, |pins, timing| {
            write_byte(pins, data, true, timing)
        })
    }

    /// Sends an instruction that needs the long execution time, like clear or home.
    fn write_slow_command(&mut self, command: u8) -> LcdResult<()> {
        self.write_command(command)?;
        Timing::wait(self.timing.long_execution_us);
        Ok(())
    }

    /// Clears the display and sets the cursor to the home position.
    pub fn clear_display(&mut self) -> LcdResult<()> {
        self.write_slow_command(command::CLEAR_DISPLAY)
    }

    /// Sets the cursor to the home position and undoes any scrolling.
    pub fn return_home(&mut self) -> LcdResult<()> {
        self.write_slow_command(command::RETURN_HOME)
    }

    /// Sets the direction the cursor moves in after each character, and whether the display
    /// shifts with it.
    pub fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> LcdResult<()> {
        self.write_command(command::entry_mode(cursor_direction, shift))
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    pub fn set_display_control(&mut self, control: DisplayControl) -> LcdResult<()> {
        self.write_command(command::display_control(
            control.display_on,
            control.cursor_on,
            control.blink_on,
        ))?;
        self.control = control;
        Ok(())
    }

    pub fn show_display(&mut self, on: bool) -> LcdResult<()> {
        self.set_display_control(DisplayControl {
            display_on: on,
            ..self.control
        })
    }

    pub fn show_cursor(&mut self, on: bool) -> LcdResult<()> {
        self.set_display_control(DisplayControl {
            cursor_on: on,
            ..self.control
        })
    }

    pub fn blink_cursor(&mut self, on: bool) -> LcdResult<()> {
        self.set_display_control(DisplayControl {
            blink_on: on,
            ..self.control
        })
    }

    /// Moves the cursor by one position without writing anything.
    pub fn move_cursor(&mut self, direction: CursorDirection) -> LcdResult<()> {
        self.write_command(command::cursor_shift(false, direction))
    }

    /// Shifts the whole display content by one position.
    pub fn scroll(&mut self, direction: CursorDirection) -> LcdResult<()> {
        self.write_command(command::cursor_shift(true, direction))
    }

    /// Sets the DDRAM address, i.e. where the next character goes. Addresses the controller
    /// doesn't have in the configured line mode are rejected.
    pub fn set_ddram_address(&mut self, address: u8) -> LcdResult<()> {
        let config = self.require_config("set DDRAM address")?;
        if !config.is_ddram_address(address) {
            return Err(LcdError::InvalidAddress(address));
        }
        self.write_command(command::set_ddram_address(address))
    }

    /// Moves the cursor to the given row and column, both counted from zero.
    pub fn set_cursor(&mut self, row: usize, col: usize) -> LcdResult<()> {
        let config = self.require_config("set cursor")?;
        if row >= config.lines as usize || col >= config.cols as usize {
            return Err(LcdError::OutOfRange { row, col });
        }
        self.set_ddram_address(config.row_offset(row as u8) + col as u8)
    }

    /// Writes a string at the cursor position. Anything outside of ASCII is shown as `?`.
    pub fn print(&mut self, s: &str) -> LcdResult<()> {
        for c in s.chars() {
            if c.is_ascii() {
                self.write_data(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                self.write_data(b'?')?;
            }
        }
        Ok(())
    }

    /// Releases all pins. The display keeps showing whatever it showed.
    pub fn shutdown(self) {
        debug!("HD44780 engine: shutting down in the {} state", self.state);
        self.pins.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::{Font, TextDirection};
    use crate::mock::MockGpioDriver;

    const E: usize = 17;
    const RS: usize = 27;
    const D4: usize = 22;
    const D5: usize = 23;
    const D6: usize = 24;
    const D7: usize = 25;

    fn numbers() -> PinNumbers {
        PinNumbers::new(E, RS, [D4, D5, D6, D7])
    }

    fn config() -> DisplayConfig {
        DisplayConfig {
            font: Font::Dots5x8,
            lines: 2,
            cols: 16,
            direction: TextDirection::LeftToRight,
        }
    }

    /// Expected writes for one nibble.
    fn nibble(rs: bool, value: u8) -> Vec<(usize, bool)> {
        vec![
            (RS, rs),
            (D4, value & 0b0001 != 0),
            (D5, value & 0b0010 != 0),
            (D6, value & 0b0100 != 0),
            (D7, value & 0b1000 != 0),
            (E, false),
            (E, true),
            (E, false),
        ]
    }

    #[test]
    fn write_data_produces_the_expected_pin_sequence() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);

        driver.clear_events();
        engine.write_data(0x41).unwrap();

        let expected: Vec<_> = [nibble(true, 0x4), nibble(true, 0x1)].concat();
        assert_eq!(driver.writes(), expected);
    }

    #[test]
    fn start_sends_the_full_initialization_sequence() {
        let driver = MockGpioDriver::new(28);
        let _engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        let expected: Vec<_> = [
            vec![(RS, false)],
            nibble(false, 0x3),
            nibble(false, 0x3),
            nibble(false, 0x3),
            nibble(false, 0x2),
            // function set 0x28: 4-bit, two lines, 5x8
            nibble(false, 0x2),
            nibble(false, 0x8),
            // display on, cursor off, blink off
            nibble(false, 0x0),
            nibble(false, 0xC),
            // clear
            nibble(false, 0x0),
            nibble(false, 0x1),
            // entry mode, increment
            nibble(false, 0x0),
            nibble(false, 0x6),
        ]
        .concat();
        assert_eq!(driver.writes(), expected);
    }

    #[test]
    fn write_data_before_function_set_is_a_protocol_error() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::initialize(&driver, numbers(), Timing::immediate()).unwrap();
        assert_eq!(engine.state(), EngineState::PinsAcquired);

        let err = engine.write_data(b'A').unwrap_err();
        assert_eq!(
            err,
            LcdError::Protocol {
                operation: "write data",
                state: EngineState::PinsAcquired,
            }
        );
        assert!(driver.writes().is_empty());
        // A rejected call doesn't fault the engine.
        assert_eq!(engine.state(), EngineState::PinsAcquired);
    }

    #[test]
    fn function_set_is_idempotent_on_the_stored_config() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::initialize(&driver, numbers(), Timing::immediate()).unwrap();

        engine.function_set(config()).unwrap();
        let first = driver.writes();
        assert_eq!(engine.state(), EngineState::FunctionSet);
        assert_eq!(engine.config(), Some(config()));

        driver.clear_events();
        engine.function_set(config()).unwrap();
        assert_eq!(engine.config(), Some(config()));
        assert_eq!(driver.writes(), first);
    }

    #[test]
    fn function_set_keeps_the_ready_state() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();
        let single_line = DisplayConfig {
            lines: 1,
            font: Font::Dots5x10,
            ..config()
        };
        engine.function_set(single_line).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.config(), Some(single_line));
    }

    #[test]
    fn invalid_config_is_rejected_without_pin_traffic() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::initialize(&driver, numbers(), Timing::immediate()).unwrap();
        let err = engine
            .function_set(DisplayConfig {
                lines: 0,
                ..config()
            })
            .unwrap_err();
        assert!(matches!(err, LcdError::InvalidConfig(_)));
        assert!(driver.writes().is_empty());
        assert_eq!(engine.state(), EngineState::PinsAcquired);
        assert_eq!(engine.config(), None);
    }

    #[test]
    fn pin_failure_faults_the_engine() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.fail_write(D6);
        let err = engine.write_data(b'A').unwrap_err();
        assert!(matches!(err, LcdError::PinWrite { pin: LcdPin::Data6, .. }));
        assert_eq!(engine.state(), EngineState::Faulted);

        driver.heal();
        driver.clear_events();
        let err = engine.write_data(b'B').unwrap_err();
        assert_eq!(
            err,
            LcdError::Protocol {
                operation: "write data",
                state: EngineState::Faulted,
            }
        );
        assert!(driver.events().is_empty());
        assert!(matches!(engine.function_set(config()), Err(LcdError::Protocol { .. })));
        assert!(driver.events().is_empty());
    }

    #[test]
    fn failed_function_set_does_not_apply_the_config() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::initialize(&driver, numbers(), Timing::immediate()).unwrap();
        driver.fail_write(E);

        assert!(matches!(
            engine.function_set(config()),
            Err(LcdError::PinWrite { pin: LcdPin::Enable, .. })
        ));
        assert_eq!(engine.state(), EngineState::Faulted);
        assert_eq!(engine.config(), None);
    }

    #[test]
    fn failed_start_releases_every_pin() {
        let driver = MockGpioDriver::new(28);
        driver.fail_write(D7);
        let result = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate());
        assert!(matches!(result, Err(LcdError::PinWrite { pin: LcdPin::Data7, .. })));
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn shutdown_releases_every_pin() {
        let driver = MockGpioDriver::new(28);
        let engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();
        assert_eq!(driver.open_pins().len(), 6);
        engine.shutdown();
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn set_cursor_uses_row_offsets_and_bounds() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.clear_events();
        engine.set_cursor(1, 3).unwrap();
        // 0x80 | 0x43
        let expected: Vec<_> = [nibble(false, 0xC), nibble(false, 0x3)].concat();
        assert_eq!(driver.writes(), expected);

        assert_eq!(
            engine.set_cursor(2, 0).unwrap_err(),
            LcdError::OutOfRange { row: 2, col: 0 }
        );
        assert_eq!(
            engine.set_cursor(0, 16).unwrap_err(),
            LcdError::OutOfRange { row: 0, col: 16 }
        );
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn ddram_gaps_are_rejected_without_pin_traffic() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.clear_events();
        for address in [0x28, 0x3F, 0x68, 0x7F, 0x80] {
            assert_eq!(
                engine.set_ddram_address(address).unwrap_err(),
                LcdError::InvalidAddress(address)
            );
        }
        assert!(driver.events().is_empty());
        assert_eq!(engine.state(), EngineState::Ready);

        engine.set_ddram_address(0x67).unwrap();
        // 0x80 | 0x67
        let expected: Vec<_> = [nibble(false, 0xE), nibble(false, 0x7)].concat();
        assert_eq!(driver.writes(), expected);
    }

    #[test]
    fn toggles_remember_the_other_flags() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        engine.show_cursor(true).unwrap();
        engine.blink_cursor(true).unwrap();
        driver.clear_events();
        engine.show_display(false).unwrap();

        // 0b00001011: display off, cursor on, blink on
        let expected: Vec<_> = [nibble(false, 0x0), nibble(false, 0xB)].concat();
        assert_eq!(driver.writes(), expected);
        assert_eq!(
            engine.display_control(),
            DisplayControl {
                display_on: false,
                cursor_on: true,
                blink_on: true,
            }
        );
    }

    #[test]
    fn print_replaces_non_ascii() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.clear_events();
        engine.print("Ä").unwrap();
        let expected: Vec<_> = [nibble(true, 0x3), nibble(true, 0xF)].concat();
        assert_eq!(driver.writes(), expected);
    }

    #[test]
    fn cursor_move_and_entry_mode() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.clear_events();
        engine.move_cursor(CursorDirection::Right).unwrap();
        engine.set_entry_mode(CursorDirection::Left, true).unwrap();
        let expected: Vec<_> = [
            nibble(false, 0x1),
            nibble(false, 0x4),
            nibble(false, 0x0),
            nibble(false, 0x5),
        ]
        .concat();
        assert_eq!(driver.writes(), expected);
    }

    #[test]
    fn scroll_sends_display_shift() {
        let driver = MockGpioDriver::new(28);
        let mut engine = HD44780Engine::start(&driver, numbers(), config(), Timing::immediate()).unwrap();

        driver.clear_events();
        engine.scroll(CursorDirection::Left).unwrap();
        let expected: Vec<_> = [nibble(false, 0x1), nibble(false, 0x8)].concat();
        assert_eq!(driver.writes(), expected);
    }
}
