use crate::lcd::hd44780::{LcdResult, PinSet, Timing, write_nibble};
use log::trace;

/// Splits a byte into its high and low nibble, in the order they go over the bus.
pub fn split_byte(byte: u8) -> (u8, u8) {
    ((byte >> 4) & 0x0F, byte & 0x0F)
}

/// Writes a byte as two nibbles, high nibble first, then waits for the controller to execute it.
///
/// `register_select` picks the register: `false` for an instruction, `true` for data.
/// If the high nibble fails, the low nibble is not sent.
pub fn write_byte(
    pins: &PinSet<'_>,
    byte: u8,
    register_select: bool,
    timing: &Timing,
) -> LcdResult<()> {
    trace!("Sending byte: {:08b}, RS: {}", byte, register_select);

    let (high_nibble, low_nibble) = split_byte(byte);
    write_nibble(pins, high_nibble, register_select, timing)?;
    write_nibble(pins, low_nibble, register_select, timing)?;
    Timing::wait(timing.execution_us);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::{LcdError, LcdPin, PinNumbers};
    use crate::mock::MockGpioDriver;

    const E: usize = 17;
    const RS: usize = 27;
    const DATA: [usize; 4] = [22, 23, 24, 25];

    /// Decodes the recorded writes back into `(rs, nibble)` pairs, one per enable pulse.
    fn latched_nibbles(writes: &[(usize, bool)]) -> Vec<(bool, u8)> {
        let mut rs = false;
        let mut bus = 0u8;
        let mut enable = false;
        let mut latched = Vec::new();
        for &(pin, value) in writes {
            if pin == RS {
                rs = value;
            } else if let Some(bit) = DATA.iter().position(|&d| d == pin) {
                bus = (bus & !(1 << bit)) | ((value as u8) << bit);
            } else if pin == E {
                if enable && !value {
                    latched.push((rs, bus));
                }
                enable = value;
            }
        }
        latched
    }

    #[test]
    fn split_byte_returns_high_then_low() {
        assert_eq!(split_byte(0x41), (0x4, 0x1));
        assert_eq!(split_byte(0xF0), (0xF, 0x0));
        assert_eq!(split_byte(0x0F), (0x0, 0xF));
    }

    #[test]
    fn every_byte_is_sent_as_two_nibbles_high_first() {
        let driver = MockGpioDriver::new(28);
        let pins = PinSet::acquire(&driver, PinNumbers::new(E, RS, DATA)).unwrap();

        for byte in 0..=255u8 {
            driver.clear_events();
            write_byte(&pins, byte, true, &Timing::immediate()).unwrap();
            assert_eq!(
                latched_nibbles(&driver.writes()),
                vec![(true, byte >> 4), (true, byte & 0x0F)],
                "byte {:#04x}",
                byte
            );
        }
    }

    #[test]
    fn command_bytes_keep_rs_low() {
        let driver = MockGpioDriver::new(28);
        let pins = PinSet::acquire(&driver, PinNumbers::new(E, RS, DATA)).unwrap();
        write_byte(&pins, 0x28, false, &Timing::immediate()).unwrap();
        assert_eq!(latched_nibbles(&driver.writes()), vec![(false, 0x2), (false, 0x8)]);
    }

    #[test]
    fn failed_high_nibble_skips_the_low_nibble() {
        let driver = MockGpioDriver::new(28);
        let pins = PinSet::acquire(&driver, PinNumbers::new(E, RS, DATA)).unwrap();
        driver.fail_write(E);

        let err = write_byte(&pins, 0xA5, true, &Timing::immediate()).unwrap_err();
        assert!(matches!(err, LcdError::PinWrite { pin: LcdPin::Enable, .. }));
        // RS and the four data lines of the high nibble only.
        assert_eq!(driver.writes().len(), 5);
    }
}
