use crate::lcd::hd44780::{LcdPin, LcdResult, PinSet, Timing};
use log::trace;

/// Gets the levels of D4, D5, D6 and D7 for the given nibble. D4 carries the least significant
/// bit. Bits above the lowest four are ignored.
pub fn nibble_levels(nibble: u8) -> [bool; 4] {
    let mut values = [false; 4];
    for (i, value) in values.iter_mut().enumerate() {
        *value = (nibble & (1 << i)) != 0;
    }
    values
}

/// Writes a nibble to the data lines and latches it into the controller.
///
/// RS is driven first, then D4 to D7, then E goes low, high and low again. The controller
/// latches on the falling edge. The first failing write aborts the rest, so a nibble is never
/// latched from a half-written bus.
///
/// # Errors
/// - [crate::lcd::hd44780::LcdError::PinWrite] naming the line that failed.
pub fn write_nibble(
    pins: &PinSet<'_>,
    nibble: u8,
    register_select: bool,
    timing: &Timing,
) -> LcdResult<()> {
    trace!("Writing nibble: {:04b}, RS: {}", nibble & 0x0F, register_select);

    pins.write(LcdPin::RegisterSelect, register_select)?;

    for (pin, value) in LcdPin::DATA.into_iter().zip(nibble_levels(nibble)) {
        pins.write(pin, value)?;
    }

    pins.write(LcdPin::Enable, false)?;
    pins.write(LcdPin::Enable, true)?;
    Timing::wait(timing.enable_pulse_us);
    pins.write(LcdPin::Enable, false)?;

    Ok(())
}
