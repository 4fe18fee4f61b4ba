use crate::lcd::hd44780::{LcdError, LcdPin, LcdResult, PinNumbers};
use crate::{GpioDriver, GpioOutput};
use log::{debug, warn};

/// The six output pins of a HD44780 display in 4-bit mode.
///
/// Either all six pins are held or none of them: [PinSet::acquire] releases whatever it already
/// opened before returning an error, and dropping the set releases every pin.
#[derive(Debug)]
pub struct PinSet<'a> {
    enable: Box<dyn GpioOutput + 'a>,
    register_select: Box<dyn GpioOutput + 'a>,
    data4: Box<dyn GpioOutput + 'a>,
    data5: Box<dyn GpioOutput + 'a>,
    data6: Box<dyn GpioOutput + 'a>,
    data7: Box<dyn GpioOutput + 'a>,
}

impl<'a> PinSet<'a> {
    /// Opens all six pins as outputs, in the order E, RS, D4, D5, D6, D7.
    ///
    /// # Errors
    /// - [LcdError::PinAcquisition] naming the first pin that couldn't be opened. All pins
    ///   opened before it have been released by the time the error is returned.
    pub fn acquire(driver: &'a dyn GpioDriver, numbers: PinNumbers) -> LcdResult<Self> {
        let open = move |pin: LcdPin, index: usize| {
            driver.open_output(index).map_err(|cause| {
                warn!("Could not open {} pin (GPIO {}): {}", pin, index, cause);
                LcdError::PinAcquisition { pin, index, cause }
            })
        };

        // Early returns drop the handles opened so far, which releases them.
        let enable = open(LcdPin::Enable, numbers.enable)?;
        let register_select = open(LcdPin::RegisterSelect, numbers.register_select)?;
        let data4 = open(LcdPin::Data4, numbers.data4)?;
        let data5 = open(LcdPin::Data5, numbers.data5)?;
        let data6 = open(LcdPin::Data6, numbers.data6)?;
        let data7 = open(LcdPin::Data7, numbers.data7)?;

        debug!("Acquired LCD pins {:?} on {:?}", numbers, driver);

        Ok(PinSet {
            enable,
            register_select,
            data4,
            data5,
            data6,
            data7,
        })
    }

    /// Releases all six pins.
    pub fn release(self) {
        debug!("Releasing LCD pins");
        drop(self);
    }

    /// Gets the output driving the given line.
    pub fn pin(&self, pin: LcdPin) -> &dyn GpioOutput {
        match pin {
            LcdPin::Enable => &*self.enable,
            LcdPin::RegisterSelect => &*self.register_select,
            LcdPin::Data4 => &*self.data4,
            LcdPin::Data5 => &*self.data5,
            LcdPin::Data6 => &*self.data6,
            LcdPin::Data7 => &*self.data7,
        }
    }

    /// Drives the given line to `value`.
    ///
    /// # Errors
    /// - [LcdError::PinWrite] naming the line if the write failed.
    pub fn write(&self, pin: LcdPin, value: bool) -> LcdResult<()> {
        self.pin(pin)
            .write(value)
            .map_err(|cause| LcdError::PinWrite { pin, cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioError;
    use crate::mock::{MockEvent, MockGpioDriver};

    fn numbers() -> PinNumbers {
        PinNumbers::new(17, 27, [22, 23, 24, 25])
    }

    #[test]
    fn acquires_all_six_pins() {
        let driver = MockGpioDriver::new(28);
        let pins = PinSet::acquire(&driver, numbers()).unwrap();
        assert_eq!(driver.open_pins(), vec![17, 22, 23, 24, 25, 27]);
        assert_eq!(pins.pin(LcdPin::Data6).index(), 24);

        pins.release();
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn failed_acquisition_releases_opened_pins() {
        let driver = MockGpioDriver::new(28);
        driver.fail_open(23);

        let err = PinSet::acquire(&driver, numbers()).unwrap_err();
        assert_eq!(
            err,
            LcdError::PinAcquisition {
                pin: LcdPin::Data5,
                index: 23,
                cause: GpioError::Io(std::io::ErrorKind::PermissionDenied),
            }
        );
        assert!(driver.open_pins().is_empty());

        let events = driver.events();
        for index in [17, 27, 22] {
            assert!(events.contains(&MockEvent::Opened(index)));
            assert!(events.contains(&MockEvent::Released(index)));
        }
        assert!(!events.contains(&MockEvent::Opened(23)));
    }

    #[test]
    fn duplicate_pin_numbers_are_rejected() {
        let driver = MockGpioDriver::new(28);
        let err = PinSet::acquire(&driver, PinNumbers::new(17, 17, [22, 23, 24, 25])).unwrap_err();
        assert!(matches!(
            err,
            LcdError::PinAcquisition { pin: LcdPin::RegisterSelect, cause: GpioError::AlreadyInUse, .. }
        ));
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn write_reports_the_failing_line() {
        let driver = MockGpioDriver::new(28);
        let pins = PinSet::acquire(&driver, numbers()).unwrap();
        driver.fail_write(27);
        let err = pins.write(LcdPin::RegisterSelect, true).unwrap_err();
        assert!(matches!(err, LcdError::PinWrite { pin: LcdPin::RegisterSelect, .. }));
    }
}
