//! In-memory GPIO driver that records every pin operation.
//!
//! Useful for tests and for dry runs without any hardware attached. Failures can be injected
//! per pin, both when opening and when writing. Dry runs should use [MockGpioDriver::unrecorded],
//! which keeps the pin bookkeeping but only logs the writes.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use log::trace;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::sleep;
use std::time::Duration;

/// A single pin operation observed by [MockGpioDriver].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// The pin was opened as an output.
    Opened(usize),
    /// The pin was driven to the given level.
    Write(usize, bool),
    /// The pin handle was dropped.
    Released(usize),
}

#[derive(Debug, Default)]
struct MockState {
    recording: bool,
    events: Vec<MockEvent>,
    write_delay: Option<Duration>,
    open: BTreeSet<usize>,
    fail_open: BTreeSet<usize>,
    fail_write: BTreeSet<usize>,
}

impl MockState {
    fn record(&mut self, event: MockEvent) {
        if self.recording {
            self.events.push(event);
        }
    }
}

/// Recording GPIO driver. Clones share the same state, so a test can keep a clone around to
/// inspect what happened to a driver that was moved elsewhere.
#[derive(Clone)]
pub struct MockGpioDriver {
    pin_count: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockGpioDriver {
    pub fn new(pin_count: usize) -> Self {
        Self::with_recording(pin_count, true)
    }

    /// Creates a driver that doesn't keep any events, so it can run indefinitely.
    pub fn unrecorded(pin_count: usize) -> Self {
        Self::with_recording(pin_count, false)
    }

    fn with_recording(pin_count: usize, recording: bool) -> Self {
        Self {
            pin_count,
            state: Arc::new(Mutex::new(MockState {
                recording,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following attempt to open the pin fail.
    pub fn fail_open(&self, index: usize) {
        self.state().fail_open.insert(index);
    }

    /// Makes every following write to the pin fail.
    pub fn fail_write(&self, index: usize) {
        self.state().fail_write.insert(index);
    }

    /// Makes every following write block for `delay` before it happens, or stops doing so.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.state().write_delay = delay;
    }

    /// Removes all injected failures.
    pub fn heal(&self) {
        let mut state = self.state();
        state.fail_open.clear();
        state.fail_write.clear();
    }

    /// Gets all recorded events, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Gets only the recorded writes as `(pin, level)` pairs, oldest first.
    pub fn writes(&self) -> Vec<(usize, bool)> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match *event {
                MockEvent::Write(index, value) => Some((index, value)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Gets the pins currently held open.
    pub fn open_pins(&self) -> Vec<usize> {
        self.state().open.iter().copied().collect()
    }
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.pin_count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.pin_count)
    }

    fn open_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.pin_count {
            return Err(GpioError::InvalidArgument);
        }

        let mut state = self.state();
        if state.fail_open.contains(&index) {
            return Err(GpioError::Io(ErrorKind::PermissionDenied));
        }
        if !state.open.insert(index) {
            return Err(GpioError::AlreadyInUse);
        }
        state.record(MockEvent::Opened(index));

        Ok(Box::new(MockGpioOutput {
            state: Arc::clone(&self.state),
            pin_index: index,
        }))
    }
}

struct MockGpioOutput {
    state: Arc<Mutex<MockState>>,
    pin_index: usize,
}

impl MockGpioOutput {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for MockGpioOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioOutput[{}]", self.pin_index)
    }
}

impl GpioOutput for MockGpioOutput {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn write(&self, value: bool) -> GpioResult<()> {
        let delay = self.state().write_delay;
        if let Some(delay) = delay {
            sleep(delay);
        }

        let mut state = self.state();
        if state.fail_write.contains(&self.pin_index) {
            return Err(GpioError::Io(ErrorKind::BrokenPipe));
        }
        trace!("GPIO {} <- {}", self.pin_index, value as u8);
        state.record(MockEvent::Write(self.pin_index, value));
        Ok(())
    }
}

impl Drop for MockGpioOutput {
    fn drop(&mut self) {
        let mut state = self.state();
        state.open.remove(&self.pin_index);
        state.record(MockEvent::Released(self.pin_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_open_write_release() {
        let driver = MockGpioDriver::new(8);
        {
            let pin = driver.open_output(3).unwrap();
            pin.write(true).unwrap();
            assert_eq!(driver.open_pins(), vec![3]);
        }
        assert_eq!(
            driver.events(),
            vec![
                MockEvent::Opened(3),
                MockEvent::Write(3, true),
                MockEvent::Released(3),
            ]
        );
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn rejects_double_open_and_out_of_range() {
        let driver = MockGpioDriver::new(4);
        let _pin = driver.open_output(1).unwrap();
        assert_eq!(driver.open_output(1).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(driver.open_output(4).unwrap_err(), GpioError::InvalidArgument);
    }

    #[test]
    fn injected_write_failure_is_not_recorded() {
        let driver = MockGpioDriver::new(4);
        let pin = driver.open_output(2).unwrap();
        driver.fail_write(2);
        assert!(pin.write(true).is_err());
        driver.heal();
        pin.write(false).unwrap();
        assert_eq!(driver.writes(), vec![(2, false)]);
    }

    #[test]
    fn unrecorded_driver_keeps_no_events() {
        let driver = MockGpioDriver::unrecorded(4);
        let pin = driver.open_output(0).unwrap();
        for i in 0..10_000 {
            pin.write(i % 2 == 0).unwrap();
        }
        assert_eq!(driver.open_pins(), vec![0]);
        assert!(driver.events().is_empty());

        driver.fail_write(0);
        assert!(pin.write(true).is_err());
        drop(pin);
        assert!(driver.open_pins().is_empty());
    }

    #[test]
    fn write_delay_holds_back_the_write() {
        let driver = MockGpioDriver::new(4);
        let pin = driver.open_output(1).unwrap();
        driver.set_write_delay(Some(Duration::from_millis(20)));

        let started = std::time::Instant::now();
        pin.write(true).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));

        driver.set_write_delay(None);
        pin.write(false).unwrap();
        assert_eq!(driver.writes(), vec![(1, true), (1, false)]);
    }
}
