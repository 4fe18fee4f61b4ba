//! Raspberry Pi GPIO driver poking the GPIO registers directly through a memory mapping of
//! `/dev/gpiomem` or `/dev/mem`.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

/// GPFSELn function code for input mode.
const FUNCTION_INPUT: u8 = 0b000;
/// GPFSELn function code for output mode.
const FUNCTION_OUTPUT: u8 = 0b001;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus, 0xFE200000 on the BCM2711
    const GPIO_BASE: u32 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
                .offset(offset)
                .len(4096)
                .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    /// Maps `/dev/gpiomem`, which exposes only the GPIO block and doesn't need root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block out of `/dev/mem`. Requires root.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift); // Clear the bits for this pin
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register
        let register_ptr = unsafe { mmap.add(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn open_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        // Latch low before switching the function so the line doesn't glitch high.
        self.raw_set_pin_output(index, false)?;
        self.raw_set_pin_function(index, FUNCTION_OUTPUT)?;
        self.used_pins.set_aliased(index, true);
        trace!("{:?} opened pin {} as output", self, index);

        Ok(Box::new(RawGpioOutput {
            driver: self,
            pin_index: index,
        }))
    }
}

struct RawGpioOutput<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn write(&self, value: bool) -> GpioResult<()> {
        self.driver.raw_set_pin_output(self.pin_index, value)
    }
}

impl Drop for RawGpioOutput<'_> {
    fn drop(&mut self) {
        // Best effort, the pin index was validated on open.
        let _ = self.driver.raw_set_pin_output(self.pin_index, false);
        let _ = self.driver.raw_set_pin_function(self.pin_index, FUNCTION_INPUT);
        self.driver.used_pins.set_aliased(self.pin_index, false);
        trace!("{:?} released", self);
    }
}
