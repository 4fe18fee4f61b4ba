pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A source of GPIO pins.
///
/// Every pin handed out by a driver is exclusively owned by the caller until the returned
/// handle is dropped, which releases the pin back to the driver.
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Opens the GPIO pin at the given index in output mode.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin is already held by another handle.
    fn open_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug {
    /// Gets the index of the GPIO pin this output drives.
    fn index(&self) -> usize;

    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}
