//! HD44780 LCD module, driven over GPIO in 4-bit mode.
//!
//! The layers, from the bottom up:
//! - [PinSet] owns the six output pins (E, RS, D4 to D7) and acquires or releases them as a unit.
//! - [write_nibble] puts four bits on the data lines and strobes E.
//! - [write_byte] sends a byte as two nibbles, high nibble first.
//! - [HD44780Engine] is the protocol state machine on top, owning the pins and the
//!   [DisplayConfig].
//! - [HD44780Handle] owns an engine on a worker thread, serializes all calls into it and
//!   re-initializes it from scratch after a fault.
//!
//! The R/W line is not driven, it has to be tied to GND, so the controller is never read.
//! The waits the controller needs after each instruction are taken from [Timing].

mod byte;
pub mod command;
mod config;
mod engine;
mod handle;
mod nibble;
mod pins;

pub use byte::*;
pub use config::*;
pub use engine::*;
pub use handle::*;
pub use nibble::*;
pub use pins::*;

use crate::GpioError;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use thiserror::Error;

/// One of the six lines connecting the controller in 4-bit mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LcdPin {
    Enable,
    RegisterSelect,
    Data4,
    Data5,
    Data6,
    Data7,
}

impl LcdPin {
    /// The data lines, in bit order (D4 carries bit 0 of a nibble).
    pub const DATA: [LcdPin; 4] = [LcdPin::Data4, LcdPin::Data5, LcdPin::Data6, LcdPin::Data7];
}

impl Display for LcdPin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            LcdPin::Enable => "E",
            LcdPin::RegisterSelect => "RS",
            LcdPin::Data4 => "D4",
            LcdPin::Data5 => "D5",
            LcdPin::Data6 => "D6",
            LcdPin::Data7 => "D7",
        };
        write!(f, "{}", str)
    }
}

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    /// One of the six pins could not be opened. Pins opened before it were released.
    #[error("failed to acquire the {pin} pin (GPIO {index}): {cause}")]
    PinAcquisition {
        pin: LcdPin,
        index: usize,
        #[source]
        cause: GpioError,
    },
    /// A pin write failed in the middle of a transfer. The display has to be re-initialized.
    #[error("failed to write the {pin} pin: {cause}")]
    PinWrite {
        pin: LcdPin,
        #[source]
        cause: GpioError,
    },
    /// The operation isn't permitted in the current engine state.
    #[error("{operation} is not permitted while the display is {state}")]
    Protocol {
        operation: &'static str,
        state: EngineState,
    },
    #[error("invalid display configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("position ({row}, {col}) is outside of the display")]
    OutOfRange { row: usize, col: usize },
    #[error("DDRAM address {0:#04x} is out of range")]
    InvalidAddress(u8),
    #[error("GPIO driver unavailable: {0}")]
    Driver(#[source] GpioError),
    /// The worker thread could not be started.
    #[error("failed to start the display worker: {0}")]
    WorkerSpawn(ErrorKind),
    #[error("display worker is not running")]
    Disconnected,
    #[error("display worker did not answer in time")]
    Timeout,
}

pub type LcdResult<T> = Result<T, LcdError>;
