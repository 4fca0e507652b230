//! Hardware boundary: serial stream, clock and transmit enable.

use core::convert::Infallible;

use embassy_time::Instant;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_io::{Read, Write};

/// Non-blocking byte stream of one link direction.
///
/// `read` and `write` are only called for as many bytes as `available` and
/// `available_for_write` report, so they never block.
pub trait Serial: Read + Write {
    /// Received bytes that can be read right now.
    fn available(&self) -> usize;

    /// Free room in the transmit buffer.
    fn available_for_write(&self) -> usize;
}

impl<T: Serial + ?Sized> Serial for &mut T {
    fn available(&self) -> usize {
        T::available(self)
    }

    fn available_for_write(&self) -> usize {
        T::available_for_write(self)
    }
}

/// Monotonic clock with at least microsecond resolution.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        C::now(self)
    }
}

/// Clock backed by the embassy-time driver linked into the final binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Placeholder for ports without a transmit enable line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTxEnable;

impl ErrorType for NoTxEnable {
    type Error = Infallible;
}

impl OutputPin for NoTxEnable {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
