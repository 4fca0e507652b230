#![allow(dead_code)]

use std::cell::Cell;
use std::convert::Infallible;

use embassy_sync::{blocking_mutex::raw::NoopRawMutex, pipe::Pipe};
use embassy_time::{Duration, Instant};
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_io::{ErrorKind, Read, Write};
use hoplink::{Clock, Serial};

pub const PIPE_LENGTH: usize = 64;

/// One full-duplex serial line between two devices.
pub struct MockLine<const N: usize = PIPE_LENGTH> {
    upstream: Pipe<NoopRawMutex, N>,
    downstream: Pipe<NoopRawMutex, N>,
}

/// The end of a [`MockLine`] seen by one device.
pub struct MockSerial<'a, const N: usize = PIPE_LENGTH> {
    pub rx: &'a Pipe<NoopRawMutex, N>,
    pub tx: &'a Pipe<NoopRawMutex, N>,
}

impl<const N: usize> MockLine<N> {
    pub fn new() -> Self {
        Self {
            upstream: Pipe::new(),
            downstream: Pipe::new(),
        }
    }

    /// Returns the parent's socket side and the child's plug side.
    pub fn split(&self) -> (MockSerial<'_, N>, MockSerial<'_, N>) {
        let parent = MockSerial {
            rx: &self.upstream,
            tx: &self.downstream,
        };
        let child = MockSerial {
            rx: &self.downstream,
            tx: &self.upstream,
        };
        (parent, child)
    }

    /// Bytes travelling from the parent to the child.
    pub fn downstream(&self) -> &Pipe<NoopRawMutex, N> {
        &self.downstream
    }

    /// Bytes travelling from the child to the parent.
    pub fn upstream(&self) -> &Pipe<NoopRawMutex, N> {
        &self.upstream
    }
}

impl<const N: usize> embedded_io::ErrorType for MockSerial<'_, N> {
    type Error = Infallible;
}

impl<const N: usize> embedded_io::Read for MockSerial<'_, N> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.rx.try_read(buf).unwrap_or(0))
    }
}

impl<const N: usize> embedded_io::Write for MockSerial<'_, N> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.tx.try_write(buf).unwrap_or(0))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(()) // No-op
    }
}

impl<const N: usize> Serial for MockSerial<'_, N> {
    fn available(&self) -> usize {
        self.rx.len()
    }

    fn available_for_write(&self) -> usize {
        self.tx.free_capacity()
    }
}

/// Serial line that injects stream errors on top of a [`MockSerial`].
pub struct FaultySerial<'a, const N: usize = PIPE_LENGTH> {
    pub inner: MockSerial<'a, N>,
    /// Number of upcoming reads that fail.
    pub failing_reads: usize,
    /// Bytes accepted before every further write fails.
    pub write_budget: Option<usize>,
}

impl<const N: usize> embedded_io::ErrorType for FaultySerial<'_, N> {
    type Error = ErrorKind;
}

impl<const N: usize> embedded_io::Read for FaultySerial<'_, N> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(ErrorKind::Other);
        }

        let Ok(len) = self.inner.read(buf);
        Ok(len)
    }
}

impl<const N: usize> embedded_io::Write for FaultySerial<'_, N> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let len = match self.write_budget {
            Some(0) => return Err(ErrorKind::Other),
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };

        let Ok(written) = self.inner.write(&buf[..len]);
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= written;
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<const N: usize> Serial for FaultySerial<'_, N> {
    fn available(&self) -> usize {
        self.inner.available()
    }

    fn available_for_write(&self) -> usize {
        self.inner.available_for_write()
    }
}

/// Manually advanced clock.
pub struct MockClock {
    now: Cell<Instant>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::from_secs(1)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn advance_micros(&self, micros: u64) {
        self.advance(Duration::from_micros(micros));
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Transmit enable line whose level the test can observe.
pub struct MockPin<'a>(pub &'a Cell<bool>);

impl ErrorType for MockPin<'_> {
    type Error = Infallible;
}

impl OutputPin for MockPin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// Drain everything currently buffered in `pipe`.
pub fn drain<const N: usize>(pipe: &Pipe<NoopRawMutex, N>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; N];
    while let Ok(len) = pipe.try_read(&mut buf) {
        out.extend_from_slice(&buf[..len]);
    }
    out
}

/// Push raw bytes onto `pipe`.
pub fn inject<const N: usize>(pipe: &Pipe<NoopRawMutex, N>, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let len = pipe.try_write(bytes).expect("pipe full");
        bytes = &bytes[len..];
    }
}
