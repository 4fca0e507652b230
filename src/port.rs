//! One direction of a link: framing, partial frame recovery and transmit
//! enable handling on top of a [`Serial`] stream.

use core::fmt;

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{Error as _, OutputPin};
use embedded_io::{Error as _, ErrorKind, ReadExactError};
use serde::{Deserialize, Serialize};

use crate::fmt::{debug, trace, warn};
use crate::io::{Clock, NoTxEnable, Serial};
use crate::packet::{FRAME_LEN, PAYLOAD_LEN, Packet, Pulse};

/// Line rate of the differential serial link.
pub const BAUD_RATE: u32 = 3_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortConfig {
    /// How long an incomplete frame may sit in the receive buffer before it
    /// is discarded.
    pub partial_timeout: Duration,
    /// Quiet time after which a port without transmit enable is idle.
    pub idle_window: Duration,
    /// Quiet time after which a port with transmit enable is idle and
    /// releases the line. Long enough to flush a full transmit buffer.
    pub tx_enable_window: Duration,
}

impl PortConfig {
    pub const DEFAULT: Self = Self {
        partial_timeout: Duration::from_micros(100),
        idle_window: Duration::from_millis(1),
        tx_enable_window: Duration::from_millis(100),
    };
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Frame counters. All counters wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    /// Complete frames received.
    pub input: u32,
    /// Frames written to the stream.
    pub output: u32,
    /// Partial frames discarded after the timeout.
    pub dropped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// Not enough room for a whole frame; nothing was written. Retry later.
    Full,
    /// The underlying stream failed to write.
    Io(ErrorKind),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Full => write!(f, "transmit buffer full"),
            SendError::Io(kind) => write!(f, "serial write failed: {:?}", kind),
        }
    }
}

/// The operations a [`Link`](crate::link::Link) needs from each of its ports.
pub trait Endpoint {
    /// Take one complete frame off the stream, if there is one.
    fn receive(&mut self) -> Option<Packet>;

    /// Write `packet` with its address replaced by `address`.
    fn send(&mut self, address: u8, packet: &Packet) -> Result<(), SendError>;

    fn is_idle(&self) -> bool;

    /// Release transmit enable once the port has been quiet long enough.
    /// Call after any sends of the same cycle.
    fn deactivate(&mut self);
}

impl<T: Endpoint + ?Sized> Endpoint for &mut T {
    fn receive(&mut self) -> Option<Packet> {
        T::receive(self)
    }

    fn send(&mut self, address: u8, packet: &Packet) -> Result<(), SendError> {
        T::send(self, address, packet)
    }

    fn is_idle(&self) -> bool {
        T::is_idle(self)
    }

    fn deactivate(&mut self) {
        T::deactivate(self)
    }
}

pub struct Port<S, C, P = NoTxEnable> {
    serial: S,
    clock: C,
    tx_enable: Option<P>,
    config: PortConfig,
    active: bool,
    /// When the currently buffered partial frame was first seen.
    partial_since: Option<Instant>,
    last_activity: Option<Instant>,
    statistics: Statistics,
}

impl<S: Serial, C: Clock> Port<S, C, NoTxEnable> {
    pub fn new(serial: S, clock: C) -> Self {
        Self::with_config(serial, clock, None, PortConfig::DEFAULT)
    }
}

impl<S: Serial, C: Clock, P: OutputPin> Port<S, C, P> {
    pub fn with_tx_enable(serial: S, clock: C, tx_enable: P) -> Self {
        Self::with_config(serial, clock, Some(tx_enable), PortConfig::DEFAULT)
    }

    /// The transmit enable line, if any, starts out released.
    pub fn with_config(serial: S, clock: C, tx_enable: Option<P>, config: PortConfig) -> Self {
        let mut port = Self {
            serial,
            clock,
            tx_enable,
            config,
            active: false,
            partial_since: None,
            last_activity: None,
            statistics: Statistics::default(),
        };
        port.drive_tx_enable(false);
        port
    }

    pub fn receive(&mut self) -> Option<Packet> {
        let available = self.serial.available();
        if available == 0 {
            return None;
        }

        let now = self.clock.now();
        self.last_activity = Some(now);

        if available < FRAME_LEN {
            let since = *self.partial_since.get_or_insert(now);
            if now.saturating_duration_since(since) > self.config.partial_timeout {
                debug!("Dropping partial frame of {} bytes", available);
                self.discard();
                self.partial_since = None;
                self.statistics.dropped = self.statistics.dropped.wrapping_add(1);
            }
            return None;
        }

        self.partial_since = None;

        let mut data = [0u8; FRAME_LEN];
        match self.serial.read_exact(&mut data) {
            Ok(()) => {}
            Err(ReadExactError::UnexpectedEof) => {
                warn!("Serial ended in the middle of a frame");
                self.discard();
                return None;
            }
            Err(ReadExactError::Other(e)) => {
                warn!("Serial read failed: {:?}", e.kind());
                self.discard();
                return None;
            }
        }

        self.statistics.input = self.statistics.input.wrapping_add(1);
        let packet = Packet::from_bytes(data);
        trace!("Received {:?}", packet);
        Some(packet)
    }

    pub fn send(&mut self, address: u8, packet: &Packet) -> Result<(), SendError> {
        // Enable the line driver before the first byte goes out.
        if !self.active {
            self.drive_tx_enable(true);
            self.active = true;
        }

        self.last_activity = Some(self.clock.now());

        if self.serial.available_for_write() < FRAME_LEN {
            return Err(SendError::Full);
        }

        let frame = packet.with_address(address);
        self.serial.write_all(frame.as_bytes()).map_err(|e| {
            warn!("Serial write failed: {:?}", e.kind());
            SendError::Io(e.kind())
        })?;

        self.statistics.output = self.statistics.output.wrapping_add(1);
        Ok(())
    }

    pub fn send_message(&mut self, address: u8, message: [u8; PAYLOAD_LEN]) -> Result<(), SendError> {
        self.send(address, &Packet::encode_message(message))
    }

    pub fn send_pulse(&mut self, address: u8, pulse: &Pulse) -> Result<(), SendError> {
        self.send(address, &Packet::encode_pulse(pulse))
    }

    /// True when nothing was sent or received for the recovery window and
    /// no input is pending.
    pub fn is_idle(&self) -> bool {
        if self.serial.available() > 0 {
            return false;
        }

        !self.within_window()
    }

    pub fn deactivate(&mut self) {
        if !self.active || self.within_window() {
            return;
        }

        self.drive_tx_enable(false);
        self.active = false;
    }

    /// Whether transmit enable is currently held.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    fn window(&self) -> Duration {
        if self.tx_enable.is_some() {
            self.config.tx_enable_window
        } else {
            self.config.idle_window
        }
    }

    fn within_window(&self) -> bool {
        match self.last_activity {
            Some(last) => self.clock.now().saturating_duration_since(last) < self.window(),
            None => false,
        }
    }

    fn discard(&mut self) {
        let mut scratch = [0u8; FRAME_LEN];
        while self.serial.available() > 0 {
            match self.serial.read(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    fn drive_tx_enable(&mut self, enable: bool) {
        let Some(pin) = self.tx_enable.as_mut() else {
            return;
        };

        let result = if enable { pin.set_high() } else { pin.set_low() };
        if let Err(e) = result {
            warn!("Transmit enable failed: {:?}", e.kind());
        }
    }
}

impl<S: Serial, C: Clock, P: OutputPin> Endpoint for Port<S, C, P> {
    fn receive(&mut self) -> Option<Packet> {
        Port::receive(self)
    }

    fn send(&mut self, address: u8, packet: &Packet) -> Result<(), SendError> {
        Port::send(self, address, packet)
    }

    fn is_idle(&self) -> bool {
        Port::is_idle(self)
    }

    fn deactivate(&mut self) {
        Port::deactivate(self)
    }
}
