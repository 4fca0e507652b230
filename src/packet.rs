//! Fixed-size packets exchanged between daisy-chained devices.
//!
//! Every packet is five bytes: a header byte carrying the hop address and the
//! packet kind, followed by a four byte payload. There are no markers and no
//! checksum; framing is purely by length.

use core::fmt;

use bitfields::bitfield;
use serde::{Deserialize, Serialize};

/// Length of a packet on the wire.
pub const FRAME_LEN: usize = 5;
/// Length of the payload following the header byte.
pub const PAYLOAD_LEN: usize = FRAME_LEN - 1;
/// Highest hop address; a packet travelling upstream stops being relayed here.
pub const MAX_ADDRESS: u8 = 0x0f;

/// Largest 12 bit quantization code.
pub const CODE_MAX: u16 = 0x0fff;
/// Largest encodable pulse power; higher values saturate.
pub const WATTS_MAX: f32 = 100.0;
/// Power curve exponent, finer steps at low power.
pub const WATTS_EXPONENT: u32 = 3;
/// Longest encodable pulse duration; longer values saturate.
pub const SECONDS_MAX: f32 = 100.0;
/// Duration curve exponent, finer steps for short pulses.
pub const SECONDS_EXPONENT: u32 = 8;

#[bitfield(u8)]
struct Header {
    #[bits(4)]
    kind: u8,
    #[bits(4)]
    address: u8,
}

#[bitfield(u8)]
struct PulseFlags {
    #[bits(4)]
    port: u8,
    fade_in: bool,
    fade_out: bool,
    #[bits(2)]
    _reserved: u8,
}

/// Packet kind, stored in the low nibble of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Kind {
    /// Opaque four byte message, passed through unmodified.
    Message = 0,
    /// Quantized actuator pulse.
    Pulse = 1,
}

impl TryFrom<u8> for Kind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Kind::Message),
            1 => Ok(Kind::Pulse),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The packet is of another known kind.
    WrongKind(Kind),
    /// The kind nibble does not name any known packet kind.
    UnknownKind(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::WrongKind(kind) => write!(f, "packet is of kind {:?}", kind),
            DecodeError::UnknownKind(nibble) => write!(f, "unknown packet kind {:#x}", nibble),
        }
    }
}

/// Actuator pulse command.
///
/// `watts` and `seconds` are carried as 12 bit codes on a power-law curve,
/// so a decoded pulse only matches the encoded one within a quantization step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    /// Actuator index, 0 to 15.
    pub port: u8,
    /// Power level, 0 to [`WATTS_MAX`].
    pub watts: f32,
    /// Duration, 0 to [`SECONDS_MAX`].
    pub seconds: f32,
    /// Ramp the power up at the start of the pulse.
    pub fade_in: bool,
    /// Ramp the power down at the end of the pulse.
    pub fade_out: bool,
}

/// Typed view of a packet's payload.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    Message([u8; PAYLOAD_LEN]),
    Pulse(Pulse),
    /// Kind nibble that is neither a message nor a pulse.
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    data: [u8; FRAME_LEN],
}

impl Packet {
    pub(crate) const fn from_bytes(data: [u8; FRAME_LEN]) -> Self {
        Self { data }
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.data
    }

    fn header(&self) -> Header {
        Header::from_bits(self.data[0])
    }

    fn with_header(mut self, kind: u8, address: u8) -> Self {
        self.data[0] = HeaderBuilder::new()
            .with_kind(kind & 0x0f)
            .with_address(address & MAX_ADDRESS)
            .build()
            .into_bits();
        self
    }

    /// Remaining hops to the target; 0 addresses the receiving device.
    pub fn address(&self) -> u8 {
        self.header().address()
    }

    /// Copy of this packet with the address replaced. Only the low four bits are kept.
    pub fn with_address(self, address: u8) -> Self {
        let kind = self.header().kind();
        self.with_header(kind, address)
    }

    pub fn kind(&self) -> Result<Kind, DecodeError> {
        Kind::try_from(self.header().kind())
    }

    pub fn encode_message(message: [u8; PAYLOAD_LEN]) -> Self {
        let mut data = [0u8; FRAME_LEN];
        data[1..].copy_from_slice(&message);
        Self::from_bytes(data).with_header(Kind::Message as u8, 0)
    }

    pub fn decode_message(&self) -> Result<[u8; PAYLOAD_LEN], DecodeError> {
        match self.kind()? {
            Kind::Message => Ok(self.message_unchecked()),
            kind => Err(DecodeError::WrongKind(kind)),
        }
    }

    fn message_unchecked(&self) -> [u8; PAYLOAD_LEN] {
        let mut message = [0u8; PAYLOAD_LEN];
        message.copy_from_slice(&self.data[1..]);
        message
    }

    /// Encode a pulse. Out of range `watts` and `seconds` are clamped and
    /// the port is masked to four bits.
    pub fn encode_pulse(pulse: &Pulse) -> Self {
        let flags = PulseFlagsBuilder::new()
            .with_port(pulse.port & 0x0f)
            .with_fade_in(pulse.fade_in)
            .with_fade_out(pulse.fade_out)
            .build();
        let watts = quantize(pulse.watts, WATTS_MAX, WATTS_EXPONENT);
        let seconds = quantize(pulse.seconds, SECONDS_MAX, SECONDS_EXPONENT);

        let data = [
            0,
            flags.into_bits(),
            (((watts >> 8) as u8) << 4) | (seconds >> 8) as u8,
            (watts & 0xff) as u8,
            (seconds & 0xff) as u8,
        ];
        Self::from_bytes(data).with_header(Kind::Pulse as u8, 0)
    }

    pub fn decode_pulse(&self) -> Result<Pulse, DecodeError> {
        match self.kind()? {
            Kind::Pulse => Ok(self.pulse_unchecked()),
            kind => Err(DecodeError::WrongKind(kind)),
        }
    }

    fn pulse_unchecked(&self) -> Pulse {
        let flags = PulseFlags::from_bits(self.data[1]);
        let watts = (u16::from(self.data[2] >> 4) << 8) | u16::from(self.data[3]);
        let seconds = (u16::from(self.data[2] & 0x0f) << 8) | u16::from(self.data[4]);

        Pulse {
            port: flags.port(),
            watts: dequantize(watts, WATTS_MAX, WATTS_EXPONENT),
            seconds: dequantize(seconds, SECONDS_MAX, SECONDS_EXPONENT),
            fade_in: flags.fade_in(),
            fade_out: flags.fade_out(),
        }
    }

    pub fn payload(&self) -> Payload {
        match self.kind() {
            Ok(Kind::Message) => Payload::Message(self.message_unchecked()),
            Ok(Kind::Pulse) => Payload::Pulse(self.pulse_unchecked()),
            Err(_) => Payload::Unknown(self.header().kind()),
        }
    }
}

fn powi(base: f32, exponent: u32) -> f32 {
    (0..exponent).fold(1.0, |acc, _| acc * base)
}

fn dequantize(code: u16, max: f32, exponent: u32) -> f32 {
    max * powi(f32::from(code) / f32::from(CODE_MAX), exponent)
}

/// Nearest code to `CODE_MAX * (value / max)^(1 / exponent)`.
///
/// Searches the monotonic rounding thresholds instead of taking the root,
/// which `core` cannot do.
fn quantize(value: f32, max: f32, exponent: u32) -> u16 {
    // Also catches NaN.
    if !(value > 0.0) {
        return 0;
    }
    if value >= max {
        return CODE_MAX;
    }

    let fraction = value / max;
    let (mut low, mut high) = (0u16, CODE_MAX);
    while low < high {
        let mid = (low + high + 1) / 2;
        let threshold = powi((f32::from(mid) - 0.5) / f32::from(CODE_MAX), exponent);
        if threshold <= fraction {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}
