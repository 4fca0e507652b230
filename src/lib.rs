//! Framing and hop-count routing for daisy-chained devices on full-duplex
//! serial lines.
//!
//! Each device has a plug towards its parent and a socket towards its
//! children. Up to 16 devices can be chained; packets are addressed by the
//! number of hops remaining to their target.

#![cfg_attr(not(test), no_std)]

pub(crate) mod fmt;

pub mod io;
pub mod link;
pub mod packet;
pub mod port;

pub use io::{Clock, NoTxEnable, Serial, SystemClock};
pub use link::{Direction, Error as LinkError, Handler, Link, NoPort};
pub use packet::{DecodeError, Kind, Packet, Payload, Pulse};
pub use port::{Endpoint, Port, PortConfig, SendError, Statistics};
