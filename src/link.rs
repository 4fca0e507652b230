//! Hop-count routing between the plug (towards the parent) and the socket
//! (towards the children) of a device.
//!
//! Packets from the plug travel downstream: they are delivered locally when
//! their address is 0, otherwise relayed to the socket one hop closer.
//! Packets from the socket travel upstream: they are relayed to the plug with
//! the address counting up until [`MAX_ADDRESS`], and every one of them is
//! also delivered locally.

use core::fmt;

use crate::fmt::{debug, trace};
use crate::packet::{MAX_ADDRESS, PAYLOAD_LEN, Packet, Pulse};
use crate::port::{Endpoint, SendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Towards the parent device.
    Plug,
    /// Towards the children.
    Socket,
}

/// Local delivery of packets.
pub trait Handler {
    /// A packet from the parent addressed to this device.
    fn receive_plug(&mut self, _packet: &Packet) {}

    /// A packet from a child, whether or not it was relayed further up.
    fn receive_socket(&mut self, _packet: &Packet) {}
}

impl Handler for () {}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn receive_plug(&mut self, packet: &Packet) {
        H::receive_plug(self, packet)
    }

    fn receive_socket(&mut self, packet: &Packet) {
        H::receive_socket(self, packet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// This device has no port in the requested direction.
    Unconnected(Direction),
    /// The port did not accept the packet.
    Port(SendError),
}

impl From<SendError> for Error {
    fn from(value: SendError) -> Self {
        Error::Port(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unconnected(direction) => write!(f, "no {:?} port", direction),
            Error::Port(e) => write!(f, "{}", e),
        }
    }
}

/// Stand-in type for the missing port of a root or leaf device.
#[derive(Debug)]
pub enum NoPort {}

impl Endpoint for NoPort {
    fn receive(&mut self) -> Option<Packet> {
        match *self {}
    }

    fn send(&mut self, _address: u8, _packet: &Packet) -> Result<(), SendError> {
        match *self {}
    }

    fn is_idle(&self) -> bool {
        match *self {}
    }

    fn deactivate(&mut self) {
        match *self {}
    }
}

pub struct Link<A, B, H> {
    plug: Option<A>,
    socket: Option<B>,
    handler: H,
}

impl<B: Endpoint, H: Handler> Link<NoPort, B, H> {
    /// First device of the chain, only children attached.
    pub const fn root(socket: B, handler: H) -> Self {
        Self::new(None, Some(socket), handler)
    }
}

impl<A: Endpoint, H: Handler> Link<A, NoPort, H> {
    /// Last device of the chain, only a parent attached.
    pub const fn leaf(plug: A, handler: H) -> Self {
        Self::new(Some(plug), None, handler)
    }
}

impl<A: Endpoint, B: Endpoint, H: Handler> Link<A, B, H> {
    pub const fn new(plug: Option<A>, socket: Option<B>, handler: H) -> Self {
        Self {
            plug,
            socket,
            handler,
        }
    }

    /// Run one cycle: handle at most one packet from each port.
    pub fn poll(&mut self) {
        if let Some(plug) = self.plug.as_mut() {
            if let Some(packet) = plug.receive() {
                let address = packet.address();
                if address > 0 {
                    if let Some(socket) = self.socket.as_mut() {
                        trace!("Forwarding to socket at address {}", address - 1);
                        if let Err(e) = socket.send(address - 1, &packet) {
                            debug!("Dropped packet for socket: {:?}", e);
                        }
                    }
                } else {
                    trace!("Delivering packet from plug");
                    self.handler.receive_plug(&packet);
                }
            }

            plug.deactivate();
        }

        if let Some(socket) = self.socket.as_mut() {
            if let Some(packet) = socket.receive() {
                let address = packet.address();
                if address < MAX_ADDRESS {
                    if let Some(plug) = self.plug.as_mut() {
                        trace!("Forwarding to plug at address {}", address + 1);
                        if let Err(e) = plug.send(address + 1, &packet) {
                            debug!("Dropped packet for plug: {:?}", e);
                        }
                    }
                } else {
                    debug!("Hop limit reached, not forwarding to plug");
                }

                self.handler.receive_socket(&packet);
            }

            socket.deactivate();
        }
    }

    /// True when every attached port is idle.
    pub fn is_idle(&self) -> bool {
        if let Some(plug) = &self.plug {
            if !plug.is_idle() {
                return false;
            }
        }

        if let Some(socket) = &self.socket {
            if !socket.is_idle() {
                return false;
            }
        }

        true
    }

    pub fn send(&mut self, direction: Direction, address: u8, packet: &Packet) -> Result<(), Error> {
        match direction {
            Direction::Plug => match self.plug.as_mut() {
                Some(plug) => Ok(plug.send(address, packet)?),
                None => Err(Error::Unconnected(direction)),
            },
            Direction::Socket => match self.socket.as_mut() {
                Some(socket) => Ok(socket.send(address, packet)?),
                None => Err(Error::Unconnected(direction)),
            },
        }
    }

    pub fn send_message(
        &mut self,
        direction: Direction,
        address: u8,
        message: [u8; PAYLOAD_LEN],
    ) -> Result<(), Error> {
        self.send(direction, address, &Packet::encode_message(message))
    }

    pub fn send_pulse(&mut self, direction: Direction, address: u8, pulse: &Pulse) -> Result<(), Error> {
        self.send(direction, address, &Packet::encode_pulse(pulse))
    }

    pub fn plug(&self) -> Option<&A> {
        self.plug.as_ref()
    }

    pub fn plug_mut(&mut self) -> Option<&mut A> {
        self.plug.as_mut()
    }

    pub fn socket(&self) -> Option<&B> {
        self.socket.as_ref()
    }

    pub fn socket_mut(&mut self) -> Option<&mut B> {
        self.socket.as_mut()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_parts(self) -> (Option<A>, Option<B>, H) {
        (self.plug, self.socket, self.handler)
    }
}
