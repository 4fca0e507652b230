extern crate pretty_env_logger;

use std::convert::Infallible;

use embassy_sync::{blocking_mutex::raw::NoopRawMutex, pipe::Pipe};
use hoplink::{Direction, Handler, Link, Packet, Payload, Port, Pulse, Serial, SystemClock};

const PIPE_LENGTH: usize = 256;
const DEVICES: usize = 4;

/// Full-duplex line between a parent's socket and a child's plug.
struct MockLine {
    upstream: Pipe<NoopRawMutex, PIPE_LENGTH>,
    downstream: Pipe<NoopRawMutex, PIPE_LENGTH>,
}

struct MockSerial<'a> {
    name: String,
    rx: &'a Pipe<NoopRawMutex, PIPE_LENGTH>,
    tx: &'a Pipe<NoopRawMutex, PIPE_LENGTH>,
}

impl MockLine {
    fn new() -> Self {
        Self {
            upstream: Pipe::new(),
            downstream: Pipe::new(),
        }
    }

    fn split(&self, index: usize) -> (MockSerial<'_>, MockSerial<'_>) {
        let socket = MockSerial {
            name: format!("device {} socket", index),
            rx: &self.upstream,
            tx: &self.downstream,
        };
        let plug = MockSerial {
            name: format!("device {} plug", index + 1),
            rx: &self.downstream,
            tx: &self.upstream,
        };
        (socket, plug)
    }
}

impl embedded_io::ErrorType for MockSerial<'_> {
    type Error = Infallible;
}

impl embedded_io::Read for MockSerial<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let result = self.rx.try_read(buf).unwrap_or(0);
        log::trace!("{} << {:0x?}", self.name, &buf[0..result]);
        Ok(result)
    }
}

impl embedded_io::Write for MockSerial<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let result = self.tx.try_write(buf).unwrap_or(0);
        log::trace!("{} >> {:0x?}", self.name, &buf[0..result]);
        Ok(result)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(()) // No-op
    }
}

impl Serial for MockSerial<'_> {
    fn available(&self) -> usize {
        self.rx.len()
    }

    fn available_for_write(&self) -> usize {
        self.tx.free_capacity()
    }
}

struct Device {
    index: usize,
}

impl Handler for Device {
    fn receive_plug(&mut self, packet: &Packet) {
        match packet.payload() {
            Payload::Pulse(pulse) => log::info!(
                "Device {} fires actuator {} at {:.1} W for {:.2} s",
                self.index,
                pulse.port,
                pulse.watts,
                pulse.seconds
            ),
            other => log::info!("Device {} received {:?}", self.index, other),
        }
    }

    fn receive_socket(&mut self, packet: &Packet) {
        log::info!(
            "Device {} observed {:?} from {} hops down",
            self.index,
            packet.payload(),
            packet.address() + 1
        );
    }
}

fn main() {
    pretty_env_logger::init();

    let lines: Vec<MockLine> = (0..DEVICES - 1).map(|_| MockLine::new()).collect();
    let mut sockets = Vec::new();
    let mut plugs = vec![None];
    for (index, line) in lines.iter().enumerate() {
        let (socket, plug) = line.split(index);
        sockets.push(Some(socket));
        plugs.push(Some(plug));
    }
    sockets.push(None);

    let mut links: Vec<_> = plugs
        .into_iter()
        .zip(sockets)
        .enumerate()
        .map(|(index, (plug, socket))| {
            Link::new(
                plug.map(|serial| Port::new(serial, SystemClock)),
                socket.map(|serial| Port::new(serial, SystemClock)),
                Device { index },
            )
        })
        .collect();

    // The root addresses the last device, which is DEVICES - 1 hops away.
    let pulse = Pulse {
        port: 2,
        watts: 35.0,
        seconds: 0.5,
        fade_in: true,
        fade_out: false,
    };
    if let Err(e) = links[0].send_pulse(Direction::Socket, (DEVICES - 2) as u8, &pulse) {
        log::error!("Root could not send: {}", e);
    }

    // The last device reports back towards the root.
    if let Err(e) = links[DEVICES - 1].send_message(Direction::Plug, 0, [0xb0, 0x07, 0x64, 0x00]) {
        log::error!("Leaf could not send: {}", e);
    }

    for _ in 0..DEVICES {
        for link in links.iter_mut() {
            link.poll();
        }
    }

    for (index, link) in links.iter().enumerate() {
        let input: u32 = link.plug().map_or(0, |p| p.statistics().input)
            + link.socket().map_or(0, |p| p.statistics().input);
        let output: u32 = link.plug().map_or(0, |p| p.statistics().output)
            + link.socket().map_or(0, |p| p.statistics().output);
        log::info!("Device {}: {} frames in, {} frames out", index, input, output);
    }
}
