//! Production transports: serial devices and TCP sockets.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::endpoint::Transport;

/// A serial device (USB adapter, UART).
///
/// Reads are gated on `bytes_to_read` so the driver's own read timeout never
/// stalls a tick; writes go straight to the device.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open a serial device at the given baud rate.
    pub fn open(path: &str, baud: u32) -> io::Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        log::info!("opened serial device {path} at {baud} baud");
        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if available == 0 {
            return Ok(0);
        }
        let n = buf.len().min(available as usize);
        self.port.read(&mut buf[..n])
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }
}

/// A TCP connection to an emulated board.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect and switch the stream to non-blocking mode.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        log::info!("connected to emulated board at {}", stream.peer_addr()?);
        Ok(TcpTransport { stream })
    }

    /// Wrap an already-accepted stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            // On TCP a zero-byte read means the peer closed the connection.
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.stream.write(data) {
            Ok(n) => Ok(n),
            // Socket buffer full; try again next tick.
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }
}
