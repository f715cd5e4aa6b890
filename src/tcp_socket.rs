// rloraprs - TCP Socket Module
// Non-blocking std TcpStream behind the NetworkSocket seam

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::GatewayError;
use crate::transport::NetworkSocket;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bytes held ahead of the line reader; the rest stays in the kernel.
pub const RX_CAPACITY: usize = 8192;

pub struct TcpSocket {
    stream: Option<TcpStream>,
    rx: VecDeque<u8>,
    write_timeout: Duration,
}

impl TcpSocket {
    pub fn new() -> Self {
        TcpSocket { stream: None, rx: VecDeque::with_capacity(RX_CAPACITY), write_timeout: WRITE_TIMEOUT }
    }

    /// Pulls what the kernel has buffered, up to `RX_CAPACITY`, without
    /// blocking. A zero-byte read means the server hung up.
    fn fill(&mut self) {
        let Some(stream) = self.stream.as_mut() else { return };
        let mut buffer = [0u8; 1024];
        while self.rx.len() < RX_CAPACITY {
            let room = (RX_CAPACITY - self.rx.len()).min(buffer.len());
            match stream.read(&mut buffer[..room]) {
                Ok(0) => {
                    self.stream = None;
                    return;
                }
                Ok(n) => self.rx.extend(&buffer[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.stream = None;
                    return;
                }
            }
        }
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSocket for TcpSocket {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), GatewayError> {
        self.close();
        let connect_err = |reason: String| GatewayError::Connect { host: host.to_string(), port, reason };
        let addrs = (host, port).to_socket_addrs().map_err(|e| connect_err(e.to_string()))?;
        let mut last_error = "no addresses resolved".to_string();
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    let _ = stream.set_nodelay(true);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(connect_err(last_error))
    }

    fn is_connected(&mut self) -> bool {
        self.fill();
        self.stream.is_some()
    }

    fn available(&mut self) -> usize {
        self.fill();
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() { self.fill(); }
        self.rx.pop_front()
    }

    fn write_line(&mut self, line: &str) -> Result<(), GatewayError> {
        self.write_str(&format!("{}\r\n", line))
    }

    fn write_str(&mut self, text: &str) -> Result<(), GatewayError> {
        let deadline = Instant::now() + self.write_timeout;
        let stream = self.stream.as_mut().ok_or(GatewayError::NotConnected)?;
        let mut remaining = text.as_bytes();
        while !remaining.is_empty() {
            match stream.write(remaining) {
                Ok(0) => {
                    self.stream = None;
                    return Err(GatewayError::NotConnected);
                }
                Ok(n) => remaining = &remaining[n..],
                Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    // A server that stops reading must not stall the loop
                    if Instant::now() >= deadline {
                        self.close();
                        return Err(io::Error::new(ErrorKind::TimedOut, "write stalled").into());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    self.stream = None;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.rx.clear();
    }
}
