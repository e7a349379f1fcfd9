//! Test doubles: an in-memory serial line, and a scripted device answering
//! on the far side of a transport.

use core::time::Duration;
use std::collections::VecDeque;

use crate::error::Error;
use crate::link::{Parity, SerialLink};
use crate::transport::{FrameBuf, Transport};

/// Emulates a serial port, recording the parity mode in force when each byte
/// was written.
pub struct MockLink {
    /// (parity at write time, byte) for everything written.
    writes: Vec<(Parity, u8)>,
    /// Pre-configured response data served to `read`.
    read_buffer: Vec<u8>,
    read_position: usize,
    parity: Parity,
    read_timeout: Duration,
    space_mark: bool,
    should_error_on_write: bool,
}

#[derive(Debug)]
pub enum MockLinkError {
    /// Generic simulated error for testing.
    Simulated,
}

impl core::fmt::Display for MockLinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockLinkError::Simulated => write!(f, "simulated error"),
        }
    }
}

impl std::error::Error for MockLinkError {}

impl embedded_io::Error for MockLinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl embedded_io::ErrorType for MockLink {
    type Error = MockLinkError;
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            read_buffer: Vec::new(),
            read_position: 0,
            parity: Parity::Odd,
            read_timeout: Duration::from_secs(1),
            space_mark: false,
            should_error_on_write: false,
        }
    }

    /// A link whose hardware claims mark/space parity support.
    pub fn with_space_mark() -> Self {
        Self {
            space_mark: true,
            ..Self::new()
        }
    }

    /// Set the data that will be returned when `read` is called.
    pub fn set_read_data(&mut self, data: &[u8]) {
        self.read_buffer = data.to_vec();
        self.read_position = 0;
    }

    /// Every byte written so far, in order.
    pub fn written_data(&self) -> Vec<u8> {
        self.writes.iter().map(|&(_, b)| b).collect()
    }

    /// The parity mode in force for each written byte.
    pub fn written_parities(&self) -> Vec<Parity> {
        self.writes.iter().map(|&(p, _)| p).collect()
    }

    /// The read timeout most recently configured.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Configure whether write operations should fail.
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }
}

impl embedded_io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockLinkError::Simulated);
        }
        for &b in buf {
            self.writes.push((self.parity, b));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.read_position >= self.read_buffer.len() {
            // Out of scripted data: behave like a read timeout.
            return Ok(0);
        }
        let available = self.read_buffer.len() - self.read_position;
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.read_buffer[self.read_position..self.read_position + n]);
        self.read_position += n;
        Ok(n)
    }
}

impl SerialLink for MockLink {
    fn set_parity(&mut self, parity: Parity) -> Result<(), Self::Error> {
        self.parity = parity;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn supports_space_mark(&self) -> bool {
        self.space_mark
    }
}

/// Emulates devices attached to hub ports, answering the bus's 6-byte
/// requests at the transport level.
pub struct MockDevice {
    /// Device-type code per populated port.
    devices: Vec<(u8, u8)>,
    /// Register values, shared by every populated port.
    registers: Vec<(u16, u16)>,
    /// Raw response (command-ack byte included) served for Status/Log
    /// requests.
    raw_response: Option<Vec<u8>>,
    /// Scripted responses consumed ahead of any emulation; `None` = silence.
    script: VecDeque<Option<Vec<u8>>>,
    /// Undocumented high byte some units set in the device-type register.
    type_high_byte: u8,
    /// Every request body sent, in order.
    pub sent: Vec<Vec<u8>>,
    /// `expected_len` passed to each recv call.
    pub recv_lens: Vec<Option<usize>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            registers: Vec::new(),
            raw_response: None,
            script: VecDeque::new(),
            type_high_byte: 0,
            sent: Vec::new(),
            recv_lens: Vec::new(),
        }
    }

    /// A bus populated with `(port, device type code)` pairs.
    pub fn with_devices(devices: &[(u8, u8)]) -> Self {
        Self {
            devices: devices.to_vec(),
            ..Self::new()
        }
    }

    pub fn set_register(&mut self, reg: u16, value: u16) {
        self.registers.push((reg, value));
    }

    pub fn set_raw_response(&mut self, payload: &[u8]) {
        self.raw_response = Some(payload.to_vec());
    }

    pub fn set_type_high_byte(&mut self, value: u8) {
        self.type_high_byte = value;
    }

    /// Queue an exact response for the next exchange; `None` stays silent.
    pub fn script_response(&mut self, response: Option<&[u8]>) {
        self.script.push_back(response.map(<[u8]>::to_vec));
    }

    /// The port byte of every request sent.
    pub fn request_ports(&self) -> Vec<u8> {
        self.sent.iter().map(|body| body[0]).collect()
    }
}

impl Transport for MockDevice {
    type LinkError = MockLinkError;

    fn send(&mut self, data: &[u8]) -> Result<(), Error<MockLinkError>> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn recv(
        &mut self,
        expected_len: Option<usize>,
        _timeout: Duration,
    ) -> Result<Option<FrameBuf>, Error<MockLinkError>> {
        self.recv_lens.push(expected_len);

        if let Some(scripted) = self.script.pop_front() {
            return Ok(scripted.map(|bytes| FrameBuf::from_slice(&bytes).unwrap()));
        }

        let Some(body) = self.sent.last() else {
            return Ok(None);
        };
        let port = body[0];
        let addr = u16::from_be_bytes([body[2], body[3]]);
        let Some(&(_, code)) = self.devices.iter().find(|&&(p, _)| p == port) else {
            return Ok(None);
        };

        let value = match body[1] {
            // Register read.
            2 => {
                if addr == 0x0000 {
                    Some(u16::from_be_bytes([self.type_high_byte, code]))
                } else {
                    self.registers
                        .iter()
                        .find(|&&(r, _)| r == addr)
                        .map(|&(_, v)| v)
                }
            }
            // Register write: ack with a zero value.
            3 => Some(0),
            // Status/Log: canned raw bytes, if any were configured.
            _ => {
                return Ok(self
                    .raw_response
                    .as_deref()
                    .map(|bytes| FrameBuf::from_slice(bytes).unwrap()));
            }
        };
        Ok(value.map(|v| {
            let bytes = v.to_be_bytes();
            FrameBuf::from_slice(&[0x03, bytes[0], bytes[1]]).unwrap()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Read, Write};

    #[test]
    fn records_writes_with_parity() {
        let mut mock = MockLink::new();
        mock.set_parity(Parity::Even).unwrap();
        mock.write(&[0x01]).unwrap();
        mock.set_parity(Parity::Odd).unwrap();
        mock.write(&[0x02, 0x03]).unwrap();

        assert_eq!(mock.written_data(), vec![0x01, 0x02, 0x03]);
        assert_eq!(
            mock.written_parities(),
            vec![Parity::Even, Parity::Odd, Parity::Odd]
        );
    }

    #[test]
    fn serves_read_data_then_times_out() {
        let mut mock = MockLink::new();
        mock.set_read_data(&[0xAA, 0xBB]);

        let mut buf = [0u8; 1];
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xAA);
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xBB);
        // Exhausted: reads behave like timeouts.
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn simulated_write_error() {
        let mut mock = MockLink::new();
        mock.set_write_error(true);
        assert!(mock.write(&[0x01]).is_err());
        assert!(mock.written_data().is_empty());
    }
}
