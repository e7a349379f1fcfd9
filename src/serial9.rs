//! Emulated 9-bit serial transport.
//!
//! MateNET is 9600 baud 9n1: the 9th bit flags the first byte of each packet
//! (the "address" byte), and a 16-bit sum checksum trails every frame. A
//! stock UART cannot transmit a 9th data bit, but its parity bit can stand in
//! for one:
//!
//! * ports with mark/space parity send the address byte under mark and the
//!   rest under space, so the parity bit literally is the 9th bit;
//! * everything else gets the 9th bit emulated, picking odd or even parity
//!   per byte so that the parity the UART computes comes out as the wanted
//!   value. That only works one byte at a time, with a short pause after each
//!   flush so a parity-mode change cannot bleed into a byte still sitting in
//!   the TX buffer.
//!
//! Receiving needs no parity tricks: frames have no length prefix and are
//! delimited by the line going idle for [`SerialConfig::eop_timeout`].

use core::time::Duration;
use std::thread::sleep;

use log::{debug, trace};

use crate::error::Error;
use crate::link::{Parity, SerialLink};
use crate::transport::{FrameBuf, Transport};

/// Knobs for the 9-bit emulation. Constant for the transport's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct SerialConfig {
    /// Drive the 9th bit with mark/space parity instead of emulating it.
    pub space_mark: bool,
    /// Pause after each flush; forces one byte through per parity mode.
    pub interbyte_delay: Duration,
    /// Idle time on the line that marks the end of a packet.
    pub eop_timeout: Duration,
    /// Drop leading bytes of over-long captures when the caller supplied the
    /// expected length. Works around adapters that prepend spurious bytes.
    pub trim_overlong: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            space_mark: false,
            interbyte_delay: Duration::from_millis(2),
            eop_timeout: Duration::from_millis(20),
            trim_overlong: true,
        }
    }
}

/// MateNET framing over an emulated 9-bit serial line.
pub struct SerialTransport<L: SerialLink> {
    link: L,
    config: SerialConfig,
}

impl<L: SerialLink> SerialTransport<L> {
    /// Wrap `link`, taking the mark/space capability it advertises.
    pub fn new(link: L) -> Self {
        let config = SerialConfig {
            space_mark: link.supports_space_mark(),
            ..SerialConfig::default()
        };
        Self { link, config }
    }

    pub fn with_config(link: L, config: SerialConfig) -> Self {
        Self { link, config }
    }

    /// Write `data` with the 9th bit of every byte set to `bit8`.
    fn write_9b(&mut self, data: &[u8], bit8: bool) -> Result<(), Error<L::Error>> {
        trace!("TX[{}]: {:02x?}", u8::from(bit8), data);
        if self.config.space_mark {
            let parity = if bit8 { Parity::Mark } else { Parity::Space };
            self.link.set_parity(parity).map_err(Error::Link)?;
            self.link.write_all(data).map_err(Error::Link)?;
            self.link.flush().map_err(Error::Link)?;
            sleep(self.config.interbyte_delay);
        } else {
            for &b in data {
                // The UART derives the parity bit from the data bits; pick
                // odd or even so it comes out equal to the 9th bit.
                let parity = if odd_parity(b) ^ bit8 {
                    Parity::Odd
                } else {
                    Parity::Even
                };
                self.link.set_parity(parity).map_err(Error::Link)?;
                self.link.write_all(&[b]).map_err(Error::Link)?;
                self.link.flush().map_err(Error::Link)?;
                sleep(self.config.interbyte_delay);
            }
        }
        Ok(())
    }
}

impl<L: SerialLink> Transport for SerialTransport<L> {
    type LinkError = L::Error;

    fn send(&mut self, data: &[u8]) -> Result<(), Error<L::Error>> {
        let Some((&first, rest)) = data.split_first() else {
            return Err(Error::FrameTooShort { len: 0 });
        };
        let mut tail = FrameBuf::new();
        tail.extend_from_slice(rest)
            .map_err(|_| Error::BufferOverflow)?;
        tail.extend_from_slice(&checksum(data).to_be_bytes())
            .map_err(|_| Error::BufferOverflow)?;

        // First byte is the address byte; the rest, checksum included, are
        // data bytes.
        self.write_9b(&[first], true)?;
        self.write_9b(&tail, false)
    }

    fn recv(
        &mut self,
        expected_len: Option<usize>,
        timeout: Duration,
    ) -> Result<Option<FrameBuf>, Error<L::Error>> {
        self.link.set_read_timeout(timeout).map_err(Error::Link)?;
        let mut byte = [0u8; 1];
        if self.link.read(&mut byte).map_err(Error::Link)? == 0 {
            return Ok(None);
        }
        let mut raw = FrameBuf::new();
        raw.push(byte[0]).map_err(|_| Error::BufferOverflow)?;

        // Something is talking; keep reading until the line goes quiet.
        self.link
            .set_read_timeout(self.config.eop_timeout)
            .map_err(Error::Link)?;
        while self.link.read(&mut byte).map_err(Error::Link)? != 0 {
            raw.push(byte[0]).map_err(|_| Error::BufferOverflow)?;
        }
        trace!("RX: {:02x?}", raw.as_slice());

        // Account for the checksum trailer.
        let expected = expected_len.map(|len| len + 2);
        let body = parse_frame(raw.as_slice(), expected, self.config.trim_overlong)?;
        FrameBuf::from_slice(body)
            .map(Some)
            .map_err(|_| Error::BufferOverflow)
    }
}

/// Whether `b` has an odd number of set bits.
fn odd_parity(b: u8) -> bool {
    b.count_ones() % 2 == 1
}

/// 16-bit frame checksum: the plain byte sum, modulo 0xFFFF.
pub fn checksum(data: &[u8]) -> u16 {
    (data.iter().map(|&b| u32::from(b)).sum::<u32>() % 0xFFFF) as u16
}

/// Validate a captured frame and strip the checksum trailer.
fn parse_frame<E: embedded_io::Error>(
    mut data: &[u8],
    expected_len: Option<usize>,
    trim_overlong: bool,
) -> Result<&[u8], Error<E>> {
    if let Some(expected) = expected_len {
        if trim_overlong && data.len() > expected {
            debug!("trimming over-long capture ({} > {} bytes)", data.len(), expected);
            data = &data[data.len() - expected..];
        }
        if data.len() < expected {
            return Err(Error::FrameTooShort { len: data.len() });
        }
    }
    if data.len() < 3 {
        return Err(Error::FrameTooShort { len: data.len() });
    }
    let (body, trailer) = data.split_at(data.len() - 2);
    let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
    let actual = checksum(body);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}
