//! MateNET packets tunnelled over PJON.
//!
//! Bridge adapters for MateNET speak ordinary 8n1 serial and wrap each packet
//! in a PJON frame, delimited by the SFSP start/end/escape bytes. Only the
//! slice of PJON a 1:1 bridge needs is implemented: local bus, sender id
//! always present, no acknowledgements, 8-bit CRC for short frames and
//! 32-bit CRC once the frame outgrows 15 bytes.
//!
//! Wire layout after de-escaping:
//! `[TargetID][Header][TotalLength][HeaderCRC8][SenderID][Payload...][CRC8|CRC32]`

use core::time::Duration;
use std::time::Instant;

use log::{debug, trace};
use modular_bitfield::bitfield;

use crate::error::{Error, UnsupportedFeature};
use crate::link::SerialLink;
use crate::transport::{FrameBuf, Transport};

/// SFSP frame delimiters.
pub const SFSP_START: u8 = 0x95;
pub const SFSP_END: u8 = 0xEA;
pub const SFSP_ESC: u8 = 0xBB;

/// PJON broadcast device id.
pub const ID_BROADCAST: u8 = 0;

/// Payload prefix addressing the attached device.
pub const TARGET_DEVICE: u8 = 0x0A;
/// Payload prefix addressing the MATE side of the bridge.
pub const TARGET_MATE: u8 = 0x0B;

/// Our id on the PJON bus.
const DEVICE_ID: u8 = 1;

/// Fixed header bytes: target id, header, length, header CRC, sender id.
const HEADER_LEN: usize = 5;

/// Frames longer than this must carry a 32-bit CRC instead of an 8-bit one.
const CRC32_THRESHOLD: usize = 15;

/// How often the receive loop polls the line while waiting for a frame.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Escaped worst case: every byte special, plus the two delimiters.
const MAX_WIRE: usize = 2 * crate::transport::MAX_FRAME + 2;

/// The PJON packet header flag byte, bit 0 first.
#[bitfield]
#[derive(Clone, Copy)]
pub struct PjonHeader {
    shared: bool,
    sender_info: bool,
    sync_ack: bool,
    async_ack: bool,
    network_services: bool,
    crc32: bool,
    extended_length: bool,
    packet_id: bool,
}

/// MateNET framing over a PJON/SFSP byte stream.
pub struct PjonTransport<L: SerialLink> {
    link: L,
    device_id: u8,
    /// Target prefix prepended to every outgoing payload.
    target: u8,
}

impl<L: SerialLink> PjonTransport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            device_id: DEVICE_ID,
            target: TARGET_DEVICE,
        }
    }

    /// Address outgoing payloads at `target` instead of [`TARGET_DEVICE`].
    pub fn with_target(mut self, target: u8) -> Self {
        self.target = target;
        self
    }

    /// Read one SFSP frame, de-escaped, or `None` if the deadline passes.
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<FrameBuf>, Error<L::Error>> {
        self.link
            .set_read_timeout(POLL_TIMEOUT)
            .map_err(Error::Link)?;

        let mut buffer = FrameBuf::new();
        let mut receiving = false;
        let mut escape_next = false;
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];

        while Instant::now() < deadline {
            if self.link.read(&mut byte).map_err(Error::Link)? == 0 {
                continue;
            }
            let b = byte[0];
            if !receiving {
                if b == SFSP_START {
                    receiving = true;
                }
                continue;
            }
            if b == SFSP_END {
                return Ok(Some(buffer));
            }
            if b == SFSP_ESC {
                escape_next = true;
                continue;
            }
            if b == SFSP_START {
                // A bare start byte inside a frame means we lost sync;
                // drop the partial frame and wait for the next one.
                debug!("unexpected START, discarding partial frame");
                buffer.clear();
                escape_next = false;
                receiving = false;
                continue;
            }
            let b = if escape_next {
                escape_next = false;
                b ^ SFSP_ESC
            } else {
                b
            };
            buffer.push(b).map_err(|_| Error::BufferOverflow)?;
        }
        debug!("RX timeout");
        Ok(None)
    }
}

impl<L: SerialLink> Transport for PjonTransport<L> {
    type LinkError = L::Error;

    fn send(&mut self, data: &[u8]) -> Result<(), Error<L::Error>> {
        // The bridge expects the payload to lead with the target prefix.
        let mut payload = FrameBuf::new();
        payload.push(self.target).map_err(|_| Error::BufferOverflow)?;
        payload
            .extend_from_slice(data)
            .map_err(|_| Error::BufferOverflow)?;

        let use_crc32 = payload.len() + HEADER_LEN > CRC32_THRESHOLD;
        let total_len = payload.len() + HEADER_LEN + if use_crc32 { 4 } else { 1 };
        if total_len > usize::from(u8::MAX) {
            return Err(Error::Unsupported(UnsupportedFeature::ExtendedLength));
        }

        let header = PjonHeader::new()
            .with_sender_info(true)
            .with_crc32(use_crc32);

        let mut frame = FrameBuf::new();
        frame
            .extend_from_slice(&[ID_BROADCAST, header.into_bytes()[0], total_len as u8])
            .map_err(|_| Error::BufferOverflow)?;
        let crc_h = crc8(&frame);
        frame.push(crc_h).map_err(|_| Error::BufferOverflow)?;
        frame
            .push(self.device_id)
            .map_err(|_| Error::BufferOverflow)?;
        frame
            .extend_from_slice(&payload)
            .map_err(|_| Error::BufferOverflow)?;
        if use_crc32 {
            frame
                .extend_from_slice(&crc32(&frame).to_be_bytes())
                .map_err(|_| Error::BufferOverflow)?;
        } else {
            let crc = crc8(&frame);
            frame.push(crc).map_err(|_| Error::BufferOverflow)?;
        }
        trace!("TX: {:02x?}", frame.as_slice());

        let mut wire = heapless::Vec::<u8, MAX_WIRE>::new();
        wire.push(SFSP_START).map_err(|_| Error::BufferOverflow)?;
        wire.extend_from_slice(&escape(&frame).ok_or(Error::BufferOverflow)?)
            .map_err(|_| Error::BufferOverflow)?;
        wire.push(SFSP_END).map_err(|_| Error::BufferOverflow)?;

        self.link.write_all(&wire).map_err(Error::Link)?;
        self.link.flush().map_err(Error::Link)
    }

    fn recv(
        &mut self,
        _expected_len: Option<usize>,
        timeout: Duration,
    ) -> Result<Option<FrameBuf>, Error<L::Error>> {
        // TODO: validate the payload length against expected_len
        let Some(data) = self.recv_frame(timeout)? else {
            return Ok(None);
        };
        trace!("RX: {:02x?}", data.as_slice());

        if data.len() < HEADER_LEN {
            return Err(Error::FrameTooShort { len: data.len() });
        }
        let target_id = data[0];
        let header = PjonHeader::from_bytes([data[1]]);
        let declared = usize::from(data[2]);

        if target_id != ID_BROADCAST && target_id != self.device_id {
            debug!("ignoring frame for id {target_id:#04x}");
            return Ok(None);
        }
        if declared != data.len() {
            return Err(Error::InvalidLength {
                declared,
                received: data.len(),
            });
        }

        // The header CRC covers target id, header and length; check it
        // before trusting anything else in the frame.
        let actual = crc8(&data[..3]);
        let expected = data[3];
        if expected != actual {
            return Err(Error::HeaderCrcMismatch { expected, actual });
        }

        if header.shared() {
            return Err(Error::Unsupported(UnsupportedFeature::SharedMode));
        }
        if header.sync_ack() {
            return Err(Error::Unsupported(UnsupportedFeature::AckRequest));
        }
        if header.network_services() {
            return Err(Error::Unsupported(UnsupportedFeature::NetworkServices));
        }
        if header.extended_length() {
            return Err(Error::Unsupported(UnsupportedFeature::ExtendedLength));
        }
        if header.packet_id() {
            return Err(Error::Unsupported(UnsupportedFeature::PacketId));
        }

        let payload_start = if header.sender_info() {
            HEADER_LEN
        } else {
            HEADER_LEN - 1
        };
        let crc_len = if header.crc32() { 4 } else { 1 };
        if data.len() < payload_start + crc_len {
            return Err(Error::FrameTooShort { len: data.len() });
        }
        let crc_end = data.len() - crc_len;

        if header.crc32() {
            let expected = u32::from_be_bytes([
                data[crc_end],
                data[crc_end + 1],
                data[crc_end + 2],
                data[crc_end + 3],
            ]);
            if crc32(&data[..crc_end]) != expected {
                return Err(Error::PayloadCrcMismatch);
            }
        } else if crc8(&data[..crc_end]) != data[crc_end] {
            return Err(Error::PayloadCrcMismatch);
        }

        let payload = &data[payload_start..crc_end];
        if payload.len() == 1 && payload[0] != 0 {
            return Err(Error::Remote(payload[0]));
        }
        FrameBuf::from_slice(payload)
            .map(Some)
            .map_err(|_| Error::BufferOverflow)
    }
}

/// Bit-serial CRC8, polynomial 0x97.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let odd = (b ^ crc) & 1 == 1;
            crc >>= 1;
            b >>= 1;
            if odd {
                crc ^= 0x97;
            }
        }
    }
    crc
}

/// Reflected CRC32, polynomial 0xEDB88320, init and final XOR 0xFFFFFFFF.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let odd = crc & 1 == 1;
            crc >>= 1;
            if odd {
                crc ^= 0xEDB8_8320;
            }
        }
    }
    crc ^ 0xFFFF_FFFF
}

fn is_special(b: u8) -> bool {
    b == SFSP_START || b == SFSP_END || b == SFSP_ESC
}

/// Escape every delimiter byte occurring in `data`.
fn escape(data: &[u8]) -> Option<heapless::Vec<u8, MAX_WIRE>> {
    let mut out = heapless::Vec::new();
    for &b in data {
        if is_special(b) {
            out.push(SFSP_ESC).ok()?;
            out.push(b ^ SFSP_ESC).ok()?;
        } else {
            out.push(b).ok()?;
        }
    }
    Some(out)
}
