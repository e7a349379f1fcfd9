//! Error types for the MateNET bus.

use thiserror::Error;

use crate::device::DeviceType;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Everything that can go wrong while talking to the bus.
///
/// Generic over the error type of the serial link beneath the transport, the
/// same way the transports themselves are.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    /// The underlying serial link failed.
    #[error("serial link error")]
    Link(I),
    /// No bytes arrived before the exchange timeout.
    #[error("no response from the bus")]
    NoResponse,
    /// A frame arrived with fewer bytes than its framing requires.
    #[error("received frame too short ({len} bytes)")]
    FrameTooShort { len: usize },
    /// A PJON frame's declared length disagrees with what was received.
    #[error("frame length mismatch (declared {declared}, received {received})")]
    InvalidLength { declared: usize, received: usize },
    /// The 16-bit frame checksum did not match.
    #[error("invalid checksum (expected {expected:#06x}, computed {actual:#06x})")]
    ChecksumMismatch { expected: u16, actual: u16 },
    /// The PJON header CRC did not match.
    #[error("bad header CRC (expected {expected:#04x}, computed {actual:#04x})")]
    HeaderCrcMismatch { expected: u8, actual: u8 },
    /// The PJON payload CRC did not match.
    #[error("bad payload CRC")]
    PayloadCrcMismatch,
    /// The peer set a PJON header bit this implementation does not support.
    #[error("{0} not supported")]
    Unsupported(UnsupportedFeature),
    /// The remote controller answered with a protocol-level error code.
    #[error("error returned from controller: {0:#04x}")]
    Remote(u8),
    /// The device rejected the command (status byte had its high bit set).
    #[error("invalid command {0:#04x}")]
    InvalidCommand(u8),
    /// The device answered with fewer bytes than the operation requires.
    #[error("response too short ({len} bytes)")]
    ResponseTooShort { len: usize },
    /// Port 0 did not answer during enumeration.
    #[error("no devices found on the bus")]
    NoDevicesFound,
    /// No device of the requested type answered on any port.
    #[error("{0} device not found")]
    DeviceNotFound(DeviceType),
    /// Hub ports are numbered 0-9.
    #[error("port {0} out of range (0-9)")]
    InvalidPort(u8),
    /// A frame did not fit the fixed-size buffers.
    #[error("frame buffer overflow")]
    BufferOverflow,
}

/// PJON header bits that are understood but not implemented here.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedFeature {
    #[error("shared bus mode")]
    SharedMode,
    #[error("acknowledgement request")]
    AckRequest,
    #[error("network services")]
    NetworkServices,
    #[error("extended length")]
    ExtendedLength,
    #[error("packet identification")]
    PacketId,
}
