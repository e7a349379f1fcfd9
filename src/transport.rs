//! The capability shared by both wire framings.

use core::time::Duration;

use crate::error::Error;

/// Largest de-escaped frame either framing can carry.
pub const MAX_FRAME: usize = 256;

/// Owned frame/payload bytes.
pub type FrameBuf = heapless::Vec<u8, MAX_FRAME>;

/// One MateNET wire framing.
///
/// Implementations frame, checksum and transmit raw packet bytes, and hand
/// back validated, de-framed payloads. `recv` returning `Ok(None)` means
/// nothing addressed to us arrived before the timeout; the bus client treats
/// that as retryable silence. A frame that fails validation is never returned
/// as data.
pub trait Transport {
    /// Error type of the serial link beneath this transport.
    type LinkError: embedded_io::Error;

    /// Frame and transmit `data`.
    fn send(&mut self, data: &[u8]) -> Result<(), Error<Self::LinkError>>;

    /// Wait up to `timeout` for a frame and return its validated payload.
    ///
    /// `expected_len` is the payload length the caller anticipates; framings
    /// may use it to recover from line noise.
    fn recv(
        &mut self,
        expected_len: Option<usize>,
        timeout: Duration,
    ) -> Result<Option<FrameBuf>, Error<Self::LinkError>>;
}
