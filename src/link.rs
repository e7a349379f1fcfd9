//! The serial-line seam beneath the transports.
//!
//! Both transports move plain bytes through [`embedded_io::Read`] and
//! [`embedded_io::Write`]. The 9-bit emulation additionally has to switch the
//! UART parity mode per byte and shorten the read timeout mid-exchange, which
//! is what [`SerialLink`] adds on top.

use core::time::Duration;

/// UART parity modes used to carry the 9th bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
    /// Parity bit always 1.
    Mark,
    /// Parity bit always 0.
    Space,
}

/// A serial line the MateNET transports can drive.
///
/// `read` must honour the configured read timeout and return `Ok(0)` when it
/// elapses with no data; the transports use that as their end-of-frame
/// signal.
pub trait SerialLink: embedded_io::Read + embedded_io::Write {
    /// Switch the parity mode used for subsequent writes.
    fn set_parity(&mut self, parity: Parity) -> Result<(), Self::Error>;

    /// Change the timeout applied to subsequent reads.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error>;

    /// Whether the hardware can transmit mark/space parity directly.
    fn supports_space_mark(&self) -> bool {
        false
    }
}

#[cfg(feature = "serialport")]
pub use system::{LinkError, SystemLink};

#[cfg(feature = "serialport")]
mod system {
    use std::io::{Read as _, Write as _};
    use std::time::Duration;

    use super::{Parity, SerialLink};

    /// A [`SerialLink`] over a system serial port.
    ///
    /// The `serialport` crate exposes no mark/space parity modes, so this
    /// link reports that capability as absent and the 9-bit transport takes
    /// its odd/even emulation path instead.
    pub struct SystemLink {
        port: Box<dyn serialport::SerialPort>,
    }

    impl SystemLink {
        /// Open `path` at `baud` (MateNET itself runs at 9600), starting out
        /// with odd parity and a one second read timeout.
        pub fn open(path: &str, baud: u32) -> serialport::Result<Self> {
            let port = serialport::new(path, baud)
                .parity(serialport::Parity::Odd)
                .timeout(Duration::from_secs(1))
                .open()?;
            Ok(Self { port })
        }
    }

    impl From<Box<dyn serialport::SerialPort>> for SystemLink {
        fn from(port: Box<dyn serialport::SerialPort>) -> Self {
            Self { port }
        }
    }

    /// I/O error raised by [`SystemLink`].
    #[derive(Debug)]
    pub struct LinkError(pub std::io::Error);

    impl core::fmt::Display for LinkError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for LinkError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl embedded_io::Error for LinkError {
        fn kind(&self) -> embedded_io::ErrorKind {
            match self.0.kind() {
                std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
                std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
                std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
                std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
                std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
                std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
                std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
                std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
                _ => embedded_io::ErrorKind::Other,
            }
        }
    }

    impl embedded_io::ErrorType for SystemLink {
        type Error = LinkError;
    }

    impl embedded_io::Read for SystemLink {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            match self.port.read(buf) {
                Ok(n) => Ok(n),
                // A timed-out read is the normal end-of-frame condition, not
                // a failure.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(LinkError(e)),
            }
        }
    }

    impl embedded_io::Write for SystemLink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.port.write(buf).map_err(LinkError)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.port.flush().map_err(LinkError)
        }
    }

    impl SerialLink for SystemLink {
        fn set_parity(&mut self, parity: Parity) -> Result<(), Self::Error> {
            let parity = match parity {
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
                Parity::Mark | Parity::Space => {
                    return Err(LinkError(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "mark/space parity not available on this port",
                    )));
                }
            };
            self.port
                .set_parity(parity)
                .map_err(|e| LinkError(std::io::Error::other(e)))
        }

        fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
            self.port
                .set_timeout(timeout)
                .map_err(|e| LinkError(std::io::Error::other(e)))
        }
    }
}
