//! Impersonate an Outback MATE control panel and talk to the devices on its
//! proprietary RJ45 bus ("MateNET").
//!
//! MateNET is 9-bit serial at 9600 baud: the 9th bit marks the first byte of
//! each packet, and everything on the wire is big-endian binary. Two wire
//! framings are supported behind one [`Transport`] capability:
//!
//! * [`serial9::SerialTransport`] drives a real MateNET cable through a
//!   standard UART, faking the 9th bit with parity tricks.
//! * [`pjon::PjonTransport`] carries MateNET packets over a PJON/SFSP byte
//!   stream, for bridge hardware that talks ordinary 8n1 serial.
//!
//! On top of either transport, [`Bus`] runs the request/response engine
//! (bounded retries over an unreliable half-duplex line), discovers what is
//! attached ([`Bus::enumerate`], [`Bus::find_device`]) and reads or writes
//! 16-bit device registers. [`MateDevice`] scopes those operations to one hub
//! port.
//!
//! Status and log payloads come back as raw bytes: their layout is specific
//! to each device model, and decoding them into physical units is a job for
//! the crates sitting on top of this one.
//!
//! Bus pinout (RJ45, matching the green/orange pairs of a CAT5 cable):
//! 1 +V battery, 2 GND, 3 TX (MATE to device), 6 RX (device to MATE). The
//! logic levels are 0-24 V, so a level shifter is required in front of any
//! PC UART.

pub mod bus;
pub mod device;
pub mod error;
pub mod link;
pub mod packet;
pub mod pjon;
pub mod serial9;
pub mod transport;

#[cfg(test)]
mod mock;

pub use bus::Bus;
pub use device::{BusTopology, DeviceDescriptor, DeviceType, MateDevice};
pub use error::{Error, Result};
pub use packet::{Packet, PacketType};
pub use transport::{FrameBuf, Transport};
