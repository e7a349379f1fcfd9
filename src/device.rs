//! Devices on the bus: type codes, discovery results, and per-device
//! sessions.

use core::fmt;

use crate::bus::Bus;
use crate::error::Error;
use crate::packet::PacketType;
use crate::transport::{FrameBuf, Transport};

/// Registers every MateNET device answers at the protocol level.
pub mod registers {
    /// Identifies the attached device; the low byte is a device-type code.
    pub const DEVICE_TYPE: u16 = 0x0000;
    /// Firmware revision, first group.
    pub const REVISION_A: u16 = 0x0002;
    /// Firmware revision, second group.
    pub const REVISION_B: u16 = 0x0003;
    /// Firmware revision, third group.
    pub const REVISION_C: u16 = 0x0004;
}

/// What kind of device answered a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Fans the bus out to up to 9 sub-ports.
    Hub,
    /// FX-series inverter/charger.
    Fx,
    /// MX-series charge controller.
    Mx,
    /// FLEXnet DC monitor.
    FlexNetDc,
    /// A code this crate does not know about.
    Unknown(u8),
}

impl DeviceType {
    /// Decode the low byte of the device-type register.
    pub fn from_code(code: u8) -> DeviceType {
        match code {
            1 => DeviceType::Hub,
            2 => DeviceType::Fx,
            3 => DeviceType::Mx,
            4 => DeviceType::FlexNetDc,
            other => DeviceType::Unknown(other),
        }
    }

    /// The on-bus code for this device type.
    pub fn code(&self) -> u8 {
        match *self {
            DeviceType::Hub => 1,
            DeviceType::Fx => 2,
            DeviceType::Mx => 3,
            DeviceType::FlexNetDc => 4,
            DeviceType::Unknown(code) => code,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DeviceType::Hub => write!(f, "Hub"),
            DeviceType::Fx => write!(f, "FX"),
            DeviceType::Mx => write!(f, "MX"),
            DeviceType::FlexNetDc => write!(f, "FLEXnet DC"),
            DeviceType::Unknown(code) => write!(f, "Unknown({code:#04x})"),
        }
    }
}

/// A device observed at a port during a scan.
///
/// A point-in-time observation: the bus keeps no directory, so descriptors go
/// stale the moment the cabling changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_type: DeviceType,
    pub port: u8,
    /// Firmware revision, once fetched; enumeration leaves it empty.
    pub revision: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(device_type: DeviceType, port: u8) -> Self {
        Self {
            device_type,
            port,
            revision: None,
        }
    }
}

/// What one enumeration pass found on ports 0-9. Rebuilt from scratch on
/// every pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BusTopology {
    ports: [Option<DeviceDescriptor>; 10],
}

impl BusTopology {
    /// Highest hub port number.
    pub const MAX_PORT: u8 = 9;

    /// The device at `port`, if one answered.
    pub fn get(&self, port: u8) -> Option<&DeviceDescriptor> {
        self.ports.get(usize::from(port)).and_then(Option::as_ref)
    }

    pub(crate) fn insert(&mut self, descriptor: DeviceDescriptor) {
        let port = usize::from(descriptor.port);
        if port < self.ports.len() {
            self.ports[port] = Some(descriptor);
        }
    }

    /// All devices found, in port order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.ports.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// A register-level session with the device behind one port.
///
/// Holds the bus exclusively for its lifetime: MateNET is half duplex with a
/// single outstanding request, and the borrow makes that rule structural
/// instead of a calling convention.
pub struct MateDevice<'bus, T: Transport> {
    bus: &'bus mut Bus<T>,
    port: u8,
}

impl<'bus, T: Transport> MateDevice<'bus, T> {
    pub fn new(bus: &'bus mut Bus<T>, port: u8) -> Self {
        Self { bus, port }
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    /// Ask what is attached to this port.
    pub fn scan(&mut self) -> Result<Option<DeviceType>, Error<T::LinkError>> {
        self.bus.scan(self.port)
    }

    /// Raw request against this port.
    pub fn send(
        &mut self,
        ptype: PacketType,
        addr: u16,
        param: u16,
        response_len: Option<usize>,
    ) -> Result<FrameBuf, Error<T::LinkError>> {
        self.bus.send(ptype, addr, param, self.port, response_len)
    }

    /// Read a 16-bit register.
    pub fn query(&mut self, reg: u16, param: u16) -> Result<u16, Error<T::LinkError>> {
        self.bus.query(reg, param, self.port)
    }

    /// Write a 16-bit register.
    pub fn control(&mut self, reg: u16, value: u16) -> Result<(), Error<T::LinkError>> {
        self.bus.control(reg, value, self.port)
    }

    /// Firmware revision of the attached device, formatted `AAA.BBB.CCC`.
    pub fn revision(&mut self) -> Result<String, Error<T::LinkError>> {
        let a = self.query(registers::REVISION_A, 0)?;
        let b = self.query(registers::REVISION_B, 0)?;
        let c = self.query(registers::REVISION_C, 0)?;
        Ok(format!("{a:03}.{b:03}.{c:03}"))
    }

    /// Request a raw status snapshot.
    ///
    /// `addr` selects the status page; most devices use 1, the FLEXnet DC
    /// exposes several. The payload layout is model-specific and handed back
    /// undecoded.
    pub fn status(
        &mut self,
        addr: u16,
        response_len: Option<usize>,
    ) -> Result<FrameBuf, Error<T::LinkError>> {
        self.send(PacketType::Status, addr, 0, response_len)
    }

    /// Request a raw daily log page. `day` counts back from today (0).
    pub fn log_page(
        &mut self,
        day: u8,
        response_len: Option<usize>,
    ) -> Result<FrameBuf, Error<T::LinkError>> {
        // The parameter is the negated day, two's complement on the wire.
        let param = (-i16::from(day)) as u16;
        self.send(PacketType::Log, 0, param, response_len)
    }
}
