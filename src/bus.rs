//! The request/response engine and bus discovery.
//!
//! MateNET is half duplex with a single outstanding request: the MATE sends
//! one packet and the addressed device answers or stays silent. [`Bus`] owns
//! that exchange, including the retry policy the bus's unreliability makes
//! necessary, and the discovery operations built on the device-type register.

use core::time::Duration;

use log::{debug, info};

use crate::device::{BusTopology, DeviceDescriptor, DeviceType, registers};
use crate::error::Error;
use crate::packet::{self, Packet, PacketType};
use crate::transport::{FrameBuf, Transport};

/// Resend a packet this many times when the bus stays silent or the reply is
/// garbled.
pub const RETRY_PACKET: usize = 2;

/// Default time to wait for the first response byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A MATE's view of the bus: one synchronous exchange at a time, with
/// bounded retries per exchange. No retry state survives across exchanges.
pub struct Bus<T: Transport> {
    transport: T,
    retries: usize,
    timeout: Duration,
}

impl<T: Transport> Bus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retries: RETRY_PACKET,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Change how many times a failed exchange is retried.
    pub fn set_retries(&mut self, retries: usize) {
        self.retries = retries;
    }

    /// Change the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send one request and return the response payload, with the leading
    /// command-ack byte stripped.
    ///
    /// Transport failures and silence are retried; once the device has
    /// actually answered, validation failures are final.
    pub fn send(
        &mut self,
        ptype: PacketType,
        addr: u16,
        param: u16,
        port: u8,
        response_len: Option<usize>,
    ) -> Result<FrameBuf, Error<T::LinkError>> {
        let packet = Packet::new(port, ptype, addr, param).ok_or(Error::InvalidPort(port))?;
        let body = packet.to_bytes();
        // The response carries a command-ack byte ahead of the payload.
        let response_len = response_len.map(|len| len + 1);
        debug!("send port={port} type={ptype:?} addr={addr:#06x} param={param:#06x}");

        let mut response = None;
        let mut last_err = Error::NoResponse;
        for attempt in 0..=self.retries {
            let result = self
                .transport
                .send(&body)
                .and_then(|()| self.transport.recv(response_len, self.timeout));
            match result {
                Ok(Some(data)) => {
                    response = Some(data);
                    break;
                }
                Ok(None) => {
                    debug!("no response (attempt {attempt})");
                    last_err = Error::NoResponse;
                }
                Err(e) => {
                    debug!("transport error (attempt {attempt}): {e}");
                    last_err = e;
                }
            }
        }
        let data = response.ok_or(last_err)?;

        if data.len() < 2 {
            return Err(Error::ResponseTooShort { len: data.len() });
        }
        if data[0] & 0x80 != 0 {
            return Err(Error::InvalidCommand(data[0] & 0x7F));
        }
        FrameBuf::from_slice(&data[1..]).map_err(|_| Error::BufferOverflow)
    }

    /// Read a 16-bit register.
    pub fn query(&mut self, reg: u16, param: u16, port: u8) -> Result<u16, Error<T::LinkError>> {
        let payload = self.send(
            PacketType::Read,
            reg,
            param,
            port,
            Some(packet::QUERY_RESPONSE_LEN),
        )?;
        packet::query_value(&payload).ok_or(Error::ResponseTooShort {
            len: payload.len(),
        })
    }

    /// Write a 16-bit register.
    pub fn control(&mut self, reg: u16, value: u16, port: u8) -> Result<(), Error<T::LinkError>> {
        // TODO: work out what a control response actually carries; for now a
        // validated exchange is all we require.
        self.send(
            PacketType::Write,
            reg,
            value,
            port,
            Some(packet::QUERY_RESPONSE_LEN),
        )?;
        Ok(())
    }

    /// Ask what is attached to `port`. `None` means nothing answered.
    pub fn scan(&mut self, port: u8) -> Result<Option<DeviceType>, Error<T::LinkError>> {
        match self.query(registers::DEVICE_TYPE, 0, port) {
            // The upper byte is undocumented but set on some MX units; only
            // the low byte carries the device type.
            Ok(value) => Ok(Some(DeviceType::from_code((value & 0x00FF) as u8))),
            Err(Error::NoResponse) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Enumerate the whole bus.
    ///
    /// Port 0 is the bus root and holds either a single device or a hub;
    /// ports 1-9 are only probed when a hub answers there. Every empty hub
    /// port costs a full response timeout, so attached devices should occupy
    /// consecutive ports starting at 1.
    pub fn enumerate(&mut self) -> Result<BusTopology, Error<T::LinkError>> {
        let mut topology = BusTopology::default();
        let root = self.scan(0)?.ok_or(Error::NoDevicesFound)?;
        topology.insert(DeviceDescriptor::new(root, 0));

        if root == DeviceType::Hub {
            for port in 1..=BusTopology::MAX_PORT {
                info!("scanning port {port}");
                if let Some(device_type) = self.scan(port)? {
                    topology.insert(DeviceDescriptor::new(device_type, port));
                }
            }
        }
        Ok(topology)
    }

    /// Find the first port with a device of the given type attached.
    ///
    /// A linear probe of ports 0-9; the bus offers no directory to ask.
    pub fn find_device(&mut self, device_type: DeviceType) -> Result<u8, Error<T::LinkError>> {
        for port in 0..=BusTopology::MAX_PORT {
            if self.scan(port)? == Some(device_type) {
                info!("found {device_type} device at port {port}");
                return Ok(port);
            }
        }
        Err(Error::DeviceNotFound(device_type))
    }
}
