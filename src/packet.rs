//! Fixed-layout MateNET application packets.
//!
//! Every request is the same 6 bytes, big-endian: port, type, a 16-bit
//! register address and a 16-bit parameter. The framing layer appends its own
//! checksum; none of that appears here.

use strum_macros::{EnumIter, FromRepr};

/// Serialized length of a request body, before the framing checksum.
pub const PACKET_LEN: usize = 6;

/// Length of the value in a register query response.
pub const QUERY_RESPONSE_LEN: usize = 2;

/// MateNET request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum PacketType {
    /// Read a 16-bit register.
    Read = 2,
    /// Write a 16-bit register.
    Write = 3,
    /// Request a raw status snapshot.
    Status = 4,
    /// Request a raw log page.
    Log = 22,
}

/// One application-level request. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub port: u8,
    pub ptype: PacketType,
    pub addr: u16,
    pub param: u16,
}

impl Packet {
    /// Build a packet, checking that `port` is in the hub range [0..9].
    pub fn new(port: u8, ptype: PacketType, addr: u16, param: u16) -> Option<Packet> {
        if port <= 9 {
            Some(Packet {
                port,
                ptype,
                addr,
                param,
            })
        } else {
            None
        }
    }

    /// Panics if `port` is outside of the range 0..9.
    pub fn new_unchecked(port: u8, ptype: PacketType, addr: u16, param: u16) -> Packet {
        Packet::new(port, ptype, addr, param).expect("port out of range")
    }

    /// The on-wire request body.
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let addr = self.addr.to_be_bytes();
        let param = self.param.to_be_bytes();
        [
            self.port,
            self.ptype as u8,
            addr[0],
            addr[1],
            param[0],
            param[1],
        ]
    }
}

/// Decode the 16-bit value from a query/control response payload.
pub fn query_value(payload: &[u8]) -> Option<u16> {
    if payload.len() < QUERY_RESPONSE_LEN {
        return None;
    }
    Some(u16::from_be_bytes([payload[0], payload[1]]))
}
