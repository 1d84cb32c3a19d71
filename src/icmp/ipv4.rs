use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

use crate::icmp::DecodeError;

pub const IPV4_VERSION: u8 = 4;
pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV4_MAX_OPTIONS_LEN: usize = 40;

/// Borrowed view over an IPv4 header as delivered by a raw socket, plus the
/// bytes that follow it.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    header: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    pub fn from_bytes(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: IPV4_HEADER_LEN,
                available: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != IPV4_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let header_len = usize::from(data[0] & 0x0F) * 4;
        let options_len = header_len as isize - IPV4_HEADER_LEN as isize;
        if options_len < 0 || options_len > IPV4_MAX_OPTIONS_LEN as isize {
            return Err(DecodeError::InvalidOptionsLength(options_len));
        }

        if data.len() < header_len {
            return Err(DecodeError::Truncated {
                needed: header_len,
                available: data.len(),
            });
        }

        let (header, payload) = data.split_at(header_len);
        Ok(Self { header, payload })
    }

    pub fn version(&self) -> u8 {
        self.header[0] >> 4
    }

    /// Header length in bytes, options included.
    pub fn header_length(&self) -> usize {
        self.header.len()
    }

    pub fn type_of_service(&self) -> u8 {
        self.header[1]
    }

    pub fn total_length(&self) -> u16 {
        BigEndian::read_u16(&self.header[2..4])
    }

    pub fn identification(&self) -> u16 {
        BigEndian::read_u16(&self.header[4..6])
    }

    pub fn dont_fragment(&self) -> bool {
        self.header[6] & 0x40 != 0
    }

    pub fn more_fragments(&self) -> bool {
        self.header[6] & 0x20 != 0
    }

    pub fn fragment_offset(&self) -> u16 {
        BigEndian::read_u16(&self.header[6..8]) & 0x1FFF
    }

    pub fn time_to_live(&self) -> u8 {
        self.header[8]
    }

    pub fn protocol(&self) -> u8 {
        self.header[9]
    }

    pub fn header_checksum(&self) -> u16 {
        BigEndian::read_u16(&self.header[10..12])
    }

    pub fn source_address(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[12], self.header[13], self.header[14], self.header[15])
    }

    pub fn destination_address(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[16], self.header[17], self.header[18], self.header[19])
    }

    pub fn options(&self) -> &'a [u8] {
        &self.header[IPV4_HEADER_LEN..]
    }

    /// Everything after the header, typically the ICMP message.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

pub fn decode_ipv4_header(data: &[u8]) -> Result<Ipv4Header<'_>, DecodeError> {
    Ipv4Header::from_bytes(data)
}
