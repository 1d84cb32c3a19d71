use byteorder::{BigEndian, ByteOrder};

use crate::icmp::{DecodeError, IcmpType};

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_HEADER_LEN: usize = 8;

/// Fixed 8-byte ICMP header. The payload travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
}

impl IcmpHeader {
    pub fn new_echo_request(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
        }
    }

    /// Reads the first 8 bytes verbatim. The checksum is not verified.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: ICMP_HEADER_LEN,
                available: data.len(),
            });
        }

        Ok(Self {
            icmp_type: data[0],
            code: data[1],
            checksum: BigEndian::read_u16(&data[2..4]),
            identifier: BigEndian::read_u16(&data[4..6]),
            sequence: BigEndian::read_u16(&data[6..8]),
        })
    }

    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.icmp_type;
        bytes[1] = self.code;
        BigEndian::write_u16(&mut bytes[2..4], self.checksum);
        BigEndian::write_u16(&mut bytes[4..6], self.identifier);
        BigEndian::write_u16(&mut bytes[6..8], self.sequence);
        bytes
    }

    /// Recomputes the checksum over this header and `payload`.
    pub fn update_checksum(&mut self, payload: &[u8]) {
        self.checksum = 0;
        let mut bytes = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
        bytes.extend_from_slice(&self.to_bytes());
        bytes.extend_from_slice(payload);
        self.checksum = internet_checksum(&bytes);
    }

    pub fn kind(&self) -> IcmpType {
        IcmpType::from(self.icmp_type)
    }

    pub fn is_echo(&self) -> bool {
        self.icmp_type == ICMP_ECHO_REQUEST || self.icmp_type == ICMP_ECHO_REPLY
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY
    }
}

/// Builds a complete echo request: header followed by `payload`.
pub fn encode_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut header = IcmpHeader::new_echo_request(identifier, sequence);
    header.update_checksum(payload);

    let mut bytes = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn decode_icmp_header(data: &[u8]) -> Result<IcmpHeader, DecodeError> {
    IcmpHeader::from_bytes(data)
}

pub fn is_echo(header: &IcmpHeader) -> bool {
    header.is_echo()
}

/// One's-complement sum of `data` as big-endian 16-bit words. The carry is
/// folded back after every word, so any length is accepted. An odd trailing
/// byte is zero-extended.
pub fn ones_complement_sum(data: &[u8]) -> u16 {
    data.chunks(2)
        .map(|word| match word {
            [hi, lo] => (u32::from(*hi) << 8) | u32::from(*lo),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .fold(0u32, |sum, word| {
            let sum = sum + word;
            (sum & 0xFFFF) + (sum >> 16)
        }) as u16
}

/// RFC 1071 Internet checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !ones_complement_sum(data)
}
