pub mod ipv4;
pub mod packet;
pub mod socket;

pub use ipv4::*;
pub use packet::*;
pub use socket::*;

/// Largest datagram the receive path will ever have to hold.
pub const MAX_PACKET_SIZE: usize = 65535;

/// ICMP message types, as carried in the first byte of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestinationUnreachable,
    SourceQuench,
    Redirect,
    EchoRequest,
    RouterAdvertisement,
    RouterSolicitation,
    TimeExceeded,
    ParameterProblem,
    TimestampRequest,
    TimestampReply,
    InformationRequest,
    InformationReply,
    AddressMaskRequest,
    AddressMaskReply,
    Traceroute,
    Unknown(u8),
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            0 => IcmpType::EchoReply,
            3 => IcmpType::DestinationUnreachable,
            4 => IcmpType::SourceQuench,
            5 => IcmpType::Redirect,
            8 => IcmpType::EchoRequest,
            9 => IcmpType::RouterAdvertisement,
            10 => IcmpType::RouterSolicitation,
            11 => IcmpType::TimeExceeded,
            12 => IcmpType::ParameterProblem,
            13 => IcmpType::TimestampRequest,
            14 => IcmpType::TimestampReply,
            15 => IcmpType::InformationRequest,
            16 => IcmpType::InformationReply,
            17 => IcmpType::AddressMaskRequest,
            18 => IcmpType::AddressMaskReply,
            30 => IcmpType::Traceroute,
            other => IcmpType::Unknown(other),
        }
    }
}

impl std::fmt::Display for IcmpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IcmpType::EchoReply => write!(f, "Echo reply"),
            IcmpType::DestinationUnreachable => write!(f, "Destination host unreachable"),
            IcmpType::SourceQuench => write!(f, "Source quench"),
            IcmpType::Redirect => write!(f, "Redirect"),
            IcmpType::EchoRequest => write!(f, "Echo request"),
            IcmpType::RouterAdvertisement => write!(f, "Router advertisement"),
            IcmpType::RouterSolicitation => write!(f, "Router solicitation"),
            IcmpType::TimeExceeded => write!(f, "Time exceeded"),
            IcmpType::ParameterProblem => write!(f, "Parameter problem"),
            IcmpType::TimestampRequest => write!(f, "Timestamp request"),
            IcmpType::TimestampReply => write!(f, "Timestamp reply"),
            IcmpType::InformationRequest => write!(f, "Information request"),
            IcmpType::InformationReply => write!(f, "Information reply"),
            IcmpType::AddressMaskRequest => write!(f, "Address mask request"),
            IcmpType::AddressMaskReply => write!(f, "Address mask reply"),
            IcmpType::Traceroute => write!(f, "Traceroute"),
            IcmpType::Unknown(code) => write!(f, "Unknown ICMP type: {}", code),
        }
    }
}

/// Reasons a received header could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated { needed: usize, available: usize },
    InvalidVersion(u8),
    InvalidOptionsLength(isize),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated { needed, available } => {
                write!(f, "Packet too short: need {} bytes, have {}", needed, available)
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "Not an IPv4 header (version {})", version)
            }
            DecodeError::InvalidOptionsLength(len) => {
                write!(f, "Invalid IPv4 options length: {}", len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
