use dns_lookup::{LookupErrorKind, getaddrinfo, lookup_addr};
use std::net::{IpAddr, Ipv4Addr};

/// Why a hostname could not be turned into an IPv4 address.
#[derive(Debug)]
pub enum ResolveError {
    /// The name does not exist or has no IPv4 address.
    NotFound(String),
    /// Anything else: resolver unavailable, temporary failure, bad input.
    Other(anyhow::Error),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound(host) => write!(f, "Host not found: {}", host),
            ResolveError::Other(e) => write!(f, "Resolution failed: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Hostname to IPv4 resolution, blocking.
pub trait Resolve: Send + Sync {
    fn resolve_v4(&self, host: &str) -> Result<Ipv4Addr, ResolveError>;
}

/// Resolves through the system's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve_v4(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        resolve_hostname(host)
    }
}

pub fn resolve_hostname(hostname: &str) -> Result<Ipv4Addr, ResolveError> {
    // First try to parse as IP address
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(ResolveError::Other(anyhow::anyhow!(
                "IPv6 address provided: {}",
                hostname
            ))),
        };
    }

    let addresses = match getaddrinfo(Some(hostname), None, None) {
        Ok(addresses) => addresses,
        Err(e) if matches!(e.kind(), LookupErrorKind::NoName) => {
            log::debug!("getaddrinfo reports no such name: {}", hostname);
            return Err(ResolveError::NotFound(hostname.to_string()));
        }
        Err(e) => {
            let e: std::io::Error = e.into();
            return Err(ResolveError::Other(anyhow::anyhow!(
                "Lookup of {} failed: {}",
                hostname,
                e
            )));
        }
    };

    addresses
        .filter_map(|info| info.ok())
        .find_map(|info| match info.sockaddr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| ResolveError::NotFound(hostname.to_string()))
}

pub fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    lookup_addr(&IpAddr::V4(ip)).ok()
}
