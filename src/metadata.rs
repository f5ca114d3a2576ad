//! Destination metadata.
//!
//! Every connection routed through an outbound adapter is described by a
//! [`Metadata`]: the transport, the address family, the host or IP, and the
//! destination port exactly as the caller wrote it.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Transport requested for a destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Network {
    /// Stream transport
    #[default]
    Tcp,
    /// Datagram transport
    Udp,
}

impl Network {
    /// Map a Go-style network name (`tcp`, `udp4`, ...) to a transport.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "udp" | "udp4" | "udp6" => Ok(Network::Udp),
            _ => Err(Error::UnsupportedNetwork(name.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// Address family of a destination, numbered like SOCKS5 ATYP.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrType {
    /// IPv4 literal
    Ipv4 = 0x01,
    /// Domain name, resolved by the outbound
    DomainName = 0x03,
    /// IPv6 literal
    Ipv6 = 0x04,
}

/// Destination of a proxied connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Transport to dial
    pub network: Network,
    /// Address family
    pub addr_type: AddrType,
    /// Domain name; empty for IP destinations
    pub host: String,
    /// IP address; `None` for domain destinations
    pub dst_ip: Option<IpAddr>,
    /// Destination port, kept as given
    pub dst_port: String,
}

impl Metadata {
    /// Metadata for a domain destination.
    pub fn domain(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            network: Network::Tcp,
            addr_type: AddrType::DomainName,
            host: host.into(),
            dst_ip: None,
            dst_port: port.into(),
        }
    }

    /// Metadata for an IP destination, port given as a string.
    pub fn ip(ip: IpAddr, port: impl Into<String>) -> Self {
        // IPv4-mapped IPv6 addresses are treated as IPv4.
        let ip = match ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        let addr_type = match ip {
            IpAddr::V4(_) => AddrType::Ipv4,
            IpAddr::V6(_) => AddrType::Ipv6,
        };
        Self {
            network: Network::Tcp,
            addr_type,
            host: String::new(),
            dst_ip: Some(ip),
            dst_port: port.into(),
        }
    }

    /// Metadata for a resolved socket address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::ip(addr.ip(), addr.port().to_string())
    }

    /// Set the transport.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Destination port as a number.
    pub fn port_number(&self) -> Result<u16> {
        self.dst_port
            .parse()
            .map_err(|_| Error::InvalidAddress {
                address: self.remote_address(),
                reason: "invalid port",
            })
    }

    /// `host:port` string suitable for dialing.
    pub fn remote_address(&self) -> String {
        match (self.addr_type, self.dst_ip) {
            (AddrType::Ipv6, Some(ip)) => format!("[{}]:{}", ip, self.dst_port),
            (_, Some(ip)) => format!("{}:{}", ip, self.dst_port),
            (_, None) => format!("{}:{}", self.host, self.dst_port),
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.remote_address())
    }
}

/// Split `host:port` the way Go's `net.SplitHostPort` does.
///
/// IPv6 hosts must be bracketed. The port may be empty or non-numeric.
pub fn split_host_port(raw: &str) -> Result<(&str, &str)> {
    let fail = |reason| Error::InvalidAddress {
        address: raw.to_string(),
        reason,
    };

    let colon = raw.rfind(':').ok_or_else(|| fail("missing port in address"))?;

    let (host, host_start, host_end) = if raw.starts_with('[') {
        let end = raw.find(']').ok_or_else(|| fail("missing ']' in address"))?;
        if end + 1 == raw.len() {
            return Err(fail("missing port in address"));
        }
        if end + 1 != colon {
            if raw.as_bytes()[end + 1] == b':' {
                return Err(fail("too many colons in address"));
            }
            return Err(fail("missing port in address"));
        }
        (&raw[1..end], 1, end + 1)
    } else {
        let host = &raw[..colon];
        if host.contains(':') {
            return Err(fail("too many colons in address"));
        }
        (host, 0, 0)
    };

    if raw[host_start..].contains('[') {
        return Err(fail("unexpected '[' in address"));
    }
    if raw[host_end..].contains(']') {
        return Err(fail("unexpected ']' in address"));
    }

    Ok((host, &raw[colon + 1..]))
}

/// Build TCP metadata from a raw `host:port` destination.
///
/// Hosts that do not parse as an IP literal are treated as domain names.
pub fn addr_to_metadata(raw: &str) -> Result<Metadata> {
    let (host, port) = split_host_port(raw)?;

    match host.parse::<IpAddr>() {
        Ok(ip) => Ok(Metadata::ip(ip, port)),
        Err(_) => Ok(Metadata::domain(host, port)),
    }
}
