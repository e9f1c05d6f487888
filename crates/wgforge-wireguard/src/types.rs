//! Address and endpoint primitives.
//!
//! Pure parsing and set arithmetic over CIDRs, plus the `host:port` endpoint
//! type. Everything here is side-effect free; the topology engine leans on
//! these predicates for its AllowedIPs invariants.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};

/// An allowed IP address or network in CIDR notation.
///
/// The address is kept exactly as written (interface addresses such as
/// `10.96.0.2/16` keep their host bits); all set arithmetic operates on the
/// truncated network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedIp {
    net: IpNet,
}

impl AllowedIp {
    /// Creates a new allowed IP from an `IpNet`.
    #[must_use]
    pub fn new(net: IpNet) -> Self {
        Self { net }
    }

    /// Creates an allowed IP from CIDR notation.
    ///
    /// A bare address (no `/prefix`) is accepted as a host route.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is neither a CIDR nor an IP address.
    pub fn from_cidr(s: &str) -> Result<Self> {
        if let Ok(net) = s.parse::<IpNet>() {
            return Ok(Self { net });
        }
        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(Self::host_route(addr));
        }
        Err(WireGuardError::InvalidAddress(s.to_string()))
    }

    /// Creates an allowed IP from CIDR notation, rejecting host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid CIDR, or if it has host
    /// bits set where a proper network is required.
    pub fn from_network_cidr(s: &str) -> Result<Self> {
        let net = s
            .parse::<IpNet>()
            .map_err(|e| WireGuardError::InvalidAddress(format!("{s}: {e}")))?;
        if net.addr() != net.network() {
            return Err(WireGuardError::InvalidAddress(format!(
                "{s}: host bits set where a network is required"
            )));
        }
        Ok(Self { net })
    }

    /// The host route (`/32` or `/128`) for a single address.
    #[must_use]
    pub fn host_route(addr: IpAddr) -> Self {
        let net = match addr {
            IpAddr::V4(v4) => IpNet::new(IpAddr::V4(v4), 32),
            IpAddr::V6(v6) => IpNet::new(IpAddr::V6(v6), 128),
        };
        // Prefix lengths above are the exact address widths.
        Self {
            net: net.unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Returns the network as written.
    #[must_use]
    pub const fn as_ipnet(&self) -> &IpNet {
        &self.net
    }

    /// Returns the address part (with host bits, if any).
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.net.addr()
    }

    /// Returns the prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// Returns the truncated network (host bits cleared).
    #[must_use]
    pub fn network(&self) -> IpNet {
        self.net.trunc()
    }

    /// Whether this is a single-address route (`/32` or `/128`).
    #[must_use]
    pub fn is_host_route(&self) -> bool {
        self.net.prefix_len() == self.net.max_prefix_len()
    }

    /// Whether this is `0.0.0.0/0` or `::/0`.
    #[must_use]
    pub fn is_default_route(&self) -> bool {
        self.net.prefix_len() == 0
    }

    /// Whether this route is IPv4.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self.net, IpNet::V4(_))
    }

    /// CIDR a ⊇ CIDR b, comparing truncated networks.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.network().contains(&other.network())
    }

    /// Non-empty intersection of two CIDRs.
    ///
    /// Prefix-aligned blocks overlap exactly when one contains the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Returns the CIDR string representation.
    #[must_use]
    pub fn to_cidr(&self) -> String {
        self.net.to_string()
    }

    fn sort_key(&self) -> (u8, std::cmp::Reverse<u8>, IpAddr) {
        let family = u8::from(!self.is_ipv4());
        (
            family,
            std::cmp::Reverse(self.prefix_len()),
            self.network().addr(),
        )
    }
}

impl FromStr for AllowedIp {
    type Err = WireGuardError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_cidr(s)
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}

/// Canonicalises a route list: deduplicates, drops entries strictly contained
/// by another entry, and sorts by (family, prefix length descending, network
/// address).
#[must_use]
pub fn canonicalize(routes: &[AllowedIp]) -> Vec<AllowedIp> {
    let mut keep: Vec<AllowedIp> = Vec::with_capacity(routes.len());
    for candidate in routes {
        if keep.iter().any(|k| k.network() == candidate.network()) {
            continue;
        }
        keep.push(candidate.clone());
    }

    let snapshot = keep.clone();
    keep.retain(|c| {
        !snapshot
            .iter()
            .any(|other| other.network() != c.network() && other.contains(c))
    });

    keep.sort_by_key(AllowedIp::sort_key);
    keep
}

/// The host part of an endpoint: a literal address or a DNS name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointHost {
    /// A literal IP address.
    Ip(IpAddr),
    /// A DNS name, resolved by WireGuard at handshake time.
    Name(String),
}

impl fmt::Display for EndpointHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(IpAddr::V6(v6)) => write!(f, "[{v6}]"),
            Self::Ip(IpAddr::V4(v4)) => write!(f, "{v4}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A WireGuard peer endpoint (`host:port`).
///
/// Accepts bracketed IPv6 (`[::1]:51820`), literal IPv4, and DNS names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: EndpointHost,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from a host and port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is zero.
    pub fn new(host: EndpointHost, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(WireGuardError::InvalidEndpoint(
                "port must be in 1..65535".to_string(),
            ));
        }
        Ok(Self { host, port })
    }

    /// Returns the host part.
    #[must_use]
    pub const fn host(&self) -> &EndpointHost {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = WireGuardError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || WireGuardError::InvalidEndpoint(s.to_string());

        let (host_str, port_str) = if let Some(rest) = s.strip_prefix('[') {
            // Bracketed IPv6: [addr]:port
            let (addr, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = tail.strip_prefix(':').ok_or_else(invalid)?;
            (addr, port)
        } else {
            s.rsplit_once(':').ok_or_else(invalid)?
        };

        if host_str.is_empty() || host_str.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let port: u16 = port_str.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        let host = if s.starts_with('[') {
            let v6: std::net::Ipv6Addr = host_str.parse().map_err(|_| invalid())?;
            EndpointHost::Ip(IpAddr::V6(v6))
        } else if let Ok(v4) = host_str.parse::<std::net::Ipv4Addr>() {
            EndpointHost::Ip(IpAddr::V4(v4))
        } else {
            if host_str.contains(':') || host_str.contains('/') {
                return Err(invalid());
            }
            EndpointHost::Name(host_str.to_string())
        };

        Ok(Self { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = WireGuardError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> AllowedIp {
        AllowedIp::from_cidr(s).expect("valid cidr")
    }

    #[test]
    fn from_cidr_accepts_networks_and_hosts() {
        assert_eq!(cidr("10.0.0.0/24").prefix_len(), 24);
        assert_eq!(cidr("10.0.0.5").prefix_len(), 32);
        assert_eq!(cidr("fd00::1").prefix_len(), 128);
    }

    #[test]
    fn from_cidr_rejects_garbage() {
        assert!(AllowedIp::from_cidr("not-an-ip").is_err());
        assert!(AllowedIp::from_cidr("10.0.0.0/33").is_err());
        assert!(AllowedIp::from_cidr("").is_err());
    }

    #[test]
    fn from_network_cidr_rejects_host_bits() {
        assert!(AllowedIp::from_network_cidr("10.0.0.0/24").is_ok());
        assert!(AllowedIp::from_network_cidr("10.0.0.1/24").is_err());
    }

    #[test]
    fn host_route_widths() {
        let v4 = AllowedIp::host_route("10.0.0.1".parse().expect("ip"));
        let v6 = AllowedIp::host_route("fd00::1".parse().expect("ip"));
        assert!(v4.is_host_route());
        assert!(v6.is_host_route());
        assert_eq!(v4.to_cidr(), "10.0.0.1/32");
        assert_eq!(v6.to_cidr(), "fd00::1/128");
    }

    #[test]
    fn containment_uses_truncated_network() {
        // Interface-style address with host bits still behaves as its network.
        let iface = cidr("10.96.0.2/16");
        let host = cidr("10.96.0.3/32");
        assert!(iface.contains(&host));
        assert!(!host.contains(&iface));
    }

    #[test]
    fn overlap_is_containment_either_way() {
        let wide = cidr("10.96.0.0/16");
        let narrow = cidr("10.96.1.0/24");
        let other = cidr("10.97.0.0/16");
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&other));
    }

    #[test]
    fn different_families_never_overlap() {
        let v4 = cidr("0.0.0.0/0");
        let v6 = cidr("::/0");
        assert!(!v4.overlaps(&v6));
    }

    #[test]
    fn default_route_detection() {
        assert!(cidr("0.0.0.0/0").is_default_route());
        assert!(cidr("::/0").is_default_route());
        assert!(!cidr("10.0.0.0/8").is_default_route());
    }

    #[test]
    fn canonicalize_dedupes() {
        let out = canonicalize(&[cidr("10.0.0.1/32"), cidr("10.0.0.1/32")]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn canonicalize_drops_contained_entries() {
        let out = canonicalize(&[cidr("10.96.0.3/32"), cidr("10.96.0.0/16")]);
        assert_eq!(out, vec![cidr("10.96.0.0/16")]);
    }

    #[test]
    fn canonicalize_sort_order() {
        let out = canonicalize(&[
            cidr("10.0.0.0/8"),
            cidr("fd00::1/128"),
            cidr("10.1.0.0/16"),
            cidr("10.0.0.9/32"),
        ]);
        // v4 before v6; within a family longer prefixes first, then address.
        assert_eq!(
            out,
            vec![
                cidr("10.0.0.9/32"),
                cidr("10.1.0.0/16"),
                cidr("10.0.0.0/8"),
                cidr("fd00::1/128"),
            ]
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize(&[cidr("10.0.0.0/16"), cidr("10.0.1.0/24"), cidr("10.2.0.0/16")]);
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn endpoint_parses_ipv4() {
        let ep: Endpoint = "192.168.1.1:51820".parse().expect("valid endpoint");
        assert_eq!(ep.port(), 51820);
        assert_eq!(ep.to_string(), "192.168.1.1:51820");
    }

    #[test]
    fn endpoint_parses_bracketed_ipv6() {
        let ep: Endpoint = "[::1]:51820".parse().expect("valid endpoint");
        assert_eq!(ep.to_string(), "[::1]:51820");
    }

    #[test]
    fn endpoint_parses_hostname() {
        let ep: Endpoint = "vpn.example.com:443".parse().expect("valid endpoint");
        assert!(matches!(ep.host(), EndpointHost::Name(n) if n == "vpn.example.com"));
    }

    #[test]
    fn endpoint_rejects_bad_input() {
        assert!(":51820".parse::<Endpoint>().is_err());
        assert!("1.2.3.4".parse::<Endpoint>().is_err());
        assert!("1.2.3.4:0".parse::<Endpoint>().is_err());
        assert!("1.2.3.4:65536".parse::<Endpoint>().is_err());
        assert!("[::1]51820".parse::<Endpoint>().is_err());
        assert!("host name:51820".parse::<Endpoint>().is_err());
    }

    #[test]
    fn endpoint_serde_as_string() {
        let ep: Endpoint = "1.1.1.1:51820".parse().expect("valid endpoint");
        let json = serde_json::to_string(&ep).expect("serialize");
        assert_eq!(json, "\"1.1.1.1:51820\"");
        let back: Endpoint = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(ep, back);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn canonicalize_never_grows(v4s in prop::collection::vec((any::<u32>(), 8u8..=32), 0..12)) {
                let routes: Vec<AllowedIp> = v4s
                    .into_iter()
                    .map(|(bits, prefix)| {
                        let addr = std::net::Ipv4Addr::from(bits);
                        AllowedIp::from_cidr(&format!("{addr}/{prefix}")).expect("valid")
                    })
                    .collect();
                let out = canonicalize(&routes);
                prop_assert!(out.len() <= routes.len());
                // No remaining pair may be nested.
                for (i, a) in out.iter().enumerate() {
                    for b in out.iter().skip(i + 1) {
                        prop_assert!(!(a.contains(b) || b.contains(a)) || a.network() == b.network());
                    }
                }
            }

            #[test]
            fn endpoint_roundtrip(port in 1u16.., a: u8, b: u8, c: u8, d: u8) {
                let text = format!("{a}.{b}.{c}.{d}:{port}");
                let ep: Endpoint = text.parse().expect("valid");
                prop_assert_eq!(ep.to_string(), text);
            }
        }
    }
}
