//! CIDR networks and network sets.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Error constructing a [`Network`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum NetworkError {
    /// IPv4 prefix length above 32.
    #[error("invalid IPv4 network mask {prefix}")]
    InvalidV4Mask {
        /// The offending prefix length.
        prefix: u8,
    },

    /// IPv6 prefix length above 128.
    #[error("invalid IPv6 network mask {prefix}")]
    InvalidV6Mask {
        /// The offending prefix length.
        prefix: u8,
    },

    /// The textual form is not `address/prefix`.
    #[error("invalid network \"{value}\"")]
    Malformed {
        /// The offending input.
        value: String,
    },
}

/// IPv4 or IPv6 network in canonical CIDR form.
///
/// The stored address always has its host bits zeroed; two networks
/// compare equal when their canonical address and prefix match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    addr: IpAddr,
    prefix: u8,
}

fn mask_v4(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    Ipv4Addr::from(bits & mask)
}

fn mask_v6(addr: Ipv6Addr, prefix: u8) -> Ipv6Addr {
    let bits = u128::from(addr);
    let mask = if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    };
    Ipv6Addr::from(bits & mask)
}

impl Network {
    /// Builds a network from an address and prefix length.
    ///
    /// Host bits are zeroed, so non-canonical input is accepted and
    /// canonicalized via the mask.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] when the prefix exceeds the address
    /// family's width.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, NetworkError> {
        let addr = match addr {
            IpAddr::V4(a) => {
                if prefix > 32 {
                    return Err(NetworkError::InvalidV4Mask { prefix });
                }
                IpAddr::V4(mask_v4(a, prefix))
            }
            IpAddr::V6(a) => {
                if prefix > 128 {
                    return Err(NetworkError::InvalidV6Mask { prefix });
                }
                IpAddr::V6(mask_v6(a, prefix))
            }
        };

        Ok(Self { addr, prefix })
    }

    /// Parses `address/prefix` notation.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Malformed`] on syntax errors and mask
    /// errors as in [`new`](Self::new).
    pub fn parse(s: &str) -> Result<Self, NetworkError> {
        let malformed = || NetworkError::Malformed {
            value: s.to_string(),
        };

        let (addr, prefix) = s.split_once('/').ok_or_else(malformed)?;
        let addr: IpAddr = addr.parse().map_err(|_| malformed())?;
        let prefix: u8 = prefix.parse().map_err(|_| malformed())?;
        Self::new(addr, prefix)
    }

    /// The canonical network address.
    #[must_use]
    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether the network is IPv4.
    #[must_use]
    pub const fn is_ipv4(&self) -> bool {
        matches!(self.addr, IpAddr::V4(_))
    }

    /// Whether the address lies inside this network.
    ///
    /// An IPv4 network never contains an IPv6 address and vice versa.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.addr, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => mask_v4(a, self.prefix) == net,
            (IpAddr::V6(net), IpAddr::V6(a)) => mask_v6(a, self.prefix) == net,
            _ => false,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Set of networks with per-prefix-length membership tables.
///
/// Enumeration follows insertion order. Membership for an address masks it
/// once per distinct prefix length present in the set, so lookups stay
/// fast no matter how many networks share a prefix length.
#[derive(Debug, Clone, Default)]
pub struct NetworkSet {
    order: Vec<Network>,
    v4: Vec<(u8, std::collections::HashSet<Ipv4Addr>)>,
    v6: Vec<(u8, std::collections::HashSet<Ipv6Addr>)>,
}

impl NetworkSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a network; returns `true` if it was not present before.
    pub fn insert(&mut self, net: Network) -> bool {
        if self.order.contains(&net) {
            return false;
        }

        match net.addr() {
            IpAddr::V4(a) => Self::insert_into(&mut self.v4, net.prefix(), a),
            IpAddr::V6(a) => Self::insert_into(&mut self.v6, net.prefix(), a),
        }

        self.order.push(net);
        true
    }

    fn insert_into<A: std::hash::Hash + Eq>(
        tables: &mut Vec<(u8, std::collections::HashSet<A>)>,
        prefix: u8,
        addr: A,
    ) {
        match tables.binary_search_by_key(&prefix, |(p, _)| *p) {
            Ok(i) => {
                tables[i].1.insert(addr);
            }
            Err(i) => {
                let mut set = std::collections::HashSet::new();
                set.insert(addr);
                tables.insert(i, (prefix, set));
            }
        }
    }

    /// Whether any stored network contains the address.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(a) => self.v4.iter().any(|(p, set)| set.contains(&mask_v4(a, *p))),
            IpAddr::V6(a) => self.v6.iter().any(|(p, set)| set.contains(&mask_v6(a, *p))),
        }
    }

    /// Stored networks in insertion order.
    pub fn ordered(&self) -> impl Iterator<Item = &Network> {
        self.order.iter()
    }

    /// Number of stored networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<Network> for NetworkSet {
    fn from_iter<I: IntoIterator<Item = Network>>(iter: I) -> Self {
        let mut set = Self::new();
        for net in iter {
            set.insert(net);
        }
        set
    }
}

impl PartialEq for NetworkSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for NetworkSet {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_host_bits() {
        let net = Network::parse("192.0.2.17/24").unwrap();
        assert_eq!(net.to_string(), "192.0.2.0/24");

        let net = Network::parse("2001:db8::1/32").unwrap();
        assert_eq!(net.to_string(), "2001:db8::/32");
    }

    #[test]
    fn rejects_bad_masks() {
        assert!(matches!(
            Network::parse("192.0.2.0/33"),
            Err(NetworkError::InvalidV4Mask { prefix: 33 })
        ));
        assert!(matches!(
            Network::parse("2001:db8::/129"),
            Err(NetworkError::InvalidV6Mask { prefix: 129 })
        ));
        assert!(matches!(
            Network::parse("192.0.2.0"),
            Err(NetworkError::Malformed { .. })
        ));
    }

    #[test]
    fn zero_prefix_contains_everything_in_family() {
        let any4 = Network::parse("0.0.0.0/0").unwrap();
        assert!(any4.contains("203.0.113.9".parse().unwrap()));
        assert!(!any4.contains("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn containment() {
        let net = Network::parse("192.0.2.0/24").unwrap();
        assert!(net.contains("192.0.2.255".parse().unwrap()));
        assert!(!net.contains("192.0.3.1".parse().unwrap()));

        // A full-length prefix matches exactly one address.
        let host = Network::parse("192.0.2.7/32").unwrap();
        assert!(host.contains("192.0.2.7".parse().unwrap()));
        assert!(!host.contains("192.0.2.8".parse().unwrap()));
    }

    #[test]
    fn set_contains_across_prefix_lengths() {
        let mut set = NetworkSet::new();
        set.insert(Network::parse("192.0.2.0/24").unwrap());
        set.insert(Network::parse("10.0.0.0/8").unwrap());
        set.insert(Network::parse("2001:db8::/32").unwrap());

        assert!(set.contains("192.0.2.1".parse().unwrap()));
        assert!(set.contains("10.200.0.1".parse().unwrap()));
        assert!(set.contains("2001:db8:1::1".parse().unwrap()));
        assert!(!set.contains("203.0.113.1".parse().unwrap()));

        let ordered: Vec<String> = set.ordered().map(Network::to_string).collect();
        assert_eq!(ordered, ["192.0.2.0/24", "10.0.0.0/8", "2001:db8::/32"]);
    }
}
