//! Request and attribute (de)serialization.

use std::net::IpAddr;

use crate::attr::AttributeAssignment;
use crate::domain::{DomainName, DomainSet};
use crate::network::{Network, NetworkError, NetworkSet};
use crate::sets::StringSet;
use crate::value::AttributeValue;

use super::error::WireError;
use super::{
    WIRE_TYPE_BOOLEAN_FALSE, WIRE_TYPE_BOOLEAN_TRUE, WIRE_TYPE_DOMAIN, WIRE_TYPE_FLOAT,
    WIRE_TYPE_INTEGER, WIRE_TYPE_IPV4_ADDRESS, WIRE_TYPE_IPV4_NETWORK, WIRE_TYPE_IPV6_ADDRESS,
    WIRE_TYPE_IPV6_NETWORK, WIRE_TYPE_LIST_OF_STRINGS, WIRE_TYPE_SET_OF_DOMAINS,
    WIRE_TYPE_SET_OF_NETWORKS, WIRE_TYPE_SET_OF_STRINGS, WIRE_TYPE_STRING, WIRE_VERSION,
};

/// Maximum number of attributes in one request or response.
pub const MAX_ATTRIBUTES: usize = u16::MAX as usize;

/// Maximum byte length of an attribute name.
pub const MAX_ATTRIBUTE_NAME_LEN: usize = u8::MAX as usize;

/// Maximum byte length of a string, domain or collection element.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Maximum element count of a set or list value.
pub const MAX_COLLECTION_LEN: usize = u16::MAX as usize;

fn need_write(b: &[u8], n: usize) -> Result<(), WireError> {
    if b.len() < n {
        return Err(WireError::BufferOverflow);
    }
    Ok(())
}

fn need_read(b: &[u8], n: usize) -> Result<(), WireError> {
    if b.len() < n {
        return Err(WireError::BufferUnderflow);
    }
    Ok(())
}

pub(super) fn put_version(b: &mut [u8]) -> Result<usize, WireError> {
    need_write(b, 2)?;
    b[..2].copy_from_slice(&WIRE_VERSION.to_le_bytes());
    Ok(2)
}

pub(super) fn check_version(b: &[u8]) -> Result<usize, WireError> {
    need_read(b, 2)?;
    let version = u16::from_le_bytes([b[0], b[1]]);
    if version != WIRE_VERSION {
        return Err(WireError::RequestVersionMismatch {
            actual: version,
            expected: WIRE_VERSION,
        });
    }
    Ok(2)
}

pub(super) fn put_u16(b: &mut [u8], v: u16) -> Result<usize, WireError> {
    need_write(b, 2)?;
    b[..2].copy_from_slice(&v.to_le_bytes());
    Ok(2)
}

pub(super) fn get_u16(b: &[u8]) -> Result<(u16, usize), WireError> {
    need_read(b, 2)?;
    Ok((u16::from_le_bytes([b[0], b[1]]), 2))
}

fn put_name(b: &mut [u8], name: &str) -> Result<usize, WireError> {
    if name.len() > MAX_ATTRIBUTE_NAME_LEN {
        return Err(WireError::TooLongAttributeName {
            name: name.to_string(),
        });
    }

    let n = name.len() + 1;
    need_write(b, n)?;
    #[allow(clippy::cast_possible_truncation)] // checked against MAX_ATTRIBUTE_NAME_LEN
    {
        b[0] = name.len() as u8;
    }
    b[1..n].copy_from_slice(name.as_bytes());
    Ok(n)
}

fn get_name(b: &[u8]) -> Result<(String, usize), WireError> {
    need_read(b, 1)?;
    let n = b[0] as usize + 1;
    need_read(b, n)?;
    let name = std::str::from_utf8(&b[1..n]).map_err(|_| WireError::InvalidStringEncoding)?;
    Ok((name.to_string(), n))
}

fn put_tag(b: &mut [u8], tag: u8) -> Result<usize, WireError> {
    need_write(b, 1)?;
    b[0] = tag;
    Ok(1)
}

fn put_string(b: &mut [u8], s: &str) -> Result<usize, WireError> {
    if s.len() > MAX_STRING_LEN {
        return Err(WireError::TooLongStringValue { len: s.len() });
    }

    let n = s.len() + 2;
    need_write(b, n)?;
    #[allow(clippy::cast_possible_truncation)] // checked against MAX_STRING_LEN
    let len = s.len() as u16;
    b[..2].copy_from_slice(&len.to_le_bytes());
    b[2..n].copy_from_slice(s.as_bytes());
    Ok(n)
}

fn get_string(b: &[u8]) -> Result<(String, usize), WireError> {
    let (len, off) = get_u16(b)?;
    let n = off + len as usize;
    need_read(b, n)?;
    let s = std::str::from_utf8(&b[off..n]).map_err(|_| WireError::InvalidStringEncoding)?;
    Ok((s.to_string(), n))
}

fn network_element_size(net: &Network) -> usize {
    if net.is_ipv4() {
        6
    } else {
        18
    }
}

fn put_network(b: &mut [u8], net: &Network) -> Result<usize, WireError> {
    let mut off = match net.addr() {
        IpAddr::V4(_) => put_tag(b, WIRE_TYPE_IPV4_NETWORK)?,
        IpAddr::V6(_) => put_tag(b, WIRE_TYPE_IPV6_NETWORK)?,
    };

    need_write(&b[off..], 1)?;
    b[off] = net.prefix();
    off += 1;

    match net.addr() {
        IpAddr::V4(a) => {
            need_write(&b[off..], 4)?;
            b[off..off + 4].copy_from_slice(&a.octets());
            Ok(off + 4)
        }
        IpAddr::V6(a) => {
            need_write(&b[off..], 16)?;
            b[off..off + 16].copy_from_slice(&a.octets());
            Ok(off + 16)
        }
    }
}

fn get_ipv4_network(b: &[u8]) -> Result<(Network, usize), WireError> {
    need_read(b, 5)?;
    let prefix = b[0];
    let addr = IpAddr::from([b[1], b[2], b[3], b[4]]);
    let net = Network::new(addr, prefix).map_err(|err| match err {
        NetworkError::InvalidV4Mask { prefix } => WireError::IPv4InvalidMask { prefix },
        other => WireError::InvalidNetworkValue {
            value: other.to_string(),
        },
    })?;
    Ok((net, 5))
}

fn get_ipv6_network(b: &[u8]) -> Result<(Network, usize), WireError> {
    need_read(b, 17)?;
    let prefix = b[0];
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&b[1..17]);
    let net = Network::new(IpAddr::from(octets), prefix).map_err(|err| match err {
        NetworkError::InvalidV6Mask { prefix } => WireError::IPv6InvalidMask { prefix },
        other => WireError::InvalidNetworkValue {
            value: other.to_string(),
        },
    })?;
    Ok((net, 17))
}

fn value_size(v: &AttributeValue) -> Result<usize, WireError> {
    let n = match v {
        AttributeValue::Boolean(_) => 1,
        AttributeValue::String(s) => {
            if s.len() > MAX_STRING_LEN {
                return Err(WireError::TooLongStringValue { len: s.len() });
            }
            1 + 2 + s.len()
        }
        AttributeValue::Integer(_) | AttributeValue::Float(_) => 1 + 8,
        AttributeValue::Address(IpAddr::V4(_)) => 1 + 4,
        AttributeValue::Address(IpAddr::V6(_)) => 1 + 16,
        AttributeValue::Network(net) => network_element_size(net),
        AttributeValue::Domain(d) => {
            if d.as_str().len() > MAX_STRING_LEN {
                return Err(WireError::TooLongStringValue {
                    len: d.as_str().len(),
                });
            }
            1 + 2 + d.as_str().len()
        }
        AttributeValue::SetOfStrings(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfStringsValue { count: set.len() });
            }
            let mut total = 1 + 2;
            for s in set.ordered() {
                if s.len() > MAX_STRING_LEN {
                    return Err(WireError::TooLongStringValue { len: s.len() });
                }
                total += 2 + s.len();
            }
            total
        }
        AttributeValue::SetOfDomains(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfDomainsValue { count: set.len() });
            }
            let mut total = 1 + 2;
            for d in set.ordered() {
                total += 2 + d.as_str().len();
            }
            total
        }
        AttributeValue::SetOfNetworks(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfNetworksValue { count: set.len() });
            }
            let mut total = 1 + 2;
            for net in set.ordered() {
                total += network_element_size(net);
            }
            total
        }
        AttributeValue::ListOfStrings(list) => {
            if list.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongListOfStringsValue { count: list.len() });
            }
            let mut total = 1 + 2;
            for s in list {
                if s.len() > MAX_STRING_LEN {
                    return Err(WireError::TooLongStringValue { len: s.len() });
                }
                total += 2 + s.len();
            }
            total
        }
    };

    Ok(n)
}

#[allow(clippy::cast_possible_truncation)] // collection sizes checked above each cast
fn put_value(b: &mut [u8], v: &AttributeValue) -> Result<usize, WireError> {
    match v {
        AttributeValue::Boolean(flag) => {
            let tag = if *flag {
                WIRE_TYPE_BOOLEAN_TRUE
            } else {
                WIRE_TYPE_BOOLEAN_FALSE
            };
            put_tag(b, tag)
        }
        AttributeValue::String(s) => {
            let off = put_tag(b, WIRE_TYPE_STRING)?;
            Ok(off + put_string(&mut b[off..], s)?)
        }
        AttributeValue::Integer(v) => {
            let off = put_tag(b, WIRE_TYPE_INTEGER)?;
            need_write(&b[off..], 8)?;
            b[off..off + 8].copy_from_slice(&v.to_le_bytes());
            Ok(off + 8)
        }
        AttributeValue::Float(v) => {
            let off = put_tag(b, WIRE_TYPE_FLOAT)?;
            need_write(&b[off..], 8)?;
            b[off..off + 8].copy_from_slice(&v.to_bits().to_le_bytes());
            Ok(off + 8)
        }
        AttributeValue::Address(IpAddr::V4(a)) => {
            let off = put_tag(b, WIRE_TYPE_IPV4_ADDRESS)?;
            need_write(&b[off..], 4)?;
            b[off..off + 4].copy_from_slice(&a.octets());
            Ok(off + 4)
        }
        AttributeValue::Address(IpAddr::V6(a)) => {
            let off = put_tag(b, WIRE_TYPE_IPV6_ADDRESS)?;
            need_write(&b[off..], 16)?;
            b[off..off + 16].copy_from_slice(&a.octets());
            Ok(off + 16)
        }
        AttributeValue::Network(net) => put_network(b, net),
        AttributeValue::Domain(d) => {
            let off = put_tag(b, WIRE_TYPE_DOMAIN)?;
            Ok(off + put_string(&mut b[off..], d.as_str())?)
        }
        AttributeValue::SetOfStrings(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfStringsValue { count: set.len() });
            }

            let mut off = put_tag(b, WIRE_TYPE_SET_OF_STRINGS)?;
            off += put_u16(&mut b[off..], set.len() as u16)?;
            for s in set.sorted() {
                off += put_string(&mut b[off..], s)?;
            }
            Ok(off)
        }
        AttributeValue::SetOfDomains(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfDomainsValue { count: set.len() });
            }

            let mut off = put_tag(b, WIRE_TYPE_SET_OF_DOMAINS)?;
            off += put_u16(&mut b[off..], set.len() as u16)?;
            for d in set.sorted() {
                off += put_string(&mut b[off..], d.as_str())?;
            }
            Ok(off)
        }
        AttributeValue::SetOfNetworks(set) => {
            if set.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongSetOfNetworksValue { count: set.len() });
            }

            let mut off = put_tag(b, WIRE_TYPE_SET_OF_NETWORKS)?;
            off += put_u16(&mut b[off..], set.len() as u16)?;
            for net in set.ordered() {
                off += put_network(&mut b[off..], net)?;
            }
            Ok(off)
        }
        AttributeValue::ListOfStrings(list) => {
            if list.len() > MAX_COLLECTION_LEN {
                return Err(WireError::TooLongListOfStringsValue { count: list.len() });
            }

            let mut off = put_tag(b, WIRE_TYPE_LIST_OF_STRINGS)?;
            off += put_u16(&mut b[off..], list.len() as u16)?;
            for s in list {
                off += put_string(&mut b[off..], s)?;
            }
            Ok(off)
        }
    }
}

fn get_value(b: &[u8]) -> Result<(AttributeValue, usize), WireError> {
    need_read(b, 1)?;
    let tag = b[0];
    let b = &b[1..];

    let (v, n) = match tag {
        WIRE_TYPE_BOOLEAN_FALSE => (AttributeValue::Boolean(false), 0),
        WIRE_TYPE_BOOLEAN_TRUE => (AttributeValue::Boolean(true), 0),
        WIRE_TYPE_STRING => {
            let (s, n) = get_string(b)?;
            (AttributeValue::String(s), n)
        }
        WIRE_TYPE_INTEGER => {
            need_read(b, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            (AttributeValue::Integer(i64::from_le_bytes(raw)), 8)
        }
        WIRE_TYPE_FLOAT => {
            need_read(b, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            (AttributeValue::Float(f64::from_bits(u64::from_le_bytes(raw))), 8)
        }
        WIRE_TYPE_IPV4_ADDRESS => {
            need_read(b, 4)?;
            (AttributeValue::Address(IpAddr::from([b[0], b[1], b[2], b[3]])), 4)
        }
        WIRE_TYPE_IPV6_ADDRESS => {
            need_read(b, 16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&b[..16]);
            (AttributeValue::Address(IpAddr::from(octets)), 16)
        }
        WIRE_TYPE_IPV4_NETWORK => {
            let (net, n) = get_ipv4_network(b)?;
            (AttributeValue::Network(net), n)
        }
        WIRE_TYPE_IPV6_NETWORK => {
            let (net, n) = get_ipv6_network(b)?;
            (AttributeValue::Network(net), n)
        }
        WIRE_TYPE_DOMAIN => {
            let (s, n) = get_string(b)?;
            let d = DomainName::new(&s).map_err(|_| WireError::InvalidDomainName { name: s })?;
            (AttributeValue::Domain(d), n)
        }
        WIRE_TYPE_SET_OF_STRINGS => {
            let (count, mut off) = get_u16(b)?;
            let mut set = StringSet::new();
            for _ in 0..count {
                let (s, n) = get_string(&b[off..])?;
                off += n;
                set.insert(s);
            }
            (AttributeValue::SetOfStrings(set), off)
        }
        WIRE_TYPE_SET_OF_DOMAINS => {
            let (count, mut off) = get_u16(b)?;
            let mut set = DomainSet::new();
            for _ in 0..count {
                let (s, n) = get_string(&b[off..])?;
                off += n;
                let d =
                    DomainName::new(&s).map_err(|_| WireError::InvalidDomainName { name: s })?;
                set.insert(d);
            }
            (AttributeValue::SetOfDomains(set), off)
        }
        WIRE_TYPE_SET_OF_NETWORKS => {
            let (count, mut off) = get_u16(b)?;
            let mut set = NetworkSet::new();
            for _ in 0..count {
                need_read(&b[off..], 1)?;
                let element_tag = b[off];
                off += 1;

                let (net, n) = match element_tag {
                    WIRE_TYPE_IPV4_NETWORK => get_ipv4_network(&b[off..])?,
                    WIRE_TYPE_IPV6_NETWORK => get_ipv6_network(&b[off..])?,
                    other => {
                        return Err(WireError::InvalidNetworkValue {
                            value: format!("element tag {other}"),
                        });
                    }
                };
                off += n;
                set.insert(net);
            }
            (AttributeValue::SetOfNetworks(set), off)
        }
        WIRE_TYPE_LIST_OF_STRINGS => {
            let (count, mut off) = get_u16(b)?;
            let mut list = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (s, n) = get_string(&b[off..])?;
                off += n;
                list.push(s);
            }
            (AttributeValue::ListOfStrings(list), off)
        }
        tag => return Err(WireError::InvalidAttributeType { tag }),
    };

    Ok((v, n + 1))
}

pub(super) fn assignment_size(a: &AttributeAssignment) -> Result<usize, WireError> {
    if a.id.len() > MAX_ATTRIBUTE_NAME_LEN {
        return Err(WireError::TooLongAttributeName { name: a.id.clone() });
    }

    Ok(1 + a.id.len() + value_size(&a.value)?)
}

pub(super) fn put_assignments(
    b: &mut [u8],
    attrs: &[AttributeAssignment],
) -> Result<usize, WireError> {
    if attrs.len() > MAX_ATTRIBUTES {
        return Err(WireError::TooManyAttributes { count: attrs.len() });
    }

    #[allow(clippy::cast_possible_truncation)] // checked against MAX_ATTRIBUTES
    let mut off = put_u16(b, attrs.len() as u16)?;
    for a in attrs {
        off += put_name(&mut b[off..], &a.id)?;
        off += put_value(&mut b[off..], &a.value)?;
    }

    Ok(off)
}

pub(super) fn get_assignments(b: &[u8]) -> Result<(Vec<AttributeAssignment>, usize), WireError> {
    let (count, mut off) = get_u16(b)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (id, n) = get_name(&b[off..])?;
        off += n;
        let (value, n) = get_value(&b[off..])?;
        off += n;
        out.push(AttributeAssignment { id, value });
    }

    Ok((out, off))
}

/// Marshals a request into the caller's buffer, returning bytes written.
///
/// # Errors
///
/// Returns [`WireError::BufferOverflow`] when the buffer is too small and
/// the limit errors of the attribute table for oversized names, strings
/// and collections.
pub fn marshal_request_to(
    b: &mut [u8],
    attrs: &[AttributeAssignment],
) -> Result<usize, WireError> {
    let off = put_version(b)?;
    Ok(off + put_assignments(&mut b[off..], attrs)?)
}

/// Marshals a request into a freshly sized buffer.
///
/// # Errors
///
/// Propagates the limit errors of [`marshal_request_to`].
pub fn marshal_request(attrs: &[AttributeAssignment]) -> Result<Vec<u8>, WireError> {
    if attrs.len() > MAX_ATTRIBUTES {
        return Err(WireError::TooManyAttributes { count: attrs.len() });
    }

    let mut size = 2 + 2;
    for a in attrs {
        size += assignment_size(a)?;
    }

    let mut b = vec![0u8; size];
    let n = marshal_request_to(&mut b, attrs)?;
    b.truncate(n);
    Ok(b)
}

/// Parses a request into its attribute assignments.
///
/// # Errors
///
/// Returns [`WireError::RequestVersionMismatch`] for foreign versions,
/// [`WireError::BufferUnderflow`] on truncation and value errors for
/// malformed payloads.
pub fn unmarshal_request(b: &[u8]) -> Result<Vec<AttributeAssignment>, WireError> {
    let off = check_version(b)?;
    let (attrs, _) = get_assignments(&b[off..])?;
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, value: AttributeValue) -> AttributeAssignment {
        AttributeAssignment {
            id: id.to_string(),
            value,
        }
    }

    fn round_trip(attrs: Vec<AttributeAssignment>) -> Vec<AttributeAssignment> {
        let b = marshal_request(&attrs).unwrap();
        unmarshal_request(&b).unwrap()
    }

    #[test]
    fn round_trips_every_wire_type() {
        let mut strings = StringSet::new();
        strings.insert("beta");
        strings.insert("alpha");

        let mut domains = DomainSet::new();
        domains.insert(DomainName::new("example.com").unwrap());

        let mut networks = NetworkSet::new();
        networks.insert(Network::parse("192.0.2.0/24").unwrap());
        networks.insert(Network::parse("2001:db8::/32").unwrap());

        let attrs = vec![
            assignment("t", AttributeValue::Boolean(true)),
            assignment("f", AttributeValue::Boolean(false)),
            assignment("s", AttributeValue::String("hello".to_string())),
            assignment("i", AttributeValue::Integer(-42)),
            assignment("fl", AttributeValue::Float(2.5)),
            assignment("a4", AttributeValue::Address("192.0.2.1".parse().unwrap())),
            assignment("a6", AttributeValue::Address("2001:db8::1".parse().unwrap())),
            assignment(
                "n4",
                AttributeValue::Network(Network::parse("198.51.100.0/24").unwrap()),
            ),
            assignment(
                "n6",
                AttributeValue::Network(Network::parse("2001:db8::/48").unwrap()),
            ),
            assignment(
                "d",
                AttributeValue::Domain(DomainName::new("www.example.com").unwrap()),
            ),
            assignment("ss", AttributeValue::SetOfStrings(strings)),
            assignment("sd", AttributeValue::SetOfDomains(domains)),
            assignment("sn", AttributeValue::SetOfNetworks(networks)),
            assignment(
                "ls",
                AttributeValue::ListOfStrings(vec!["z".to_string(), "a".to_string()]),
            ),
        ];

        let parsed = round_trip(attrs);
        assert_eq!(parsed.len(), 14);
        assert_eq!(parsed[3].value, AttributeValue::Integer(-42));
        assert_eq!(parsed[4].value, AttributeValue::Float(2.5));
        assert_eq!(
            parsed[8].value,
            AttributeValue::Network(Network::parse("2001:db8::/48").unwrap())
        );
        assert_eq!(
            parsed[13].value,
            AttributeValue::ListOfStrings(vec!["z".to_string(), "a".to_string()])
        );

        // Set elements travel in sorted order.
        let ss = parsed[10].value.set_of_strings().unwrap();
        let order: Vec<&str> = ss.ordered().collect();
        assert_eq!(order, ["alpha", "beta"]);

        let sn = parsed[12].value.set_of_networks().unwrap();
        assert!(sn.contains("192.0.2.9".parse().unwrap()));
        assert!(sn.contains("2001:db8::9".parse().unwrap()));
    }

    #[test]
    fn empty_request_round_trips() {
        let parsed = round_trip(Vec::new());
        assert!(parsed.is_empty());
    }

    #[test]
    fn version_is_checked() {
        let mut b = marshal_request(&[]).unwrap();
        b[0] = 2;
        let err = unmarshal_request(&b).unwrap_err();
        assert_eq!(
            err.to_string(),
            "got request of version 2 while expected 1"
        );
    }

    #[test]
    fn non_canonical_network_is_masked_on_read() {
        // tag 7, prefix 24, host bits set.
        let raw = [
            1u8, 0, // version
            1, 0, // one attribute
            1, b'n', // name
            WIRE_TYPE_IPV4_NETWORK,
            24, 192, 0, 2, 17,
        ];

        let parsed = unmarshal_request(&raw).unwrap();
        assert_eq!(
            parsed[0].value,
            AttributeValue::Network(Network::parse("192.0.2.0/24").unwrap())
        );
    }

    #[test]
    fn invalid_masks_are_rejected() {
        let raw = [
            1u8, 0, 1, 0, 1, b'n', WIRE_TYPE_IPV4_NETWORK, 33, 192, 0, 2, 0,
        ];
        let err = unmarshal_request(&raw).unwrap_err();
        assert_eq!(err.to_string(), "invalid IPv4 network mask 33");
    }

    #[test]
    fn string_length_boundaries() {
        let max = "x".repeat(MAX_STRING_LEN);
        let attrs = vec![assignment("s", AttributeValue::String(max.clone()))];
        let parsed = round_trip(attrs);
        assert_eq!(parsed[0].value.string().unwrap().len(), MAX_STRING_LEN);

        let over = "x".repeat(MAX_STRING_LEN + 1);
        let err = marshal_request(&[assignment("s", AttributeValue::String(over))]).unwrap_err();
        assert!(matches!(err, WireError::TooLongStringValue { .. }));

        let parsed = round_trip(vec![assignment("s", AttributeValue::String(String::new()))]);
        assert_eq!(parsed[0].value.string().unwrap(), "");
    }

    #[test]
    fn attribute_count_boundary() {
        let attrs: Vec<AttributeAssignment> = (0..=MAX_ATTRIBUTES)
            .map(|_| assignment("b", AttributeValue::Boolean(true)))
            .collect();
        let err = marshal_request(&attrs).unwrap_err();
        assert!(matches!(
            err,
            WireError::TooManyAttributes {
                count
            } if count == MAX_ATTRIBUTES + 1
        ));

        let attrs = &attrs[..MAX_ATTRIBUTES];
        let b = marshal_request(attrs).unwrap();
        assert_eq!(unmarshal_request(&b).unwrap().len(), MAX_ATTRIBUTES);
    }

    #[test]
    fn name_length_is_limited() {
        let long = "n".repeat(MAX_ATTRIBUTE_NAME_LEN + 1);
        let err =
            marshal_request(&[assignment(&long, AttributeValue::Boolean(true))]).unwrap_err();
        assert!(matches!(err, WireError::TooLongAttributeName { .. }));
    }

    #[test]
    fn small_buffer_overflows() {
        let attrs = vec![assignment("s", AttributeValue::String("hello".to_string()))];
        let mut b = [0u8; 6];
        let err = marshal_request_to(&mut b, &attrs).unwrap_err();
        assert!(matches!(err, WireError::BufferOverflow));
    }

    #[test]
    fn truncated_input_underflows() {
        let attrs = vec![assignment("i", AttributeValue::Integer(7))];
        let b = marshal_request(&attrs).unwrap();
        let err = unmarshal_request(&b[..b.len() - 1]).unwrap_err();
        assert!(matches!(err, WireError::BufferUnderflow));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = [1u8, 0, 1, 0, 1, b'x', 200];
        let err = unmarshal_request(&raw).unwrap_err();
        assert!(matches!(err, WireError::InvalidAttributeType { tag: 200 }));
    }
}
