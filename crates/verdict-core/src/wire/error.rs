//! Codec error kinds.

use thiserror::Error;

use crate::types::Type;

/// Error raised while marshaling or unmarshaling wire data.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum WireError {
    /// The caller's buffer is too small for the data being written.
    #[error("buffer overflow")]
    BufferOverflow,

    /// The input ended before the value being read was complete.
    #[error("buffer underflow")]
    BufferUnderflow,

    /// The input carries an unsupported protocol version.
    #[error("got request of version {actual} while expected {expected}")]
    RequestVersionMismatch {
        /// Version found in the input.
        actual: u16,
        /// Version this codec implements.
        expected: u16,
    },

    /// More attributes than the u16 count field can carry.
    #[error("too many attributes: {count}")]
    TooManyAttributes {
        /// Number of attributes requested.
        count: usize,
    },

    /// Attribute name longer than 255 bytes.
    #[error("attribute name {name:?} is too long")]
    TooLongAttributeName {
        /// The offending name.
        name: String,
    },

    /// String value longer than 65535 bytes.
    #[error("string value of {len} bytes is too long")]
    TooLongStringValue {
        /// Byte length of the offending string.
        len: usize,
    },

    /// Set of strings with more than 65535 elements.
    #[error("set of strings with {count} elements is too long")]
    TooLongSetOfStringsValue {
        /// Number of elements.
        count: usize,
    },

    /// Set of domains with more than 65535 elements.
    #[error("set of domains with {count} elements is too long")]
    TooLongSetOfDomainsValue {
        /// Number of elements.
        count: usize,
    },

    /// Set of networks with more than 65535 elements.
    #[error("set of networks with {count} elements is too long")]
    TooLongSetOfNetworksValue {
        /// Number of elements.
        count: usize,
    },

    /// List of strings with more than 65535 elements.
    #[error("list of strings with {count} elements is too long")]
    TooLongListOfStringsValue {
        /// Number of elements.
        count: usize,
    },

    /// Unknown attribute type tag in the input.
    #[error("unknown attribute type tag {tag}")]
    InvalidAttributeType {
        /// The unrecognized tag byte.
        tag: u8,
    },

    /// The value's type has no wire representation.
    #[error("marshalling for type {t} is not implemented")]
    AttributeMarshallingNotImplemented {
        /// The unsupported type.
        t: Type,
    },

    /// A network element inside a set carried an unexpected tag.
    #[error("invalid network value {value:?}")]
    InvalidNetworkValue {
        /// Description of the offending element.
        value: String,
    },

    /// IPv4 prefix length above 32 in the input.
    #[error("invalid IPv4 network mask {prefix}")]
    IPv4InvalidMask {
        /// The offending prefix.
        prefix: u8,
    },

    /// IPv6 prefix length above 128 in the input.
    #[error("invalid IPv6 network mask {prefix}")]
    IPv6InvalidMask {
        /// The offending prefix.
        prefix: u8,
    },

    /// A domain value in the input failed canonicalization.
    #[error("invalid domain name {name:?}")]
    InvalidDomainName {
        /// The offending name.
        name: String,
    },

    /// A string value in the input is not valid UTF-8.
    #[error("string value is not valid UTF-8")]
    InvalidStringEncoding,

    /// A response carried an unknown effect byte.
    #[error("unknown response effect {effect}")]
    InvalidEffect {
        /// The unrecognized effect byte.
        effect: u8,
    },
}
