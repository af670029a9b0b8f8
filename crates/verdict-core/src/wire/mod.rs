//! Binary request/response codec.
//!
//! All integers are little-endian. A request is a version word, an
//! attribute count and a run of attributes; a response is a version word,
//! an effect byte, a length-prefixed status and a run of obligation
//! attributes. Attribute payloads are tagged with a wire type byte:
//!
//! | tag | payload |
//! |-----|---------|
//! | 0/1 | boolean false / true, no payload |
//! | 2   | string: u16 length + UTF-8 bytes |
//! | 3   | integer: i64 |
//! | 4   | float: IEEE-754 bits |
//! | 5/6 | IPv4 / IPv6 address: 4 / 16 bytes |
//! | 7/8 | IPv4 / IPv6 network: prefix byte + 4 / 16 bytes |
//! | 9   | domain: u16 length + canonical form |
//! | 10  | set of strings: u16 count + elements |
//! | 11  | set of domains: u16 count + elements |
//! | 12  | set of networks: u16 count + tagged elements |
//! | 13  | list of strings: u16 count + elements |
//!
//! Marshalers fill caller-provided buffers and report
//! [`WireError::BufferOverflow`] when they run out; readers report
//! [`WireError::BufferUnderflow`] on truncation. Responses fall back to
//! fixed statuses when obligations or the status itself cannot fit.

mod error;
mod request;
mod response;

pub use error::WireError;
pub use request::{
    marshal_request, marshal_request_to, unmarshal_request, MAX_ATTRIBUTE_NAME_LEN,
    MAX_ATTRIBUTES, MAX_COLLECTION_LEN, MAX_STRING_LEN,
};
pub use response::{
    marshal_indeterminate_response, marshal_response, marshal_response_to, response_size,
    unmarshal_response, Decision, MIN_RESPONSE_SIZE,
};

/// Version carried by every request and response.
pub const WIRE_VERSION: u16 = 1;

pub(crate) const WIRE_TYPE_BOOLEAN_FALSE: u8 = 0;
pub(crate) const WIRE_TYPE_BOOLEAN_TRUE: u8 = 1;
pub(crate) const WIRE_TYPE_STRING: u8 = 2;
pub(crate) const WIRE_TYPE_INTEGER: u8 = 3;
pub(crate) const WIRE_TYPE_FLOAT: u8 = 4;
pub(crate) const WIRE_TYPE_IPV4_ADDRESS: u8 = 5;
pub(crate) const WIRE_TYPE_IPV6_ADDRESS: u8 = 6;
pub(crate) const WIRE_TYPE_IPV4_NETWORK: u8 = 7;
pub(crate) const WIRE_TYPE_IPV6_NETWORK: u8 = 8;
pub(crate) const WIRE_TYPE_DOMAIN: u8 = 9;
pub(crate) const WIRE_TYPE_SET_OF_STRINGS: u8 = 10;
pub(crate) const WIRE_TYPE_SET_OF_DOMAINS: u8 = 11;
pub(crate) const WIRE_TYPE_SET_OF_NETWORKS: u8 = 12;
pub(crate) const WIRE_TYPE_LIST_OF_STRINGS: u8 = 13;
