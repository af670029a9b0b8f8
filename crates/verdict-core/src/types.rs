//! Value types of the evaluation engine.
//!
//! Every attribute, expression and content leaf carries one of the types
//! defined here. Types are totally ordered so that error messages and
//! dispatch tables enumerate them deterministically.

use std::fmt;

/// Type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    /// Boolean flag.
    Boolean,
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// IEEE-754 double precision float.
    Float,
    /// IPv4 or IPv6 address.
    Address,
    /// IPv4 or IPv6 network in CIDR form.
    Network,
    /// Canonicalized DNS name.
    Domain,
    /// Set of strings with insertion-ordered enumeration.
    SetOfStrings,
    /// Set of domains matching whole subtrees.
    SetOfDomains,
    /// Set of networks matching contained addresses.
    SetOfNetworks,
    /// List of strings preserving caller order.
    ListOfStrings,
}

impl Type {
    /// Human readable type name used in error messages and statuses.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Address => "Address",
            Self::Network => "Network",
            Self::Domain => "Domain",
            Self::SetOfStrings => "Set of Strings",
            Self::SetOfDomains => "Set of Domains",
            Self::SetOfNetworks => "Set of Networks",
            Self::ListOfStrings => "List of Strings",
        }
    }

    /// Lookup by the lower-case identifier used by policy front-ends.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "address" => Some(Self::Address),
            "network" => Some(Self::Network),
            "domain" => Some(Self::Domain),
            "set of strings" => Some(Self::SetOfStrings),
            "set of domains" => Some(Self::SetOfDomains),
            "set of networks" => Some(Self::SetOfNetworks),
            "list of strings" => Some(Self::ListOfStrings),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
