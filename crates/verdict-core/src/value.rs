//! Tagged attribute values.

use std::fmt;
use std::net::IpAddr;

use crate::domain::{DomainName, DomainSet};
use crate::errors::EvaluationError;
use crate::network::{Network, NetworkSet};
use crate::sets::StringSet;
use crate::types::Type;

/// Value of an attribute, tagged with its [`Type`].
///
/// Each variant uses the most compact representation for its type;
/// collection variants keep insertion order and answer membership in
/// better than linear time.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Boolean flag.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// IEEE-754 double precision float.
    Float(f64),
    /// IPv4 or IPv6 address.
    Address(IpAddr),
    /// Network in canonical CIDR form.
    Network(Network),
    /// Canonicalized DNS name.
    Domain(DomainName),
    /// Set of strings.
    SetOfStrings(StringSet),
    /// Set of domains matching whole subtrees.
    SetOfDomains(DomainSet),
    /// Set of networks.
    SetOfNetworks(NetworkSet),
    /// List of strings preserving caller order.
    ListOfStrings(Vec<String>),
}

impl AttributeValue {
    /// The type tag of this value.
    #[must_use]
    pub const fn value_type(&self) -> Type {
        match self {
            Self::Boolean(_) => Type::Boolean,
            Self::String(_) => Type::String,
            Self::Integer(_) => Type::Integer,
            Self::Float(_) => Type::Float,
            Self::Address(_) => Type::Address,
            Self::Network(_) => Type::Network,
            Self::Domain(_) => Type::Domain,
            Self::SetOfStrings(_) => Type::SetOfStrings,
            Self::SetOfDomains(_) => Type::SetOfDomains,
            Self::SetOfNetworks(_) => Type::SetOfNetworks,
            Self::ListOfStrings(_) => Type::ListOfStrings,
        }
    }

    fn type_mismatch(&self, expected: Type) -> EvaluationError {
        EvaluationError::AttributeValueType {
            expected,
            actual: self.value_type(),
        }
    }

    /// The boolean payload.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch error for any other variant; the remaining
    /// accessors behave the same way for their types.
    pub fn boolean(&self) -> Result<bool, EvaluationError> {
        match self {
            Self::Boolean(v) => Ok(*v),
            _ => Err(self.type_mismatch(Type::Boolean)),
        }
    }

    /// The string payload.
    pub fn string(&self) -> Result<&str, EvaluationError> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::String)),
        }
    }

    /// The integer payload.
    pub fn integer(&self) -> Result<i64, EvaluationError> {
        match self {
            Self::Integer(v) => Ok(*v),
            _ => Err(self.type_mismatch(Type::Integer)),
        }
    }

    /// The float payload.
    pub fn float(&self) -> Result<f64, EvaluationError> {
        match self {
            Self::Float(v) => Ok(*v),
            _ => Err(self.type_mismatch(Type::Float)),
        }
    }

    /// The numeric payload promoted to float.
    ///
    /// Accepts both [`Type::Integer`] and [`Type::Float`]; arithmetic and
    /// comparison operations use this to mix the two.
    #[allow(clippy::cast_precision_loss)]
    pub fn number(&self) -> Result<f64, EvaluationError> {
        match self {
            Self::Integer(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            _ => Err(self.type_mismatch(Type::Float)),
        }
    }

    /// The address payload.
    pub fn address(&self) -> Result<IpAddr, EvaluationError> {
        match self {
            Self::Address(v) => Ok(*v),
            _ => Err(self.type_mismatch(Type::Address)),
        }
    }

    /// The network payload.
    pub fn network(&self) -> Result<&Network, EvaluationError> {
        match self {
            Self::Network(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::Network)),
        }
    }

    /// The domain payload.
    pub fn domain(&self) -> Result<&DomainName, EvaluationError> {
        match self {
            Self::Domain(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::Domain)),
        }
    }

    /// The set-of-strings payload.
    pub fn set_of_strings(&self) -> Result<&StringSet, EvaluationError> {
        match self {
            Self::SetOfStrings(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::SetOfStrings)),
        }
    }

    /// The set-of-domains payload.
    pub fn set_of_domains(&self) -> Result<&DomainSet, EvaluationError> {
        match self {
            Self::SetOfDomains(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::SetOfDomains)),
        }
    }

    /// The set-of-networks payload.
    pub fn set_of_networks(&self) -> Result<&NetworkSet, EvaluationError> {
        match self {
            Self::SetOfNetworks(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::SetOfNetworks)),
        }
    }

    /// The list-of-strings payload.
    pub fn list_of_strings(&self) -> Result<&[String], EvaluationError> {
        match self {
            Self::ListOfStrings(v) => Ok(v),
            _ => Err(self.type_mismatch(Type::ListOfStrings)),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Address(v) => write!(f, "{v}"),
            Self::Network(v) => write!(f, "{v}"),
            Self::Domain(v) => write!(f, "{:?}", v.as_str()),
            Self::SetOfStrings(v) => {
                let items: Vec<String> = v.ordered().map(|s| format!("{s:?}")).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::SetOfDomains(v) => {
                let items: Vec<String> = v.ordered().map(|d| format!("{:?}", d.as_str())).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::SetOfNetworks(v) => {
                let items: Vec<String> = v.ordered().map(Network::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::ListOfStrings(v) => {
                let items: Vec<String> = v.iter().map(|s| format!("{s:?}")).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<IpAddr> for AttributeValue {
    fn from(v: IpAddr) -> Self {
        Self::Address(v)
    }
}

impl From<Network> for AttributeValue {
    fn from(v: Network) -> Self {
        Self::Network(v)
    }
}

impl From<DomainName> for AttributeValue {
    fn from(v: DomainName) -> Self {
        Self::Domain(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_enforce_types() {
        let v = AttributeValue::String("test".to_string());
        assert_eq!(v.value_type(), Type::String);
        assert_eq!(v.string().unwrap(), "test");

        let err = v.boolean().unwrap_err();
        assert_eq!(err.to_string(), "expected Boolean value but got String");
    }

    #[test]
    fn number_promotes_integers() {
        assert_eq!(AttributeValue::Integer(5).number().unwrap(), 5.0);
        assert_eq!(AttributeValue::Float(0.5).number().unwrap(), 0.5);
        assert!(AttributeValue::Boolean(true).number().is_err());
    }

    #[test]
    fn display_renders_collections() {
        let set: StringSet = ["b", "a"].into_iter().collect();
        let v = AttributeValue::SetOfStrings(set);
        assert_eq!(v.to_string(), "[\"b\", \"a\"]");
    }
}
