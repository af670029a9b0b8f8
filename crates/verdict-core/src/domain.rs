//! Canonical DNS names, domain sets and domain-keyed maps.
//!
//! A [`DomainName`] is stored in canonical form: ASCII lower case with no
//! trailing dot. [`DomainSet`] and [`DomainMap`] index names by labels from
//! the rightmost one so that lookups match whole subtrees, the way DNS
//! policy rules are written ("block example.com and everything under it").

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Error constructing a [`DomainName`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DomainError {
    /// The name or one of its labels exceeds DNS length limits.
    #[error("domain name \"{name}\" is too long")]
    TooLong {
        /// The offending name.
        name: String,
    },

    /// The name contains an empty label or a non-printable byte.
    #[error("invalid label in domain name \"{name}\"")]
    InvalidLabel {
        /// The offending name.
        name: String,
    },
}

/// DNS name in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainName {
    name: String,
}

impl DomainName {
    /// Canonicalizes and validates a dotted name.
    ///
    /// Lower-cases ASCII letters and strips a single trailing dot. The root
    /// name is represented by the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when the name or a label is too long, a
    /// label is empty, or the name contains control bytes.
    pub fn new(s: &str) -> Result<Self, DomainError> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self {
                name: String::new(),
            });
        }

        if trimmed.len() > MAX_NAME_LEN {
            return Err(DomainError::TooLong {
                name: s.to_string(),
            });
        }

        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(if label.is_empty() {
                    DomainError::InvalidLabel {
                        name: s.to_string(),
                    }
                } else {
                    DomainError::TooLong {
                        name: s.to_string(),
                    }
                });
            }

            if label.bytes().any(|b| b.is_ascii_control() || b == b' ') {
                return Err(DomainError::InvalidLabel {
                    name: s.to_string(),
                });
            }
        }

        Ok(Self {
            name: trimmed.to_ascii_lowercase(),
        })
    }

    /// The canonical dotted form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Labels from the rightmost (top-level) one.
    pub(crate) fn labels_rev(&self) -> impl Iterator<Item = &str> {
        self.name.rsplit('.').filter(|l| !l.is_empty())
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Node of a label tree carrying an optional value.
#[derive(Debug, Clone)]
struct LabelNode<V> {
    value: Option<V>,
    children: HashMap<String, LabelNode<V>>,
}

impl<V> Default for LabelNode<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

/// Map from domain names to values with longest-suffix lookup.
///
/// `get` walks the queried name label by label from the right and returns
/// the value attached to the most specific stored name that the query
/// equals or is a subdomain of.
#[derive(Debug, Clone)]
pub struct DomainMap<V> {
    root: LabelNode<V>,
    len: usize,
}

impl<V> Default for DomainMap<V> {
    fn default() -> Self {
        Self {
            root: LabelNode::default(),
            len: 0,
        }
    }
}

impl<V> DomainMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value for a name, replacing any previous value.
    pub fn insert(&mut self, name: &DomainName, value: V) {
        let mut node = &mut self.root;
        for label in name.labels_rev() {
            node = node.children.entry(label.to_string()).or_default();
        }

        if node.value.replace(value).is_none() {
            self.len += 1;
        }
    }

    /// Longest-suffix lookup.
    #[must_use]
    pub fn get(&self, name: &DomainName) -> Option<&V> {
        let mut node = &self.root;
        let mut best = node.value.as_ref();
        for label in name.labels_rev() {
            match node.children.get(label) {
                Some(child) => {
                    node = child;
                    if child.value.is_some() {
                        best = child.value.as_ref();
                    }
                }
                None => break,
            }
        }

        best
    }

    /// Number of stored names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no names are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Set of domain names matching whole subtrees.
///
/// Enumeration follows insertion order; membership means the queried name
/// equals a stored name or is a subdomain of one.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    tree: DomainMap<()>,
    order: Vec<DomainName>,
}

impl DomainSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a name; returns `true` if it was not present before.
    pub fn insert(&mut self, name: DomainName) -> bool {
        if self.order.contains(&name) {
            return false;
        }

        self.tree.insert(&name, ());
        self.order.push(name);
        true
    }

    /// Whether the name equals or is a subdomain of a stored name.
    #[must_use]
    pub fn contains(&self, name: &DomainName) -> bool {
        self.tree.get(name).is_some()
    }

    /// Stored names in insertion order.
    pub fn ordered(&self) -> impl Iterator<Item = &DomainName> {
        self.order.iter()
    }

    /// Stored names in lexicographic order of their canonical form.
    #[must_use]
    pub fn sorted(&self) -> Vec<&DomainName> {
        let mut out: Vec<&DomainName> = self.order.iter().collect();
        out.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        out
    }

    /// Number of stored names.
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

impl FromIterator<DomainName> for DomainSet {
    fn from_iter<I: IntoIterator<Item = DomainName>>(iter: I) -> Self {
        let mut set = Self::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl PartialEq for DomainSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for DomainSet {}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DomainName {
        DomainName::new(s).unwrap()
    }

    #[test]
    fn canonicalizes_case_and_trailing_dot() {
        assert_eq!(name("Example.COM.").as_str(), "example.com");
        assert_eq!(name("example.com").as_str(), "example.com");
        assert_eq!(name(".").as_str(), "");
    }

    #[test]
    fn rejects_empty_and_oversized_labels() {
        assert!(matches!(
            DomainName::new("a..b"),
            Err(DomainError::InvalidLabel { .. })
        ));
        let long = "a".repeat(64);
        assert!(matches!(
            DomainName::new(&long),
            Err(DomainError::TooLong { .. })
        ));
        let total = ["abcdefgh"; 32].join(".");
        assert!(matches!(
            DomainName::new(&total),
            Err(DomainError::TooLong { .. })
        ));
    }

    #[test]
    fn set_matches_subdomains() {
        let mut set = DomainSet::new();
        set.insert(name("example.com"));
        set.insert(name("org"));

        assert!(set.contains(&name("example.com")));
        assert!(set.contains(&name("www.example.com")));
        assert!(set.contains(&name("deep.www.example.com")));
        assert!(set.contains(&name("any.org")));
        assert!(!set.contains(&name("example.net")));
        assert!(!set.contains(&name("com")));
    }

    #[test]
    fn map_returns_most_specific_value() {
        let mut map = DomainMap::new();
        map.insert(&name("com"), 1);
        map.insert(&name("example.com"), 2);

        assert_eq!(map.get(&name("example.com")), Some(&2));
        assert_eq!(map.get(&name("www.example.com")), Some(&2));
        assert_eq!(map.get(&name("other.com")), Some(&1));
        assert_eq!(map.get(&name("example.org")), None);
    }

    #[test]
    fn set_enumeration_orders() {
        let mut set = DomainSet::new();
        set.insert(name("b.com"));
        set.insert(name("a.com"));

        let ordered: Vec<&str> = set.ordered().map(DomainName::as_str).collect();
        assert_eq!(ordered, ["b.com", "a.com"]);

        let sorted: Vec<&str> = set.sorted().into_iter().map(DomainName::as_str).collect();
        assert_eq!(sorted, ["a.com", "b.com"]);
    }
}
