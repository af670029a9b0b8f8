//! Named content bundles and selector expressions.
//!
//! A content bundle is a tree of string-keyed and domain-keyed maps with
//! typed leaves, prepared once when policies are loaded. Selectors walk a
//! bundle with a path of expressions evaluated against the request
//! context, which lets one policy consult request-independent data such as
//! category feeds keyed by domain.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::domain::{DomainMap, DomainName};
use crate::errors::{EvaluationError, ExprBuildError};
use crate::expr::Expression;
use crate::types::Type;
use crate::value::AttributeValue;

/// Node of a content bundle.
#[derive(Debug, Clone)]
pub enum ContentNode {
    /// Map keyed by string.
    StringMap(HashMap<String, ContentNode>),
    /// Map keyed by domain with subtree matching.
    DomainMap(Box<DomainMap<ContentNode>>),
    /// Terminal value.
    Leaf(AttributeValue),
}

impl ContentNode {
    /// Builds a string-keyed map node.
    #[must_use]
    pub fn string_map<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ContentNode)>,
        S: Into<String>,
    {
        Self::StringMap(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a domain-keyed map node.
    #[must_use]
    pub fn domain_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (DomainName, ContentNode)>,
    {
        let mut map = DomainMap::new();
        for (k, v) in entries {
            map.insert(&k, v);
        }
        Self::DomainMap(Box::new(map))
    }

    /// Builds a leaf node.
    #[must_use]
    pub fn leaf(value: impl Into<AttributeValue>) -> Self {
        Self::Leaf(value.into())
    }
}

/// One named content bundle.
#[derive(Debug, Clone)]
pub struct ContentItem {
    id: String,
    root: ContentNode,
}

impl ContentItem {
    /// Creates a bundle with the given id and root node.
    #[must_use]
    pub fn new(id: impl Into<String>, root: ContentNode) -> Self {
        Self {
            id: id.into(),
            root,
        }
    }

    /// The bundle id selectors refer to.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Collection of content bundles attached to a [`Context`].
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    items: HashMap<String, ContentItem>,
}

impl ContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bundle, replacing any bundle with the same id.
    pub fn add(&mut self, item: ContentItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Looks up a bundle by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ContentItem> {
        self.items.get(id)
    }
}

/// Expression looking up a value in a named content bundle.
///
/// The declared result type is checked against the leaf reached by the
/// path; a shape or type mismatch at any level is an invalid-type error
/// while a missing key is a missing-value error.
#[derive(Debug)]
pub struct Selector {
    content_id: String,
    path: Vec<Expression>,
    t: Type,
}

impl Selector {
    /// Builds a selector over `content_id` with the given path and result
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`ExprBuildError::InvalidArgument`] when a path element
    /// does not evaluate to a string or domain key.
    pub fn new(
        content_id: impl Into<String>,
        path: Vec<Expression>,
        t: Type,
    ) -> Result<Self, ExprBuildError> {
        for e in &path {
            let rt = e.result_type();
            if rt != Type::String && rt != Type::Domain {
                return Err(ExprBuildError::InvalidArgument {
                    op: "selector",
                    expected: "String or Domain path element",
                    actual: rt,
                });
            }
        }

        Ok(Self {
            content_id: content_id.into(),
            path,
            t,
        })
    }

    /// The declared result type.
    #[must_use]
    pub const fn result_type(&self) -> Type {
        self.t
    }

    /// The content bundle id.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub(crate) fn fingerprint(&self) -> String {
        let elems: Vec<String> = self.path.iter().map(Expression::describe).collect();
        format!("{}/{}:{}", self.content_id, elems.join("/"), self.t)
    }

    pub(crate) fn calculate(&self, ctx: &Context) -> Result<AttributeValue, EvaluationError> {
        let store = ctx
            .content_store()
            .ok_or_else(|| EvaluationError::MissingContent {
                id: self.content_id.clone(),
            })?;
        let item = store
            .get(&self.content_id)
            .ok_or_else(|| EvaluationError::MissingContent {
                id: self.content_id.clone(),
            })?;

        let mut node = &item.root;
        for e in &self.path {
            node = match node {
                ContentNode::StringMap(map) => {
                    let key = ctx.calculate_string_expression(e)?;
                    map.get(&key)
                        .ok_or_else(|| EvaluationError::MissingContentValue {
                            content: self.content_id.clone(),
                            key,
                        })?
                }
                ContentNode::DomainMap(map) => {
                    let key = ctx.calculate_domain_expression(e)?;
                    map.get(&key)
                        .ok_or_else(|| EvaluationError::MissingContentValue {
                            content: self.content_id.clone(),
                            key: key.as_str().to_string(),
                        })?
                }
                ContentNode::Leaf(_) => {
                    return Err(EvaluationError::InvalidContentItem {
                        content: self.content_id.clone(),
                        expected: "map for remaining path".to_string(),
                    });
                }
            };
        }

        match node {
            ContentNode::Leaf(v) if v.value_type() == self.t => Ok(v.clone()),
            ContentNode::Leaf(v) => Err(EvaluationError::AttributeValueType {
                expected: self.t,
                actual: v.value_type(),
            }),
            _ => Err(EvaluationError::InvalidContentItem {
                content: self.content_id.clone(),
                expected: format!("{} leaf", self.t),
            }),
        }
    }
}

/// Interning cache for selectors built during one policy load.
///
/// Two selectors with the same content id, path and result type resolve
/// to one shared instance, so identical lookups across many rules share
/// the prepared structure.
#[derive(Debug, Default)]
pub struct SelectorCache {
    interned: HashMap<String, Arc<Selector>>,
}

impl SelectorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared selector for the given shape, building it on
    /// first use.
    ///
    /// # Errors
    ///
    /// Propagates [`Selector::new`] validation errors.
    pub fn intern(
        &mut self,
        content_id: &str,
        path: Vec<Expression>,
        t: Type,
    ) -> Result<Arc<Selector>, ExprBuildError> {
        let candidate = Selector::new(content_id, path, t)?;
        let key = candidate.fingerprint();
        if let Some(existing) = self.interned.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let shared = Arc::new(candidate);
        self.interned.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    /// Number of distinct selectors interned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interned.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}
