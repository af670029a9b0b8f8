//! Policy sets and the evaluable tree.
//!
//! The policy tree is immutable: every mutation clones the affected node
//! and the spine above it while untouched subtrees stay shared through
//! `Arc`. That keeps committed snapshots cheap to retain and lets any
//! number of evaluations run against a snapshot while the next one is
//! being built.

use std::sync::Arc;

use crate::attr::{evaluate_obligations, ObligationExpr};
use crate::combiners::Combiner;
use crate::context::Context;
use crate::policy::Policy;
use crate::response::{Effect, Response};
use crate::rule::Rule;
use crate::storage::StorageError;
use crate::target::{combine_effect_and_status, Target};

/// Node of the policy tree: a policy or a nested policy set.
#[derive(Debug, Clone)]
pub enum Evaluable {
    /// A policy of rules.
    Policy(Arc<Policy>),
    /// A nested policy set.
    PolicySet(Arc<PolicySet>),
}

impl Evaluable {
    /// The node's id, or `None` when it is hidden.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Policy(p) => p.id(),
            Self::PolicySet(s) => s.id(),
        }
    }

    /// Evaluates the node against a context.
    #[must_use]
    pub fn calculate(&self, ctx: &Context) -> Response {
        match self {
            Self::Policy(p) => p.calculate(ctx),
            Self::PolicySet(s) => s.calculate(ctx),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Policy(p) => p.describe(),
            Self::PolicySet(s) => s.describe(),
        }
    }

    pub(crate) fn ord(&self) -> usize {
        match self {
            Self::Policy(p) => p.ord(),
            Self::PolicySet(s) => s.ord(),
        }
    }

    pub(crate) fn with_ord(&self, ord: usize) -> Self {
        match self {
            Self::Policy(p) => {
                let mut p = (**p).clone();
                p.set_ord(ord);
                Self::Policy(Arc::new(p))
            }
            Self::PolicySet(s) => {
                let mut s = (**s).clone();
                s.set_ord(ord);
                Self::PolicySet(Arc::new(s))
            }
        }
    }

    pub(crate) fn append(&self, path: &[String], item: &PolicyItem) -> Result<Self, StorageError> {
        match self {
            Self::Policy(p) => p.append(path, item).map(|p| Self::Policy(Arc::new(p))),
            Self::PolicySet(s) => s.append(path, item).map(|s| Self::PolicySet(Arc::new(s))),
        }
    }

    pub(crate) fn delete(&self, path: &[String]) -> Result<Self, StorageError> {
        match self {
            Self::Policy(p) => p.delete(path).map(|p| Self::Policy(Arc::new(p))),
            Self::PolicySet(s) => s.delete(path).map(|s| Self::PolicySet(Arc::new(s))),
        }
    }
}

impl From<Policy> for Evaluable {
    fn from(p: Policy) -> Self {
        Self::Policy(Arc::new(p))
    }
}

impl From<PolicySet> for Evaluable {
    fn from(s: PolicySet) -> Self {
        Self::PolicySet(Arc::new(s))
    }
}

/// Entity carried by an add command of a policy update.
#[derive(Debug, Clone)]
pub enum PolicyItem {
    /// A rule, valid only inside a policy.
    Rule(Arc<Rule>),
    /// A policy.
    Policy(Arc<Policy>),
    /// A policy set.
    PolicySet(Arc<PolicySet>),
}

impl PolicyItem {
    /// The entity's id, or `None` when it is hidden.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Rule(r) => r.id(),
            Self::Policy(p) => p.id(),
            Self::PolicySet(s) => s.id(),
        }
    }

    pub(crate) const fn kind_name(&self) -> &'static str {
        match self {
            Self::Rule(_) => "rule",
            Self::Policy(_) => "policy",
            Self::PolicySet(_) => "policy set",
        }
    }

    pub(crate) fn as_evaluable(&self) -> Option<Evaluable> {
        match self {
            Self::Rule(_) => None,
            Self::Policy(p) => Some(Evaluable::Policy(Arc::clone(p))),
            Self::PolicySet(s) => Some(Evaluable::PolicySet(Arc::clone(s))),
        }
    }
}

impl From<Rule> for PolicyItem {
    fn from(r: Rule) -> Self {
        Self::Rule(Arc::new(r))
    }
}

impl From<Policy> for PolicyItem {
    fn from(p: Policy) -> Self {
        Self::Policy(Arc::new(p))
    }
}

impl From<PolicySet> for PolicyItem {
    fn from(s: PolicySet) -> Self {
        Self::PolicySet(Arc::new(s))
    }
}

/// Policy set holding policies and nested sets under a combining
/// algorithm.
#[derive(Debug, Clone)]
pub struct PolicySet {
    id: String,
    hidden: bool,
    ord: usize,
    target: Target,
    children: Vec<Evaluable>,
    obligations: Vec<ObligationExpr>,
    algorithm: Combiner,
}

impl PolicySet {
    /// Creates a visible policy set; child ordinals follow declaration
    /// order.
    #[must_use]
    pub fn new(id: impl Into<String>, children: Vec<Evaluable>, algorithm: Combiner) -> Self {
        let children: Vec<Evaluable> = children
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_ord(i))
            .collect();
        let algorithm = algorithm.attached(&children);

        Self {
            id: id.into(),
            hidden: false,
            ord: 0,
            target: Target::default(),
            children,
            obligations: Vec::new(),
            algorithm,
        }
    }

    /// Creates a hidden policy set.
    #[must_use]
    pub fn hidden(children: Vec<Evaluable>, algorithm: Combiner) -> Self {
        let mut s = Self::new(String::new(), children, algorithm);
        s.hidden = true;
        s
    }

    /// Sets the policy set's target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Sets the policy set's obligations.
    #[must_use]
    pub fn with_obligations(mut self, obligations: Vec<ObligationExpr>) -> Self {
        self.obligations = obligations;
        self
    }

    /// The policy set's id, or `None` when it is hidden.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        if self.hidden {
            None
        } else {
            Some(&self.id)
        }
    }

    pub(crate) const fn ord(&self) -> usize {
        self.ord
    }

    pub(crate) fn set_ord(&mut self, ord: usize) {
        self.ord = ord;
    }

    pub(crate) fn describe(&self) -> String {
        match self.id() {
            Some(id) => format!("policy set {id:?}"),
            None => "hidden policy set".to_string(),
        }
    }

    /// Evaluates the policy set against a context.
    #[must_use]
    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            Err(err) => {
                let r = self.algorithm.execute(&self.children, ctx);
                let mut r = combine_effect_and_status(err, &r);
                if let Some(status) = r.status.take() {
                    r.status = Some(status.bind(self.describe()));
                }
                r
            }
            Ok(false) => Response::not_applicable(),
            Ok(true) => {
                let mut r = self.algorithm.execute(&self.children, ctx);
                if matches!(r.effect, Effect::Deny | Effect::Permit) {
                    match evaluate_obligations(&self.obligations, ctx) {
                        Ok(own) => r.obligations.extend(own),
                        Err(err) => {
                            let direction = if r.effect == Effect::Deny {
                                Effect::IndeterminateD
                            } else {
                                Effect::IndeterminateP
                            };
                            r = Response::indeterminate(direction, err);
                        }
                    }
                }

                if let Some(status) = r.status.take() {
                    r.status = Some(status.bind(self.describe()));
                }
                r
            }
        }
    }

    /// Returns a copy with the entity inserted under the addressed
    /// parent.
    ///
    /// An empty path targets this set; a longer path recurses into the
    /// named child, cloning the spine and sharing every untouched
    /// subtree.
    pub(crate) fn append(&self, path: &[String], item: &PolicyItem) -> Result<Self, StorageError> {
        if self.hidden {
            return Err(StorageError::HiddenPolicySetModification);
        }

        match path {
            [] => {
                let Some(child) = item.as_evaluable() else {
                    return Err(StorageError::InvalidPolicySetItemType {
                        actual: item.kind_name(),
                    });
                };

                let Some(id) = child.id().map(str::to_string) else {
                    return Err(StorageError::HiddenPolicyAppend);
                };

                let mut children = self.children.clone();
                match children.iter().position(|c| c.id() == Some(id.as_str())) {
                    Some(i) => children[i] = child.with_ord(children[i].ord()),
                    None => {
                        let ord = children.len();
                        children.push(child.with_ord(ord));
                    }
                }

                let algorithm = self.algorithm.attached(&children);
                Ok(Self {
                    children,
                    algorithm,
                    ..self.clone()
                })
            }
            [id, rest @ ..] => {
                let mut children = self.children.clone();
                let i = children
                    .iter()
                    .position(|c| c.id() == Some(id.as_str()))
                    .ok_or_else(|| StorageError::MissingPolicySetChild { id: id.clone() })?;
                let updated = children[i].append(rest, item)?;
                children[i] = updated;

                let algorithm = self.algorithm.attached(&children);
                Ok(Self {
                    children,
                    algorithm,
                    ..self.clone()
                })
            }
        }
    }

    /// Returns a copy with the addressed descendant removed.
    pub(crate) fn delete(&self, path: &[String]) -> Result<Self, StorageError> {
        if self.hidden {
            return Err(StorageError::HiddenPolicySetModification);
        }

        match path {
            [] => Err(StorageError::TooShortPathPolicySetModification),
            [id] => {
                let mut children = self.children.clone();
                let i = children
                    .iter()
                    .position(|c| c.id() == Some(id.as_str()))
                    .ok_or_else(|| StorageError::MissingPolicySetChild { id: id.clone() })?;
                children.remove(i);

                let algorithm = self.algorithm.attached(&children);
                Ok(Self {
                    children,
                    algorithm,
                    ..self.clone()
                })
            }
            [id, rest @ ..] => {
                let mut children = self.children.clone();
                let i = children
                    .iter()
                    .position(|c| c.id() == Some(id.as_str()))
                    .ok_or_else(|| StorageError::MissingPolicySetChild { id: id.clone() })?;
                let updated = children[i].delete(rest)?;
                children[i] = updated;

                let algorithm = self.algorithm.attached(&children);
                Ok(Self {
                    children,
                    algorithm,
                    ..self.clone()
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn child_ord(&self, id: &str) -> Option<usize> {
        self.children
            .iter()
            .find(|c| c.id() == Some(id))
            .map(Evaluable::ord)
    }
}
