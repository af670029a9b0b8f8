//! Policies: ordered rules under a combining algorithm.

use std::sync::Arc;

use crate::attr::{evaluate_obligations, ObligationExpr};
use crate::combiners::Combiner;
use crate::context::Context;
use crate::policy_set::PolicyItem;
use crate::response::{Effect, Response};
use crate::rule::Rule;
use crate::storage::StorageError;
use crate::target::{combine_effect_and_status, Target};

/// Policy holding rules combined by an algorithm.
#[derive(Debug, Clone)]
pub struct Policy {
    id: String,
    hidden: bool,
    ord: usize,
    target: Target,
    rules: Vec<Arc<Rule>>,
    obligations: Vec<ObligationExpr>,
    algorithm: Combiner,
}

impl Policy {
    /// Creates a visible policy; rule ordinals follow declaration order.
    #[must_use]
    pub fn new(id: impl Into<String>, rules: Vec<Rule>, algorithm: Combiner) -> Self {
        let rules: Vec<Arc<Rule>> = rules
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.set_ord(i);
                Arc::new(r)
            })
            .collect();
        let algorithm = algorithm.attached(&rules);

        Self {
            id: id.into(),
            hidden: false,
            ord: 0,
            target: Target::default(),
            rules,
            obligations: Vec::new(),
            algorithm,
        }
    }

    /// Creates a hidden policy.
    #[must_use]
    pub fn hidden(rules: Vec<Rule>, algorithm: Combiner) -> Self {
        let mut p = Self::new(String::new(), rules, algorithm);
        p.hidden = true;
        p
    }

    /// Sets the policy's target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Sets the policy's obligations.
    #[must_use]
    pub fn with_obligations(mut self, obligations: Vec<ObligationExpr>) -> Self {
        self.obligations = obligations;
        self
    }

    /// The policy's id, or `None` when it is hidden.
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
            Some(id) => format!("policy {id:?}"),
            None => "hidden policy".to_string(),
        }
    }

    /// Evaluates the policy against a context.
    #[must_use]
    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            Err(err) => {
                let r = self.algorithm.execute(&self.rules, ctx);
                let mut r = combine_effect_and_status(err, &r);
                if let Some(status) = r.status.take() {
                    r.status = Some(status.bind(self.describe()));
                }
                r
            }
            Ok(false) => Response::not_applicable(),
            Ok(true) => {
                let mut r = self.algorithm.execute(&self.rules, ctx);
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

    /// Returns a copy with the rule inserted or replaced.
    ///
    /// An existing rule with the same id is replaced in place keeping its
    /// ordinal; a new rule is appended with the next ordinal.
    pub(crate) fn append(&self, path: &[String], item: &PolicyItem) -> Result<Self, StorageError> {
        if let Some(next) = path.first() {
            return Err(StorageError::TooLongPathPolicyModification { id: next.clone() });
        }

        if self.hidden {
            return Err(StorageError::HiddenPolicyModification);
        }

        let PolicyItem::Rule(rule) = item else {
            return Err(StorageError::InvalidPolicyItemType {
                actual: item.kind_name(),
            });
        };

        let Some(id) = rule.id() else {
            return Err(StorageError::HiddenRuleAppend);
        };

        let mut rules = self.rules.clone();
        match rules.iter().position(|r| r.id() == Some(id)) {
            Some(i) => {
                let mut replacement = (**rule).clone();
                replacement.set_ord(rules[i].ord());
                rules[i] = Arc::new(replacement);
            }
            None => {
                let mut appended = (**rule).clone();
                appended.set_ord(rules.len());
                rules.push(Arc::new(appended));
            }
        }

        let algorithm = self.algorithm.attached(&rules);
        Ok(Self {
            rules,
            algorithm,
            ..self.clone()
        })
    }

    /// Returns a copy with the named rule removed.
    pub(crate) fn delete(&self, path: &[String]) -> Result<Self, StorageError> {
        if self.hidden {
            return Err(StorageError::HiddenPolicyModification);
        }

        match path {
            [] => Err(StorageError::TooShortPathPolicyModification),
            [id] => {
                let mut rules = self.rules.clone();
                let i = rules
                    .iter()
                    .position(|r| r.id() == Some(id.as_str()))
                    .ok_or_else(|| StorageError::MissingPolicyChild { id: id.clone() })?;
                rules.remove(i);

                let algorithm = self.algorithm.attached(&rules);
                Ok(Self {
                    rules,
                    algorithm,
                    ..self.clone()
                })
            }
            [id, ..] => Err(StorageError::TooLongPathPolicyModification { id: id.clone() }),
        }
    }

    #[cfg(test)]
    pub(crate) fn rule_ord(&self, id: &str) -> Option<usize> {
        self.rules
            .iter()
            .find(|r| r.id() == Some(id))
            .map(|r| r.ord())
    }
}
