//! Rules, the leaves of the policy tree.

use crate::attr::{evaluate_obligations, ObligationExpr};
use crate::context::Context;
use crate::errors::ExprBuildError;
use crate::expr::Expression;
use crate::response::{Response, RuleEffect};
use crate::target::Target;
use crate::types::Type;

/// A single rule: target, optional condition, effect and obligations.
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    hidden: bool,
    ord: usize,
    target: Target,
    condition: Option<Expression>,
    effect: RuleEffect,
    obligations: Vec<ObligationExpr>,
}

impl Rule {
    /// Creates a visible rule with an empty target and no condition.
    #[must_use]
    pub fn new(id: impl Into<String>, effect: RuleEffect) -> Self {
        Self {
            id: id.into(),
            hidden: false,
            ord: 0,
            target: Target::default(),
            condition: None,
            effect,
            obligations: Vec::new(),
        }
    }

    /// Creates a hidden rule.
    ///
    /// Hidden rules evaluate like visible ones but cannot be addressed by
    /// id: mappers skip them and updates cannot name them.
    #[must_use]
    pub fn hidden(effect: RuleEffect) -> Self {
        Self {
            id: String::new(),
            hidden: true,
            ord: 0,
            target: Target::default(),
            condition: None,
            effect,
            obligations: Vec::new(),
        }
    }

    /// Sets the rule's target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Sets the rule's condition.
    ///
    /// # Errors
    ///
    /// Returns [`ExprBuildError::InvalidArgument`] when the condition's
    /// result type is not boolean.
    pub fn with_condition(mut self, condition: Expression) -> Result<Self, ExprBuildError> {
        if condition.result_type() != Type::Boolean {
            return Err(ExprBuildError::InvalidArgument {
                op: "condition",
                expected: "Boolean",
                actual: condition.result_type(),
            });
        }

        self.condition = Some(condition);
        Ok(self)
    }

    /// Sets the rule's obligations.
    #[must_use]
    pub fn with_obligations(mut self, obligations: Vec<ObligationExpr>) -> Self {
        self.obligations = obligations;
        self
    }

    /// The rule's id, or `None` when it is hidden.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        if self.hidden {
            None
        } else {
            Some(&self.id)
        }
    }

    /// The rule's effect.
    #[must_use]
    pub const fn effect(&self) -> RuleEffect {
        self.effect
    }

    pub(crate) const fn ord(&self) -> usize {
        self.ord
    }

    pub(crate) fn set_ord(&mut self, ord: usize) {
        self.ord = ord;
    }

    pub(crate) fn describe(&self) -> String {
        match self.id() {
            Some(id) => format!("rule {id:?}"),
            None => "hidden rule".to_string(),
        }
    }

    /// Evaluates the rule against a context.
    ///
    /// A non-matching target or false condition yields NotApplicable; an
    /// error in the target, condition or obligations yields the
    /// indeterminate effect directed by the rule's own effect.
    #[must_use]
    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            Err(err) => {
                Response::indeterminate(self.effect.indeterminate(), err.bind(self.describe()))
            }
            Ok(false) => Response::not_applicable(),
            Ok(true) => self.calculate_condition(ctx),
        }
    }

    fn calculate_condition(&self, ctx: &Context) -> Response {
        if let Some(condition) = &self.condition {
            match ctx.calculate_boolean_expression(condition) {
                Err(err) => {
                    return Response::indeterminate(
                        self.effect.indeterminate(),
                        err.bind("condition").bind(self.describe()),
                    );
                }
                Ok(false) => return Response::not_applicable(),
                Ok(true) => {}
            }
        }

        match evaluate_obligations(&self.obligations, ctx) {
            Ok(obligations) => Response::with_obligations(self.effect.into(), obligations),
            Err(err) => {
                Response::indeterminate(self.effect.indeterminate(), err.bind(self.describe()))
            }
        }
    }
}
