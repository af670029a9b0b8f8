//! Attributes, attribute assignments and obligation expressions.

use std::fmt;

use crate::context::Context;
use crate::errors::EvaluationError;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::AttributeValue;

/// Name of a typed slot in the evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    id: String,
    t: Type,
}

impl Attribute {
    /// Creates an attribute reference.
    #[must_use]
    pub fn new(id: impl Into<String>, t: Type) -> Self {
        Self { id: id.into(), t }
    }

    /// The attribute id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The attribute type.
    #[must_use]
    pub const fn attr_type(&self) -> Type {
        self.t
    }

    pub(crate) fn missing_error(&self) -> EvaluationError {
        EvaluationError::MissingAttribute {
            id: self.id.clone(),
            t: self.t,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr({}.{})", self.id, self.t)
    }
}

/// Concrete attribute assignment carried by a decision response.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAssignment {
    /// Attribute id the enforcement point matches on.
    pub id: String,
    /// Assigned value.
    pub value: AttributeValue,
}

impl AttributeAssignment {
    /// Creates an assignment.
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Obligation attached to a rule, policy or policy set.
///
/// The expression is evaluated against the request context when the
/// decision is Permit or Deny, producing the [`AttributeAssignment`]
/// returned to the enforcement point.
#[derive(Debug, Clone)]
pub struct ObligationExpr {
    id: String,
    expr: Expression,
}

impl ObligationExpr {
    /// Creates an obligation from an id and value expression.
    #[must_use]
    pub fn new(id: impl Into<String>, expr: Expression) -> Self {
        Self {
            id: id.into(),
            expr,
        }
    }

    /// The assigned attribute id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Evaluates the obligation against the context.
    ///
    /// # Errors
    ///
    /// Propagates the expression error bound with the obligation id.
    pub fn evaluate(&self, ctx: &Context) -> Result<AttributeAssignment, EvaluationError> {
        let value = self
            .expr
            .calculate(ctx)
            .map_err(|err| err.bind(format!("obligation \"{}\"", self.id)))?;

        Ok(AttributeAssignment {
            id: self.id.clone(),
            value,
        })
    }
}

/// Evaluates a list of obligation expressions in declaration order.
pub(crate) fn evaluate_obligations(
    obligations: &[ObligationExpr],
    ctx: &Context,
) -> Result<Vec<AttributeAssignment>, EvaluationError> {
    let mut out = Vec::with_capacity(obligations.len());
    for o in obligations {
        out.push(o.evaluate(ctx)?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obligation_evaluates_constant() {
        let ctx = Context::empty();
        let o = ObligationExpr::new("redirect_to", Expression::value("198.51.100.1"));
        let a = o.evaluate(&ctx).unwrap();
        assert_eq!(a.id, "redirect_to");
        assert_eq!(a.value.string().unwrap(), "198.51.100.1");
    }

    #[test]
    fn obligation_binds_its_id_on_error() {
        let ctx = Context::empty();
        let o = ObligationExpr::new(
            "log",
            Expression::designator(Attribute::new("x", Type::String)),
        );
        let err = o.evaluate(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "obligation \"log\">missing attribute \"x\" of type \"String\""
        );
    }
}
