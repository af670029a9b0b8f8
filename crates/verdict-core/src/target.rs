//! Applicability targets.
//!
//! A target is a three-level boolean structure gating whether a rule,
//! policy or policy set applies to a request: a conjunction of [`AnyOf`]
//! groups, each a disjunction of [`AllOf`] groups, each a conjunction of
//! [`Match`] expressions.

use crate::context::Context;
use crate::errors::{EvaluationError, ExprBuildError};
use crate::expr::Expression;
use crate::response::{Effect, Response};
use crate::types::Type;

/// A single boolean match expression.
#[derive(Debug, Clone)]
pub struct Match {
    expr: Expression,
}

impl Match {
    /// Wraps a boolean expression.
    ///
    /// # Errors
    ///
    /// Returns [`ExprBuildError::InvalidArgument`] when the expression's
    /// result type is not boolean.
    pub fn new(expr: Expression) -> Result<Self, ExprBuildError> {
        if expr.result_type() != Type::Boolean {
            return Err(ExprBuildError::InvalidArgument {
                op: "match",
                expected: "Boolean",
                actual: expr.result_type(),
            });
        }

        Ok(Self { expr })
    }

    fn calculate(&self, ctx: &Context) -> Result<bool, EvaluationError> {
        ctx.calculate_boolean_expression(&self.expr)
            .map_err(|err| err.bind("match"))
    }
}

/// Conjunction of matches; false or erring members decide left to right.
#[derive(Debug, Clone, Default)]
pub struct AllOf {
    matches: Vec<Match>,
}

impl AllOf {
    /// Builds a conjunction from matches.
    #[must_use]
    pub fn new(matches: Vec<Match>) -> Self {
        Self { matches }
    }

    fn calculate(&self, ctx: &Context) -> Result<bool, EvaluationError> {
        for m in &self.matches {
            if !m.calculate(ctx).map_err(|err| err.bind("all"))? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Disjunction of [`AllOf`] groups.
///
/// A true group masks errors of earlier groups; with no true group the
/// first error wins over plain false.
#[derive(Debug, Clone, Default)]
pub struct AnyOf {
    all: Vec<AllOf>,
}

impl AnyOf {
    /// Builds a disjunction from conjunction groups.
    #[must_use]
    pub fn new(all: Vec<AllOf>) -> Self {
        Self { all }
    }

    fn calculate(&self, ctx: &Context) -> Result<bool, EvaluationError> {
        let mut first_err = None;
        for a in &self.all {
            match a.calculate(ctx) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err.bind("any"));
                    }
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(false),
        }
    }
}

/// Conjunction of [`AnyOf`] groups gating applicability.
///
/// Evaluation is left-to-right short-circuit: the first erring group makes
/// the target indeterminate (a previously matched group does not mask it)
/// and the first false group makes the target a no-match. An empty target
/// always matches.
#[derive(Debug, Clone, Default)]
pub struct Target {
    any: Vec<AnyOf>,
}

impl Target {
    /// Builds a target from its conjunction groups.
    #[must_use]
    pub fn new(any: Vec<AnyOf>) -> Self {
        Self { any }
    }

    /// Convenience target with a single match.
    ///
    /// # Errors
    ///
    /// Propagates [`Match::new`] validation.
    pub fn single(expr: Expression) -> Result<Self, ExprBuildError> {
        Ok(Self::new(vec![AnyOf::new(vec![AllOf::new(vec![
            Match::new(expr)?,
        ])])]))
    }

    pub(crate) fn calculate(&self, ctx: &Context) -> Result<bool, EvaluationError> {
        for a in &self.any {
            if !a.calculate(ctx).map_err(|err| err.bind("target"))? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Folds a target error into the combining algorithm's result.
///
/// The algorithm still runs so the direction of the indeterminate outcome
/// reflects what the children would have decided: NotApplicable stays
/// NotApplicable with the error dropped, Deny and Permit turn into their
/// directional indeterminates, directional indeterminates keep their
/// direction and everything else widens to Indeterminate{DP}.
pub(crate) fn combine_effect_and_status(err: EvaluationError, r: &Response) -> Response {
    match r.effect {
        Effect::NotApplicable => Response::not_applicable(),
        Effect::Deny | Effect::IndeterminateD => {
            Response::indeterminate(Effect::IndeterminateD, err)
        }
        Effect::Permit | Effect::IndeterminateP => {
            Response::indeterminate(Effect::IndeterminateP, err)
        }
        _ => Response::indeterminate(Effect::IndeterminateDP, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attribute;
    use crate::value::AttributeValue;

    fn ctx() -> Context {
        Context::new([("flag", AttributeValue::Boolean(true))])
    }

    fn m(value: bool) -> Match {
        Match::new(Expression::value(value)).unwrap()
    }

    fn erring() -> Match {
        Match::new(Expression::designator(Attribute::new(
            "absent",
            Type::Boolean,
        )))
        .unwrap()
    }

    #[test]
    fn empty_target_matches() {
        assert!(Target::default().calculate(&ctx()).unwrap());
    }

    #[test]
    fn match_requires_boolean_expression() {
        assert!(Match::new(Expression::value(1i64)).is_err());
    }

    #[test]
    fn all_of_is_conjunction() {
        let all = AllOf::new(vec![m(true), m(false), erring()]);
        assert!(!all.calculate(&ctx()).unwrap());

        let all = AllOf::new(vec![m(true), m(true)]);
        assert!(all.calculate(&ctx()).unwrap());
    }

    #[test]
    fn all_of_error_stops_evaluation() {
        let all = AllOf::new(vec![erring(), m(false)]);
        let err = all.calculate(&ctx()).unwrap_err();
        assert!(err.to_string().starts_with("all>match>"));
    }

    #[test]
    fn any_of_true_masks_errors() {
        let any = AnyOf::new(vec![
            AllOf::new(vec![erring()]),
            AllOf::new(vec![m(true)]),
        ]);
        assert!(any.calculate(&ctx()).unwrap());
    }

    #[test]
    fn any_of_error_wins_over_false() {
        let any = AnyOf::new(vec![
            AllOf::new(vec![m(false)]),
            AllOf::new(vec![erring()]),
            AllOf::new(vec![m(false)]),
        ]);
        assert!(any.calculate(&ctx()).is_err());
    }

    #[test]
    fn target_error_is_not_masked_by_matched_group() {
        let target = Target::new(vec![
            AnyOf::new(vec![AllOf::new(vec![m(true)])]),
            AnyOf::new(vec![AllOf::new(vec![erring()])]),
        ]);
        let err = target.calculate(&ctx()).unwrap_err();
        assert!(err.to_string().starts_with("target>any>all>match>"));
    }

    #[test]
    fn target_false_group_short_circuits() {
        let target = Target::new(vec![
            AnyOf::new(vec![AllOf::new(vec![m(false)])]),
            AnyOf::new(vec![AllOf::new(vec![erring()])]),
        ]);
        assert!(!target.calculate(&ctx()).unwrap());
    }

    #[test]
    fn combine_effect_and_status_directions() {
        let err = || EvaluationError::DivideByZero;

        let r = combine_effect_and_status(err(), &Response::not_applicable());
        assert_eq!(r.effect, Effect::NotApplicable);
        assert!(r.status.is_none());

        let deny = Response::with_obligations(Effect::Deny, Vec::new());
        let r = combine_effect_and_status(err(), &deny);
        assert_eq!(r.effect, Effect::IndeterminateD);
        assert!(r.status.is_some());

        let permit = Response::with_obligations(Effect::Permit, Vec::new());
        let r = combine_effect_and_status(err(), &permit);
        assert_eq!(r.effect, Effect::IndeterminateP);

        let wide = Response::indeterminate(Effect::Indeterminate, err());
        let r = combine_effect_and_status(err(), &wide);
        assert_eq!(r.effect, Effect::IndeterminateDP);
    }
}
