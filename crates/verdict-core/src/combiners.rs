//! Combining algorithms for rules and policies.
//!
//! A combiner folds the responses of an evaluable's children into one
//! response. The same algorithms serve both levels: a policy combines
//! rules, a policy set combines policies and nested sets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::EvaluationError;
use crate::expr::Expression;
use crate::policy_set::Evaluable;
use crate::response::{Effect, Response};
use crate::rule::Rule;
use crate::value::AttributeValue;

/// Child a combining algorithm can evaluate and address by id.
pub(crate) trait ChildEvaluable {
    /// The child's id, or `None` when it is hidden.
    fn visible_id(&self) -> Option<&str>;

    /// Evaluates the child against the context.
    fn evaluate(&self, ctx: &Context) -> Response;
}

impl ChildEvaluable for Arc<Rule> {
    fn visible_id(&self) -> Option<&str> {
        self.as_ref().id()
    }

    fn evaluate(&self, ctx: &Context) -> Response {
        self.as_ref().calculate(ctx)
    }
}

impl ChildEvaluable for Evaluable {
    fn visible_id(&self) -> Option<&str> {
        self.id()
    }

    fn evaluate(&self, ctx: &Context) -> Response {
        self.calculate(ctx)
    }
}

impl<T: ChildEvaluable> ChildEvaluable for &T {
    fn visible_id(&self) -> Option<&str> {
        (*self).visible_id()
    }

    fn evaluate(&self, ctx: &Context) -> Response {
        (*self).evaluate(ctx)
    }
}

/// Combining algorithm attached to a policy or policy set.
#[derive(Debug, Clone)]
pub enum Combiner {
    /// Return the first non-NotApplicable child response unchanged.
    FirstApplicableEffect,
    /// Any Deny wins; permits merge; indeterminates widen by direction.
    DenyOverrides,
    /// Route to children named by an argument expression.
    Mapper(Box<MapperCombiner>),
}

impl Combiner {
    /// Builds a mapper combiner from its parameters.
    #[must_use]
    pub fn mapper(params: MapperParams) -> Self {
        Self::Mapper(Box::new(MapperCombiner {
            argument: params.argument,
            default_id: params.default_id,
            error_id: params.error_id,
            sub: params.sub,
            index: None,
        }))
    }

    /// Returns this combiner bound to a concrete child list.
    ///
    /// Mapper combiners maintain an id-to-child index; it is rebuilt here
    /// whenever a policy or policy set is constructed or its children
    /// change, keeping the index in step with the child slice.
    pub(crate) fn attached<E: ChildEvaluable>(&self, children: &[E]) -> Self {
        match self {
            Self::Mapper(m) => {
                let mut index = HashMap::new();
                for (i, c) in children.iter().enumerate() {
                    if let Some(id) = c.visible_id() {
                        index.insert(id.to_string(), i);
                    }
                }

                let mut m = m.clone();
                m.index = Some(index);
                Self::Mapper(m)
            }
            other => other.clone(),
        }
    }

    pub(crate) fn execute<E: ChildEvaluable>(&self, children: &[E], ctx: &Context) -> Response {
        let refs: Vec<&dyn ChildEvaluable> =
            children.iter().map(|c| c as &dyn ChildEvaluable).collect();
        self.execute_dyn(&refs, ctx)
    }

    fn execute_dyn(&self, children: &[&dyn ChildEvaluable], ctx: &Context) -> Response {
        match self {
            Self::FirstApplicableEffect => first_applicable_effect(children, ctx),
            Self::DenyOverrides => deny_overrides(children, ctx),
            Self::Mapper(m) => m.execute(children, ctx),
        }
    }
}

/// Parameters of a mapper combiner.
#[derive(Debug, Clone)]
pub struct MapperParams {
    /// Expression naming the child (or children) to evaluate.
    pub argument: Expression,
    /// Child evaluated when the argument reports a missing value or no
    /// child matches.
    pub default_id: Option<String>,
    /// Child evaluated when the argument fails with any other error.
    pub error_id: Option<String>,
    /// Algorithm run over the selected children; without one the
    /// argument must name a single child.
    pub sub: Option<Combiner>,
}

/// Mapper combining algorithm.
///
/// Keeps an id-to-child index for the attached child list; an unattached
/// instance (a sub-combiner) resolves ids by scanning the slice it is
/// handed at execution time.
#[derive(Debug, Clone)]
pub struct MapperCombiner {
    argument: Expression,
    default_id: Option<String>,
    error_id: Option<String>,
    sub: Option<Combiner>,
    index: Option<HashMap<String, usize>>,
}

impl MapperCombiner {
    fn find<'a>(
        &self,
        children: &'a [&'a dyn ChildEvaluable],
        id: &str,
    ) -> Option<&'a dyn ChildEvaluable> {
        match &self.index {
            Some(index) => index.get(id).and_then(|&i| children.get(i)).copied(),
            None => children.iter().find(|c| c.visible_id() == Some(id)).copied(),
        }
    }

    fn find_named<'a>(
        &self,
        children: &'a [&'a dyn ChildEvaluable],
        id: Option<&str>,
    ) -> Option<&'a dyn ChildEvaluable> {
        id.and_then(|id| self.find(children, id))
    }

    fn error_response(
        &self,
        children: &[&dyn ChildEvaluable],
        ctx: &Context,
        err: EvaluationError,
    ) -> Response {
        if let Some(e) = self.find_named(children, self.error_id.as_deref()) {
            return e.evaluate(ctx);
        }

        Response::indeterminate(Effect::Indeterminate, err.bind("mapper"))
    }

    fn execute(&self, children: &[&dyn ChildEvaluable], ctx: &Context) -> Response {
        let v = match self.argument.calculate(ctx) {
            Ok(v) => v,
            Err(err) => {
                if err.is_missing_value() {
                    if let Some(d) = self.find_named(children, self.default_id.as_deref()) {
                        return d.evaluate(ctx);
                    }
                }

                return self.error_response(children, ctx, err);
            }
        };

        if let Some(sub) = &self.sub {
            let ids = match ids_from_argument(&v) {
                Ok(ids) => ids,
                Err(err) => return self.error_response(children, ctx, err),
            };

            let selected: Vec<&dyn ChildEvaluable> = ids
                .iter()
                .filter_map(|id| self.find(children, id))
                .collect();

            let r = sub.execute_dyn(&selected, ctx);
            if r.effect == Effect::NotApplicable {
                if let Some(d) = self.find_named(children, self.default_id.as_deref()) {
                    return d.evaluate(ctx);
                }
            }

            return r;
        }

        let id = match v.string() {
            Ok(id) => id,
            Err(err) => return self.error_response(children, ctx, err),
        };

        if let Some(c) = self.find(children, id) {
            return c.evaluate(ctx);
        }

        if let Some(d) = self.find_named(children, self.default_id.as_deref()) {
            return d.evaluate(ctx);
        }

        Response::not_applicable()
    }
}

/// Coerces a mapper argument to an ordered list of child ids.
///
/// Sets enumerate in sorted order; lists keep caller order with repeats
/// de-duplicated on first occurrence.
fn ids_from_argument(v: &AttributeValue) -> Result<Vec<String>, EvaluationError> {
    match v {
        AttributeValue::String(s) => Ok(vec![s.clone()]),
        AttributeValue::SetOfStrings(set) => {
            Ok(set.sorted().into_iter().map(str::to_string).collect())
        }
        AttributeValue::ListOfStrings(list) => {
            let mut seen = std::collections::HashSet::new();
            Ok(list
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect())
        }
        other => Err(EvaluationError::MapperArgumentType {
            t: other.value_type(),
        }),
    }
}

fn first_applicable_effect(children: &[&dyn ChildEvaluable], ctx: &Context) -> Response {
    for c in children {
        let r = c.evaluate(ctx);
        if r.effect != Effect::NotApplicable {
            return r;
        }
    }

    Response::not_applicable()
}

fn deny_overrides(children: &[&dyn ChildEvaluable], ctx: &Context) -> Response {
    let mut errs = Vec::new();
    let mut obligations = Vec::new();

    let mut indet_d = 0usize;
    let mut indet_p = 0usize;
    let mut indet_dp = 0usize;
    let mut permits = 0usize;

    for c in children {
        let r = c.evaluate(ctx);
        match r.effect {
            Effect::Deny => return r,
            Effect::Permit => {
                permits += 1;
                obligations.extend(r.obligations);
            }
            Effect::NotApplicable => {}
            effect => {
                match effect {
                    Effect::IndeterminateD => indet_d += 1,
                    Effect::IndeterminateP => indet_p += 1,
                    _ => indet_dp += 1,
                }

                if let Some(status) = r.status {
                    errs.push(status);
                }
            }
        }
    }

    let status = EvaluationError::from_list(errs).map(|err| err.bind("deny overrides"));

    if indet_dp > 0 || (indet_d > 0 && (indet_p > 0 || permits > 0)) {
        return Response {
            effect: Effect::IndeterminateDP,
            status,
            obligations: Vec::new(),
        };
    }

    if indet_d > 0 {
        return Response {
            effect: Effect::IndeterminateD,
            status,
            obligations: Vec::new(),
        };
    }

    if permits > 0 {
        return Response::with_obligations(Effect::Permit, obligations);
    }

    if indet_p > 0 {
        return Response {
            effect: Effect::IndeterminateP,
            status,
            obligations: Vec::new(),
        };
    }

    Response::not_applicable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attribute;
    use crate::response::RuleEffect;
    use crate::sets::StringSet;
    use crate::types::Type;

    fn rule(id: &str, effect: RuleEffect) -> Arc<Rule> {
        Arc::new(Rule::new(id, effect))
    }

    fn failing_rule(id: &str, effect: RuleEffect) -> Arc<Rule> {
        let condition = Expression::designator(Attribute::new("absent", Type::Boolean));
        Arc::new(Rule::new(id, effect).with_condition(condition).unwrap())
    }

    #[test]
    fn first_applicable_effect_returns_first_decision() {
        let ctx = Context::empty();
        let rules = vec![
            Arc::new(
                Rule::new("skip", RuleEffect::Deny)
                    .with_condition(Expression::value(false))
                    .unwrap(),
            ),
            rule("permit", RuleEffect::Permit),
            rule("deny", RuleEffect::Deny),
        ];

        let r = Combiner::FirstApplicableEffect.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Permit);
    }

    #[test]
    fn first_applicable_effect_empty_is_not_applicable() {
        let rules: Vec<Arc<Rule>> = Vec::new();
        let r = Combiner::FirstApplicableEffect.execute(&rules, &Context::empty());
        assert_eq!(r.effect, Effect::NotApplicable);
    }

    #[test]
    fn deny_overrides_deny_wins() {
        let ctx = Context::empty();
        let rules = vec![
            rule("permit", RuleEffect::Permit),
            rule("deny", RuleEffect::Deny),
        ];

        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Deny);
    }

    #[test]
    fn deny_overrides_merges_permits() {
        let ctx = Context::empty();
        let rules = vec![
            rule("a", RuleEffect::Permit),
            rule("b", RuleEffect::Permit),
        ];

        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Permit);
    }

    #[test]
    fn deny_overrides_widens_mixed_indeterminates() {
        let ctx = Context::empty();

        let rules = vec![failing_rule("d", RuleEffect::Deny)];
        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::IndeterminateD);

        let rules = vec![
            failing_rule("d", RuleEffect::Deny),
            rule("p", RuleEffect::Permit),
        ];
        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::IndeterminateDP);

        let rules = vec![failing_rule("p", RuleEffect::Permit)];
        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::IndeterminateP);
    }

    #[test]
    fn deny_overrides_concatenates_statuses_in_order() {
        let ctx = Context::empty();
        let rules = vec![
            failing_rule("first", RuleEffect::Deny),
            failing_rule("second", RuleEffect::Deny),
        ];

        let r = Combiner::DenyOverrides.execute(&rules, &ctx);
        let status = r.status.unwrap().to_string();
        let first = status.find("\"first\"").unwrap();
        let second = status.find("\"second\"").unwrap();
        assert!(first < second, "statuses out of order: {status}");
    }

    #[test]
    fn mapper_routes_by_string_argument() {
        let ctx = Context::new([("route", AttributeValue::String("allow".to_string()))]);
        let rules = vec![
            rule("allow", RuleEffect::Permit),
            rule("block", RuleEffect::Deny),
        ];

        let combiner = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("route", Type::String)),
            default_id: None,
            error_id: None,
            sub: None,
        })
        .attached(&rules);

        let r = combiner.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Permit);
    }

    #[test]
    fn mapper_set_argument_runs_sub_combiner_in_sorted_order() {
        let mut set = StringSet::new();
        set.insert("b");
        set.insert("a");
        let ctx = Context::new([("routes", AttributeValue::SetOfStrings(set))]);

        let rules = vec![
            rule("b", RuleEffect::Deny),
            rule("a", RuleEffect::Permit),
        ];

        let combiner = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("routes", Type::SetOfStrings)),
            default_id: None,
            error_id: None,
            sub: Some(Combiner::FirstApplicableEffect),
        })
        .attached(&rules);

        // "a" sorts before "b", so first-applicable sees the permit first.
        let r = combiner.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Permit);
    }

    #[test]
    fn mapper_unknown_id_uses_default_then_not_applicable() {
        let ctx = Context::new([("route", AttributeValue::String("nope".to_string()))]);
        let rules = vec![
            rule("allow", RuleEffect::Permit),
            rule("fallback", RuleEffect::Deny),
        ];

        let with_default = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("route", Type::String)),
            default_id: Some("fallback".to_string()),
            error_id: None,
            sub: None,
        })
        .attached(&rules);
        assert_eq!(with_default.execute(&rules, &ctx).effect, Effect::Deny);

        let without_default = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("route", Type::String)),
            default_id: None,
            error_id: None,
            sub: None,
        })
        .attached(&rules);
        assert_eq!(
            without_default.execute(&rules, &ctx).effect,
            Effect::NotApplicable
        );
    }

    #[test]
    fn mapper_argument_error_routes_to_error_rule() {
        let ctx = Context::empty();
        let rules = vec![
            rule("allow", RuleEffect::Permit),
            rule("on-error", RuleEffect::Deny),
        ];

        let combiner = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("route", Type::String)),
            default_id: None,
            error_id: Some("on-error".to_string()),
            sub: None,
        })
        .attached(&rules);

        let r = combiner.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Deny);
    }

    #[test]
    fn mapper_without_error_rule_is_indeterminate() {
        let ctx = Context::empty();
        let rules = vec![rule("allow", RuleEffect::Permit)];

        let combiner = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("route", Type::String)),
            default_id: None,
            error_id: None,
            sub: None,
        })
        .attached(&rules);

        let r = combiner.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::Indeterminate);
        assert!(r.status.unwrap().to_string().starts_with("mapper>"));
    }

    #[test]
    fn mapper_empty_selection_is_not_applicable() {
        let ctx = Context::new([(
            "routes",
            AttributeValue::SetOfStrings(StringSet::new()),
        )]);
        let rules = vec![rule("allow", RuleEffect::Permit)];

        let combiner = Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("routes", Type::SetOfStrings)),
            default_id: None,
            error_id: None,
            sub: Some(Combiner::FirstApplicableEffect),
        })
        .attached(&rules);

        let r = combiner.execute(&rules, &ctx);
        assert_eq!(r.effect, Effect::NotApplicable);
    }

    #[test]
    fn list_argument_preserves_order_and_dedups() {
        let ids = ids_from_argument(&AttributeValue::ListOfStrings(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]))
        .unwrap();
        assert_eq!(ids, ["b", "a"]);

        let err = ids_from_argument(&AttributeValue::Integer(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mapper argument must be a String, Set of Strings or List of Strings but got Integer"
        );
    }
}
