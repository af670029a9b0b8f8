//! End-to-end evaluation scenarios against the public API.

use std::collections::HashMap;

use uuid::Uuid;
use verdict_core::prelude::*;
use verdict_core::wire;

fn simple_tree(effect: RuleEffect) -> PolicySet {
    let rule = Rule::new("r", effect);
    let policy = Policy::new("p", vec![rule], Combiner::FirstApplicableEffect);
    PolicySet::new("root", vec![policy.into()], Combiner::FirstApplicableEffect)
}

#[test]
fn simple_allow() {
    let root = simple_tree(RuleEffect::Permit);
    let response = root.calculate(&Context::empty());

    assert_eq!(response.effect, Effect::Permit);
    assert!(response.status.is_none());
    assert!(response.obligations.is_empty());
}

#[test]
fn deny_with_redirect_obligation() {
    let rule = Rule::new("redirect", RuleEffect::Deny).with_obligations(vec![
        ObligationExpr::new("redirect_to", Expression::value("198.51.100.1")),
    ]);
    let policy = Policy::new("p", vec![rule], Combiner::FirstApplicableEffect);
    let root = PolicySet::new("root", vec![policy.into()], Combiner::FirstApplicableEffect);

    let response = root.calculate(&Context::empty());
    assert_eq!(response.effect, Effect::Deny);
    assert_eq!(response.obligations.len(), 1);
    assert_eq!(response.obligations[0].id, "redirect_to");
    assert_eq!(
        response.obligations[0].value,
        AttributeValue::String("198.51.100.1".to_string())
    );
}

#[test]
fn indeterminate_propagation_names_rule_and_attribute() {
    let condition = Expression::equal(
        Expression::designator(Attribute::new("x", Type::String)),
        Expression::value("expected"),
    )
    .unwrap();
    let rule = Rule::new("needs-x", RuleEffect::Permit)
        .with_condition(condition)
        .unwrap();
    let policy = Policy::new("p", vec![rule], Combiner::FirstApplicableEffect);
    let root = PolicySet::new("root", vec![policy.into()], Combiner::FirstApplicableEffect);

    let response = root.calculate(&Context::empty());
    assert_eq!(response.effect, Effect::IndeterminateP);

    let status = response.status.expect("status must be set").to_string();
    assert!(status.contains("rule \"needs-x\""), "status: {status}");
    assert!(
        status.contains("missing attribute \"x\" of type \"String\""),
        "status: {status}"
    );
    assert!(status.starts_with("policy set \"root\">"), "status: {status}");
}

#[test]
fn mapper_with_set_of_strings_argument() {
    let rules = vec![
        Rule::new("A", RuleEffect::Permit),
        Rule::new("B", RuleEffect::Deny),
    ];
    let policy = Policy::new(
        "mapped",
        rules,
        Combiner::mapper(MapperParams {
            argument: Expression::designator(Attribute::new("ids", Type::SetOfStrings)),
            default_id: None,
            error_id: None,
            sub: Some(Combiner::FirstApplicableEffect),
        }),
    );
    let root = PolicySet::new("root", vec![policy.into()], Combiner::FirstApplicableEffect);

    let mut ids = StringSet::new();
    ids.insert("B");
    ids.insert("A");
    let ctx = Context::new([("ids", AttributeValue::SetOfStrings(ids))]);

    // Sorted enumeration puts "A" first; first-applicable returns its permit.
    let response = root.calculate(&ctx);
    assert_eq!(response.effect, Effect::Permit);
}

#[test]
fn transactional_update_preserves_old_snapshot() {
    let t0 = Uuid::new_v4();
    let t1 = Uuid::new_v4();

    let child = Policy::new(
        "u",
        vec![Rule::new("r", RuleEffect::Permit)],
        Combiner::FirstApplicableEffect,
    );
    let root = PolicySet::new("root", vec![child.into()], Combiner::FirstApplicableEffect);
    let storage = PolicyStorage::new(root.into(), HashMap::new(), Some(t0));

    let mut update = PolicyUpdate::new(t0, t1);
    update.push(
        UpdateOp::Delete,
        vec!["root".to_string(), "u".to_string()],
        None,
    );

    let mut tx = storage.new_transaction(&t0).unwrap();
    tx.apply(&update).unwrap();
    let updated = tx.commit().unwrap();

    assert_eq!(updated.tag(), Some(t1));
    let new_effect = updated
        .root()
        .unwrap()
        .calculate(&Context::empty())
        .effect;
    assert_eq!(new_effect, Effect::NotApplicable);

    let old_effect = storage
        .root()
        .unwrap()
        .calculate(&Context::empty())
        .effect;
    assert_eq!(old_effect, Effect::Permit);
}

#[test]
fn wire_round_trip_in_64_byte_buffer() {
    let attrs = vec![
        AttributeAssignment::new("x", "hello"),
        AttributeAssignment::new("n", Network::parse("192.0.2.0/24").unwrap()),
    ];

    let mut buf = [0u8; 64];
    let n = wire::marshal_request_to(&mut buf, &attrs).unwrap();
    assert!(n <= 64);

    let parsed = wire::unmarshal_request(&buf[..n]).unwrap();
    assert_eq!(parsed, attrs);
}

#[test]
fn repeated_evaluation_is_pure() {
    let root = simple_tree(RuleEffect::Deny);
    let ctx = Context::new([("q", AttributeValue::String("example".to_string()))]);

    let first = root.calculate(&ctx);
    for _ in 0..10 {
        let again = root.calculate(&ctx);
        assert_eq!(again.effect, first.effect);
        assert_eq!(again.obligations, first.obligations);
        assert_eq!(again.status.is_none(), first.status.is_none());
    }
}

#[test]
fn deny_overrides_law() {
    let rules = vec![
        Rule::new("p1", RuleEffect::Permit),
        Rule::new("d", RuleEffect::Deny).with_obligations(vec![ObligationExpr::new(
            "reason",
            Expression::value("blocked"),
        )]),
        Rule::new("p2", RuleEffect::Permit),
    ];
    let policy = Policy::new("p", rules, Combiner::DenyOverrides);

    let response = policy.calculate(&Context::empty());
    assert_eq!(response.effect, Effect::Deny);
    assert_eq!(response.obligations[0].id, "reason");
}

#[test]
fn first_applicable_effect_law() {
    let rules = vec![
        Rule::new("na", RuleEffect::Deny)
            .with_condition(Expression::value(false))
            .unwrap(),
        Rule::new("hit", RuleEffect::Permit),
        Rule::new("later", RuleEffect::Deny),
    ];
    let policy = Policy::new("p", rules, Combiner::FirstApplicableEffect);
    assert_eq!(policy.calculate(&Context::empty()).effect, Effect::Permit);

    let empty = Policy::new("p", Vec::new(), Combiner::FirstApplicableEffect);
    assert_eq!(
        empty.calculate(&Context::empty()).effect,
        Effect::NotApplicable
    );
}

#[test]
fn mapper_default_on_missing_content_value() {
    // The mapper argument reads a content bundle; a key miss is a
    // missing-value error and must route to the default rule.
    let content_root = ContentNode::string_map([("known", ContentNode::leaf("A"))]);
    let mut store = ContentStore::new();
    store.add(ContentItem::new("routes", content_root));

    let mut cache = SelectorCache::new();
    let selector = cache
        .intern(
            "routes",
            vec![Expression::designator(Attribute::new("key", Type::String))],
            Type::String,
        )
        .unwrap();

    let rules = vec![
        Rule::new("A", RuleEffect::Deny),
        Rule::new("fallback", RuleEffect::Permit),
    ];
    let policy = Policy::new(
        "mapped",
        rules,
        Combiner::mapper(MapperParams {
            argument: Expression::selector(selector),
            default_id: Some("fallback".to_string()),
            error_id: None,
            sub: None,
        }),
    );

    let ctx = Context::new([("key", AttributeValue::String("unknown".to_string()))])
        .with_content(std::sync::Arc::new(store));
    assert_eq!(policy.calculate(&ctx).effect, Effect::Permit);

    let ctx = Context::new([("key", AttributeValue::String("known".to_string()))])
        .with_content(std::sync::Arc::new(
            {
                let mut s = ContentStore::new();
                s.add(ContentItem::new(
                    "routes",
                    ContentNode::string_map([("known", ContentNode::leaf("A"))]),
                ));
                s
            },
        ));
    assert_eq!(policy.calculate(&ctx).effect, Effect::Deny);
}
