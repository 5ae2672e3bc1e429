mod common;

use chainstore::algebra::{AlgebraNode, FilterExpr, Operand, Rule, StatementPattern, TripleTemplate};
use chainstore::construct::{Timestamp, Triple, Visibility};
use chainstore::pipeline::{self, Step, TripleDocument};

use common::{ex, var};

fn grandfather() -> Rule {
    Rule::new(
        "grandfather",
        AlgebraNode::join(
            StatementPattern::new(var("x"), ex("father"), var("z")).into(),
            StatementPattern::new(var("z"), ex("father"), var("y")).into(),
        ),
        TripleTemplate::new(var("x"), ex("grandfather"), var("y")),
    )
}

fn with_body(body: AlgebraNode) -> Rule {
    Rule::new("r", body, TripleTemplate::new(var("x"), ex("p"), var("y")))
}

#[test]
fn join_becomes_match_then_lookup() {
    let plan = pipeline::compile(&grandfather(), 0, Timestamp::from_millis(10), None).expect("expressible");
    assert_eq!(plan.steps.len(), 2);
    assert!(matches!(plan.steps[0], Step::Match(_)));
    assert!(matches!(plan.steps[1], Step::Lookup(_)));
    assert!(plan.distinct, "outputs are always distinct");
    assert_eq!(plan.templates, grandfather().consequent().to_vec());
    assert_eq!(plan.timestamp, Timestamp::from_millis(10));
}

#[test]
fn level_zero_adds_no_level_guard() {
    let plan = pipeline::compile(&grandfather(), 0, Timestamp::from_millis(10), None).expect("expressible");
    assert_eq!(plan.min_source_level, None);
    assert_eq!(plan.min_source_timestamp, None, "no watermark, no timestamp guard");

    let plan = pipeline::compile(&grandfather(), 3, Timestamp::from_millis(10), Some(Timestamp::from_millis(7)))
        .expect("expressible");
    assert_eq!(plan.min_source_level, Some(3));
    assert_eq!(plan.min_source_timestamp, Some(Timestamp::from_millis(7)));
}

#[test]
fn compilation_is_deterministic() {
    let watermark = Some(Timestamp::from_millis(5));
    let first = pipeline::compile(&grandfather(), 2, Timestamp::from_millis(9), watermark).expect("expressible");
    let second = pipeline::compile(&grandfather(), 2, Timestamp::from_millis(9), watermark).expect("expressible");
    assert_eq!(first, second);
}

#[test]
fn filter_follows_its_child() {
    let body = AlgebraNode::filter(
        FilterExpr::NotEqual(Operand::var("x"), Operand::var("y")),
        StatementPattern::new(var("x"), ex("knows"), var("y")).into(),
    );
    let plan = pipeline::compile(&with_body(body), 0, Timestamp::from_millis(1), None).expect("expressible");
    assert!(matches!(plan.steps[0], Step::Match(_)));
    assert!(matches!(plan.steps[1], Step::Filter(_)));
}

#[test]
fn unsupported_operators_are_not_expressible() {
    let knows = || -> AlgebraNode { StatementPattern::new(var("x"), ex("knows"), var("y")).into() };
    let bodies = vec![
        AlgebraNode::slice(None, Some(10), knows()),
        AlgebraNode::join(knows(), StatementPattern::new(var("y"), ex("knows"), var("z")).transitive().into()),
        AlgebraNode::pattern(
            StatementPattern::new(var("x"), ex("knows"), var("y"))
                .fixed(vec![Triple::new(ex("A"), ex("knows"), ex("B"))]),
        ),
        AlgebraNode::filter(FilterExpr::regex(Operand::var("y"), "^B").expect("valid regex"), knows()),
        AlgebraNode::filter(
            FilterExpr::IsIri(Operand::var("x")).and(FilterExpr::regex(Operand::var("y"), "B$").expect("valid regex")),
            knows(),
        ),
    ];
    for body in bodies {
        let outcome = pipeline::compile(&with_body(body.clone()), 0, Timestamp::from_millis(1), None);
        assert!(outcome.is_err(), "should not compile:\n{}", body);
    }
}

#[test]
fn documents_carry_level_and_timestamp() {
    let triple = Triple::new(ex("A"), ex("grandfather"), ex("C"));
    let document = TripleDocument::from_triple(&triple, 2, Timestamp::from_millis(42));
    let json = serde_json::to_value(&document).expect("serialize");
    assert_eq!(json["derivation_level"].as_u64(), Some(2));
    assert!(json.get("context").is_none(), "absent context is left out");

    let back: TripleDocument = serde_json::from_value(json).expect("deserialize");
    let stored = back.into_triple(&Visibility::new("public"));
    assert_eq!(stored, triple);
    assert_eq!(stored.derivation_level(), 2);
    assert_eq!(stored.timestamp(), Timestamp::from_millis(42));
    assert_eq!(stored.metadata().visibility().as_str(), "public");
}
