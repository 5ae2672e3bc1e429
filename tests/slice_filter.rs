mod common;

use chainstore::algebra::{AlgebraNode, FilterExpr, Operand, StatementPattern};
use chainstore::binding::BindingSet;
use chainstore::construct::{Triple, Value, Variable};
use chainstore::evaluate::EvaluationOptions;
use chainstore::store::MemoryStore;
use std::sync::Arc;

use common::{collect, evaluator, ex, store_with, var};

fn numbered() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for n in 0..10 {
        store
            .insert(Triple::new(ex(&format!("item{}", n)), ex("rank"), Value::literal(n.to_string())))
            .expect("insert");
    }
    store
}

fn all_ranks() -> AlgebraNode {
    StatementPattern::new(var("item"), ex("rank"), var("rank")).into()
}

#[test]
fn slice_count_follows_offset_and_limit() {
    let store = numbered();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let cases = [
        (None, None, 10),
        (Some(3), None, 7),
        (None, Some(4), 4),
        (Some(8), Some(5), 2),
        (Some(12), Some(5), 0),
        (Some(2), Some(0), 0),
        (Some(10), None, 0),
    ];
    for (offset, limit, expected) in cases {
        let node = AlgebraNode::slice(offset, limit, all_ranks());
        let solutions = collect(evaluator.evaluate(&node, BindingSet::new()));
        assert_eq!(solutions.len(), expected, "offset {:?} limit {:?}", offset, limit);
    }
}

#[test]
fn slice_keeps_child_order() {
    let store = numbered();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let everything = collect(evaluator.evaluate(&all_ranks(), BindingSet::new()));
    let node = AlgebraNode::slice(Some(2), Some(3), all_ranks());
    let sliced = collect(evaluator.evaluate(&node, BindingSet::new()));
    assert_eq!(sliced, everything[2..5].to_vec());
}

#[test]
fn filters_reject_unbound_operands() {
    let store = store_with(&[("A", "knows", "B"), ("B", "knows", "B")]);
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let knows: AlgebraNode = StatementPattern::new(var("x"), ex("knows"), var("y")).into();

    let distinct = AlgebraNode::filter(FilterExpr::NotEqual(Operand::var("x"), Operand::var("y")), knows.clone());
    assert_eq!(collect(evaluator.evaluate(&distinct, BindingSet::new())).len(), 1);

    let unbound = AlgebraNode::filter(FilterExpr::Equal(Operand::var("nope"), Operand::var("y")), knows.clone());
    assert!(collect(evaluator.evaluate(&unbound, BindingSet::new())).is_empty());

    let negated_unbound = AlgebraNode::filter(
        FilterExpr::Equal(Operand::var("nope"), Operand::var("y")).negate(),
        knows.clone(),
    );
    assert!(
        collect(evaluator.evaluate(&negated_unbound, BindingSet::new())).is_empty(),
        "negating an error is still an error"
    );

    let or_true = AlgebraNode::filter(
        FilterExpr::Equal(Operand::var("nope"), Operand::var("y")).or(FilterExpr::IsIri(Operand::var("x"))),
        knows.clone(),
    );
    assert_eq!(collect(evaluator.evaluate(&or_true, BindingSet::new())).len(), 2);

    let not_bound = AlgebraNode::filter(FilterExpr::Bound(Variable::new("nope")).negate(), knows);
    assert_eq!(collect(evaluator.evaluate(&not_bound, BindingSet::new())).len(), 2);
}

#[test]
fn regex_filter_matches_lexical_form() {
    let store = Arc::new(MemoryStore::new());
    for (who, name) in [("A", "Alice"), ("B", "Bob"), ("C", "Alfred")] {
        store.insert(Triple::new(ex(who), ex("name"), Value::literal(name))).expect("insert");
    }
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let node = AlgebraNode::filter(
        FilterExpr::regex(Operand::var("n"), "^Al").expect("valid regex"),
        StatementPattern::new(var("x"), ex("name"), var("n")).into(),
    );
    assert_eq!(collect(evaluator.evaluate(&node, BindingSet::new())).len(), 2);
    assert!(FilterExpr::regex(Operand::var("n"), "(").is_err(), "bad regex is a parse error");
}

#[test]
fn null_bindings_are_removed_before_evaluation() {
    let store = store_with(&[("A", "knows", "B")]);
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let mut seed = BindingSet::new().with("x", ex("A"));
    seed.insert_null("y");
    let node: AlgebraNode = StatementPattern::new(var("x"), ex("knows"), var("y")).into();

    let solutions = collect(evaluator.evaluate(&node, seed.clone()));
    assert_eq!(solutions.len(), 1, "?y is free to be bound");
    assert_eq!(solutions[0].get("y"), Some(&ex("B")));

    // below the root nothing is sanitized and the null marker conflicts
    let unsanitized = collect(evaluator.evaluate_node(&node, seed));
    assert!(unsanitized.is_empty());
}

#[test]
fn plan_display_shows_the_tree() {
    let node = AlgebraNode::slice(
        None,
        Some(5),
        AlgebraNode::join(
            StatementPattern::new(var("x"), ex("knows"), var("y")).into(),
            StatementPattern::new(var("y"), ex("age"), var("a")).into(),
        ),
    );
    let plan = node.to_string();
    let lines: Vec<&str> = plan.lines().collect();
    assert_eq!(lines[0], "Slice limit=5");
    assert_eq!(lines[1], "   Join");
    assert!(lines[2].starts_with("      StatementPattern ?x <http://example.org/knows> ?y"));
}
