mod common;

use chainstore::access::{AccessPort, TriplePattern};
use chainstore::algebra::{AlgebraNode, Slot, StatementPattern};
use chainstore::binding::BindingSet;
use chainstore::construct::{Triple, Value};
use chainstore::error::ChainError;
use chainstore::evaluate::{EvaluationOptions, Evaluator};
use chainstore::store::MemoryStore;
use std::sync::Arc;

use common::{collect, evaluator, ex, rendered, store_with, var};

fn family() -> Arc<MemoryStore> {
    store_with(&[
        ("A", "father", "B"),
        ("B", "father", "C"),
        ("C", "father", "D"),
        ("A", "name", "Alice"),
    ])
}

#[test]
fn results_are_consistent_with_input_bindings() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("x"), ex("father"), var("y"));
    let inputs = vec![
        BindingSet::new().with("x", ex("A")),
        BindingSet::new().with("y", ex("D")),
        BindingSet::new().with("x", ex("B")).with("y", ex("nobody")),
    ];
    let solutions = collect(evaluator.evaluate_pattern(&pattern, inputs.clone()));
    assert_eq!(solutions.len(), 2, "one match for ?x=A and one for ?y=D");
    for solution in &solutions {
        let consistent = inputs.iter().any(|input| {
            input.iter().all(|(variable, value)| solution.get(variable.name()) == value)
        });
        assert!(consistent, "{} rebinds an input variable", solution);
    }
}

#[test]
fn unbound_pattern_binds_every_variable() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("s"), ex("father"), var("o"));
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 3);
    assert!(solutions.iter().all(|s| s.is_bound("s") && s.is_bound("o")));
}

#[test]
fn repeated_variable_must_match_twice() {
    let store = store_with(&[("A", "knows", "A"), ("A", "knows", "B")]);
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("x"), ex("knows"), var("x"));
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 1, "only the reflexive fact matches");
    assert_eq!(solutions[0].get("x"), Some(&ex("A")));
}

#[test]
fn literal_subject_binding_is_skipped() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("x"), var("p"), var("o"));
    let inputs = vec![
        BindingSet::new().with("x", Value::literal("A")),
        BindingSet::new().with("p", Value::literal("father")),
        BindingSet::new().with("x", ex("C")),
    ];
    let solutions = collect(evaluator.evaluate_pattern(&pattern, inputs));
    assert_eq!(solutions.len(), 1, "only the IRI subject yields a lookup");
}

#[test]
fn context_is_bound_only_when_present() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(Triple::new(ex("A"), ex("likes"), ex("B")).in_context(Some(ex("graph1"))))
        .expect("insert");
    store.insert(Triple::new(ex("A"), ex("likes"), ex("C"))).expect("insert");
    let evaluator = evaluator(&store, EvaluationOptions::default());

    let pattern = StatementPattern::new(ex("A"), ex("likes"), var("o")).in_context(var("g"));
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 2);
    let in_graph = solutions.iter().find(|s| s.get("o") == Some(&ex("B"))).expect("B found");
    assert_eq!(in_graph.get("g"), Some(&ex("graph1")));
    let default_graph = solutions.iter().find(|s| s.get("o") == Some(&ex("C"))).expect("C found");
    assert!(!default_graph.contains("g"), "no context, no binding");

    let scoped = StatementPattern::new(ex("A"), ex("likes"), var("o")).in_context(ex("graph1"));
    let solutions = collect(evaluator.evaluate_pattern(&scoped, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 1);
}

#[test]
fn fixed_pattern_filters_its_own_candidates() {
    // the store is empty: matches must come from the candidate list
    let store = Arc::new(MemoryStore::new());
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let candidates = vec![
        Triple::new(ex("A"), ex("type"), ex("Person")),
        Triple::new(ex("B"), ex("type"), ex("Person")),
        Triple::new(ex("B"), ex("type"), ex("Robot")),
    ];
    let pattern = StatementPattern::new(var("x"), ex("type"), var("t")).fixed(candidates);
    let inputs = vec![BindingSet::new().with("t", ex("Person")), BindingSet::new().with("x", ex("B"))];
    let solutions = collect(evaluator.evaluate_pattern(&pattern, inputs));
    assert_eq!(
        rendered(&solutions),
        vec![
            "{?t=<http://example.org/Person>, ?x=<http://example.org/A>}",
            "{?t=<http://example.org/Person>, ?x=<http://example.org/B>}",
            "{?t=<http://example.org/Person>, ?x=<http://example.org/B>}",
            "{?t=<http://example.org/Robot>, ?x=<http://example.org/B>}",
        ]
    );
}

#[test]
fn transitive_pattern_from_bound_subject() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(ex("A"), ex("father"), var("y")).transitive();
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    let mut reached: Vec<String> = solutions.iter().map(|s| s.get("y").expect("bound").to_string()).collect();
    reached.sort();
    assert_eq!(
        reached,
        vec!["<http://example.org/B>", "<http://example.org/C>", "<http://example.org/D>"]
    );
}

#[test]
fn transitive_pattern_from_bound_object() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("x"), ex("father"), ex("D")).transitive();
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 3, "A, B and C are all ancestors of D");
}

#[test]
fn transitive_pattern_with_both_endpoints_tests_reachability() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(var("x"), ex("father"), var("y")).transitive();
    let inputs = vec![
        BindingSet::new().with("x", ex("A")).with("y", ex("D")),
        BindingSet::new().with("x", ex("D")).with("y", ex("A")),
    ];
    let solutions = collect(evaluator.evaluate_pattern(&pattern, inputs));
    assert_eq!(solutions.len(), 1, "D is reachable from A, not the other way round");
}

#[test]
fn transitive_pattern_without_endpoint_is_unsupported() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let node = AlgebraNode::pattern(StatementPattern::new(var("x"), ex("father"), var("y")).transitive());
    let mut solutions = evaluator.evaluate(&node, BindingSet::new());
    match solutions.next() {
        Some(Err(ChainError::UnsupportedPatternShape { .. })) => (),
        other => panic!("expected an unsupported pattern shape, got {:?}", other),
    }
    assert!(solutions.next().is_none(), "the sequence ends after the error");
}

#[test]
fn transitive_pattern_without_resolver_is_unsupported() {
    let store = family();
    let evaluator = Evaluator::new(store.clone(), None, EvaluationOptions::default());
    let pattern = StatementPattern::new(ex("A"), ex("father"), var("y")).transitive();
    let result: Result<Vec<_>, _> = evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]).collect();
    assert!(matches!(result, Err(ChainError::UnsupportedPatternShape { .. })));
}

#[test]
fn constant_slots_are_matched_not_bound() {
    let store = family();
    let evaluator = evaluator(&store, EvaluationOptions::default());
    let pattern = StatementPattern::new(Slot::constant(ex("A")), ex("name"), var("n"));
    let solutions = collect(evaluator.evaluate_pattern(&pattern, vec![BindingSet::new()]));
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].len(), 1, "only ?n is bound");
}

#[test]
fn batched_store_lookup_tags_matches_with_their_pattern() {
    let store = family();
    let by_subject = |name: &str| TriplePattern { subject: Some(ex(name)), ..TriplePattern::default() };
    let patterns = vec![
        by_subject("A"),
        TriplePattern { object: Some(ex("nobody")), ..TriplePattern::default() },
        by_subject("B"),
        by_subject("A"),
    ];
    let batched: Vec<(Triple, usize)> = store
        .lookup_batch(patterns.clone())
        .expect("batch")
        .collect::<Result<_, _>>()
        .expect("pulled");
    for (origin, pattern) in patterns.iter().enumerate() {
        let mut single: Vec<String> = store
            .lookup(pattern)
            .expect("lookup")
            .map(|t| t.expect("pulled").to_string())
            .collect();
        let mut tagged: Vec<String> = batched
            .iter()
            .filter(|(_, tag)| *tag == origin)
            .map(|(t, _)| t.to_string())
            .collect();
        single.sort();
        tagged.sort();
        assert_eq!(tagged, single, "matches for pattern {}", origin);
    }
    assert!(batched.iter().all(|(_, tag)| *tag != 1), "an unmatched pattern yields nothing");
    assert!(batched.iter().any(|(_, tag)| *tag == 3), "a repeated pattern is answered again");
}
