#![allow(dead_code)]

use std::sync::Arc;

use chainstore::algebra::Slot;
use chainstore::binding::BindingSet;
use chainstore::config::WriterConfig;
use chainstore::construct::Value;
use chainstore::evaluate::{BindingIter, EvaluationOptions, Evaluator};
use chainstore::store::MemoryStore;

pub fn ex(name: &str) -> Value {
    Value::iri(format!("http://example.org/{}", name))
}

pub fn var(name: &str) -> Slot {
    Slot::var(name)
}

/// A store holding the given (subject, predicate, object) facts, all asserted.
pub fn store_with(facts: &[(&str, &str, &str)]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (s, p, o) in facts {
        store.assert(ex(s), ex(p), ex(o)).expect("assert fact");
    }
    store
}

pub fn evaluator(store: &Arc<MemoryStore>, options: EvaluationOptions) -> Evaluator {
    Evaluator::new(store.clone(), Some(store.clone()), options)
}

pub fn collect(solutions: BindingIter<'_>) -> Vec<BindingSet> {
    solutions.collect::<Result<Vec<_>, _>>().expect("evaluation ok")
}

/// Solutions rendered and sorted, for order-independent comparison.
pub fn rendered(solutions: &[BindingSet]) -> Vec<String> {
    let mut rendered: Vec<String> = solutions.iter().map(|s| s.to_string()).collect();
    rendered.sort();
    rendered
}

/// Small batches and a short idle interval so tests exercise the writer thread.
pub fn quick_writer() -> WriterConfig {
    WriterConfig { batch_size: 2, queue_capacity: 8, flush_interval_ms: 5 }
}
