//! Row-at-a-time evaluation of operator trees.
//!
//! [`Evaluator::evaluate`] turns an [`AlgebraNode`] and the bindings known so
//! far into a lazy sequence of solutions. Joins whose right side is a direct
//! lookup are batched: the left side is consumed in chunks and each chunk is
//! answered by a single [`AccessPort::lookup_batch`] call. Any other right side
//! is evaluated once per left solution.
//!
//! The first error ends a sequence; nothing is yielded after it.
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::access::{AccessPort, ClosureResolver, Endpoint};
use crate::algebra::{AlgebraNode, FilterExpr, PatternKind, StatementPattern};
use crate::binding::BindingSet;
use crate::config::EvaluationConfig;
use crate::construct::{OtherHasher, Triple, Value};
use crate::error::{ChainError, Result};

pub type BindingIter<'a> = Box<dyn Iterator<Item = Result<BindingSet>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    pub performant: bool,
    pub display_query_plan: bool,
    pub join_batch_size: usize,
}
impl Default for EvaluationOptions {
    fn default() -> Self {
        Self { performant: true, display_query_plan: false, join_batch_size: 1000 }
    }
}
impl EvaluationOptions {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        // TODO: fan joins out over a worker pool once lookups can be issued concurrently
        if config.num_threads > 1 {
            warn!(requested = config.num_threads, "parallel evaluation is not available, using a single worker");
        }
        Self {
            performant: config.performant,
            display_query_plan: config.display_query_plan,
            join_batch_size: config.join_batch_size.max(1),
        }
    }
}

pub struct Evaluator {
    access: Arc<dyn AccessPort>,
    closure: Option<Arc<dyn ClosureResolver>>,
    options: EvaluationOptions,
}

impl Evaluator {
    pub fn new(
        access: Arc<dyn AccessPort>,
        closure: Option<Arc<dyn ClosureResolver>>,
        options: EvaluationOptions,
    ) -> Self {
        Self { access, closure, options }
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Entry point for a whole query. Variables bound to "no value" in
    /// `binding` are dropped first so that patterns are free to bind them.
    pub fn evaluate<'a>(&'a self, node: &'a AlgebraNode, binding: BindingSet) -> BindingIter<'a> {
        if self.options.display_query_plan {
            info!(bindings = %binding, "query plan:\n{}", node);
        }
        Box::new(UntilError::new(self.evaluate_node(node, binding.sanitized())))
    }

    /// Evaluates a subtree under the given bindings.
    pub fn evaluate_node<'a>(&'a self, node: &'a AlgebraNode, binding: BindingSet) -> BindingIter<'a> {
        match node {
            AlgebraNode::StatementPattern(pattern) => self.evaluate_pattern(pattern, vec![binding]),
            AlgebraNode::Filter(predicate, child) => filtered(self.evaluate_node(child, binding), predicate),
            AlgebraNode::Slice { offset, limit, child } => Box::new(Slice {
                inner: self.evaluate_node(child, binding),
                skip: offset.unwrap_or(0),
                remaining: *limit,
            }),
            AlgebraNode::Join(left, right) => self.evaluate_join(left, right, binding),
        }
    }

    fn evaluate_join<'a>(&'a self, left: &'a AlgebraNode, right: &'a AlgebraNode, binding: BindingSet) -> BindingIter<'a> {
        if !self.options.performant {
            return self.pairwise_join(left, right, binding);
        }
        match right {
            AlgebraNode::StatementPattern(pattern) => self.batched_join(self.evaluate_node(left, binding), pattern),
            AlgebraNode::Filter(predicate, inner) => match inner.as_ref() {
                AlgebraNode::StatementPattern(pattern) => {
                    filtered(self.batched_join(self.evaluate_node(left, binding), pattern), predicate)
                }
                AlgebraNode::Join(first, second) => match (first.as_ref(), second.as_ref()) {
                    (AlgebraNode::StatementPattern(first), AlgebraNode::StatementPattern(second)) => {
                        let outer = self.batched_join(self.evaluate_node(left, binding), first);
                        filtered(self.batched_join(outer, second), predicate)
                    }
                    _ => self.pairwise_join(left, right, binding),
                },
                _ => self.pairwise_join(left, right, binding),
            },
            _ => self.pairwise_join(left, right, binding),
        }
    }

    /// Evaluates `right` once for every solution of `left`.
    fn pairwise_join<'a>(&'a self, left: &'a AlgebraNode, right: &'a AlgebraNode, binding: BindingSet) -> BindingIter<'a> {
        Box::new(self.evaluate_node(left, binding).flat_map(move |solution| match solution {
            Ok(solution) => self.evaluate_node(right, solution),
            Err(e) => Box::new(std::iter::once(Err(e))) as BindingIter<'a>,
        }))
    }

    fn batched_join<'a>(&'a self, left: BindingIter<'a>, pattern: &'a StatementPattern) -> BindingIter<'a> {
        let chunks = Chunks { inner: left, size: self.options.join_batch_size };
        Box::new(chunks.flat_map(move |chunk| match chunk {
            Ok(chunk) => self.evaluate_pattern(pattern, chunk),
            Err(e) => Box::new(std::iter::once(Err(e))) as BindingIter<'a>,
        }))
    }

    /// Resolves one pattern for a whole batch of incoming bindings. Bindings
    /// whose substituted subject or predicate cannot occupy that position are
    /// skipped.
    pub fn evaluate_pattern<'a>(&'a self, pattern: &'a StatementPattern, bindings: Vec<BindingSet>) -> BindingIter<'a> {
        match &pattern.kind {
            PatternKind::Ordinary => self.lookup_pattern(pattern, bindings),
            PatternKind::Fixed(candidates) => Box::new(bindings.into_iter().flat_map(move |binding| {
                let matches: Vec<Result<BindingSet>> = match pattern.to_triple_pattern(&binding) {
                    Some(lookup) => candidates
                        .iter()
                        .filter(|triple| lookup.matches(triple))
                        .filter_map(|triple| pattern.bind(&binding, triple).ok())
                        .map(Ok)
                        .collect(),
                    None => Vec::new(),
                };
                matches
            })),
            PatternKind::Transitive => {
                let mut closures = ClosureCache::default();
                Box::new(bindings.into_iter().flat_map(move |binding| {
                    match self.transitive_matches(pattern, &binding, &mut closures) {
                        Ok(triples) => triples
                            .iter()
                            .filter_map(|triple| pattern.bind(&binding, triple).ok())
                            .map(Ok)
                            .collect::<Vec<_>>(),
                        Err(e) => vec![Err(e)],
                    }
                }))
            }
        }
    }

    fn lookup_pattern<'a>(&'a self, pattern: &'a StatementPattern, bindings: Vec<BindingSet>) -> BindingIter<'a> {
        let mut origins = Vec::with_capacity(bindings.len());
        let mut lookups = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if let Some(lookup) = pattern.to_triple_pattern(&binding) {
                lookups.push(lookup);
                origins.push(binding);
            }
        }
        if lookups.is_empty() {
            return Box::new(std::iter::empty());
        }
        debug!(pattern = %pattern, batch = lookups.len(), "batched lookup");
        match self.access.lookup_batch(lookups) {
            Ok(matches) => Box::new(matches.filter_map(move |matched| match matched {
                Ok((triple, origin)) => {
                    let binding = origins.get(origin)?;
                    pattern.bind(binding, &triple).ok().map(Ok)
                }
                Err(e) => Some(Err(e)),
            })),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    /// The closure triples matching the pattern under `binding`, computed from
    /// the subject when it is bound and from the object otherwise.
    fn transitive_matches(
        &self,
        pattern: &StatementPattern,
        binding: &BindingSet,
        closures: &mut ClosureCache,
    ) -> Result<Vec<Triple>> {
        let unsupported = || ChainError::UnsupportedPatternShape { pattern: pattern.to_string() };
        let resolver = self.closure.as_ref().ok_or_else(unsupported)?;
        let Some(lookup) = pattern.to_triple_pattern(binding) else {
            return Ok(Vec::new());
        };
        let predicate = lookup.predicate.clone().ok_or_else(unsupported)?;
        let endpoint = match (&lookup.subject, &lookup.object) {
            (Some(subject), _) => Endpoint::Subject(subject.clone()),
            (None, Some(object)) => Endpoint::Object(object.clone()),
            (None, None) => return Err(unsupported()),
        };
        let key = (endpoint, predicate, lookup.context.clone());
        let closure = match closures.get(&key) {
            Some(closure) => Rc::clone(closure),
            None => {
                let closure = Rc::new(resolver.transitive_closure(&key.0, &key.1, key.2.as_ref())?);
                closures.insert(key, Rc::clone(&closure));
                closure
            }
        };
        Ok(closure.iter().filter(|triple| lookup.matches(triple)).cloned().collect())
    }
}

type ClosureCache = HashMap<(Endpoint, Value, Option<Value>), Rc<Vec<Triple>>, OtherHasher>;

fn filtered<'a>(inner: BindingIter<'a>, predicate: &'a FilterExpr) -> BindingIter<'a> {
    Box::new(inner.filter(move |solution| solution.as_ref().map_or(true, |s| predicate.accepts(s))))
}

/// Groups solutions into batches of at most `size`.
struct Chunks<'a> {
    inner: BindingIter<'a>,
    size: usize,
}
impl Iterator for Chunks<'_> {
    type Item = Result<Vec<BindingSet>>;
    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = Vec::with_capacity(self.size);
        while chunk.len() < self.size {
            match self.inner.next() {
                Some(Ok(solution)) => chunk.push(solution),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        (!chunk.is_empty()).then_some(Ok(chunk))
    }
}

/// Offset then limit, with errors passed through rather than counted.
struct Slice<'a> {
    inner: BindingIter<'a>,
    skip: usize,
    remaining: Option<usize>,
}
impl Iterator for Slice<'_> {
    type Item = Result<BindingSet>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            match self.inner.next()? {
                Err(e) => return Some(Err(e)),
                Ok(_) if self.skip > 0 => self.skip -= 1,
                Ok(solution) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(solution));
                }
            }
        }
    }
}

/// Ends the sequence after its first error.
struct UntilError<'a> {
    inner: BindingIter<'a>,
    failed: bool,
}
impl<'a> UntilError<'a> {
    fn new(inner: BindingIter<'a>) -> Self {
        Self { inner, failed: false }
    }
}
impl Iterator for UntilError<'_> {
    type Item = Result<BindingSet>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        self.failed = item.is_err();
        Some(item)
    }
}
