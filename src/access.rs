//! The seams to the storage layer.
//!
//! Everything below the evaluator is reached through these traits: lookups by
//! pattern ([`AccessPort`]), transitive closures ([`ClosureResolver`]), durable
//! writes ([`TripleSink`]) and whole-plan execution ([`PipelineExecutor`]).
//! [`crate::store::MemoryStore`] implements all of them in memory.
use std::fmt;

use crate::construct::{Triple, Value};
use crate::error::Result;
use crate::pipeline::{AggregateOptions, PipelinePlan};

pub type TripleIter<'a> = Box<dyn Iterator<Item = Result<Triple>> + 'a>;
/// Matches of a batched lookup, tagged with the index of the pattern they answer.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<(Triple, usize)>> + 'a>;
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<serde_json::Value>> + 'a>;

/// A lookup with every slot either fixed or open. An open context matches
/// triples in any context, including none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Option<Value>,
    pub predicate: Option<Value>,
    pub object: Option<Value>,
    pub context: Option<Value>,
}
impl TriplePattern {
    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.as_ref().is_none_or(|s| s == triple.subject())
            && self.predicate.as_ref().is_none_or(|p| p == triple.predicate())
            && self.object.as_ref().is_none_or(|o| o == triple.object())
            && self.context.as_ref().is_none_or(|c| Some(c) == triple.context())
    }
}
impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = [&self.subject, &self.predicate, &self.object, &self.context];
        for (i, slot) in slots.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match slot {
                Some(value) => write!(f, "{}", value)?,
                None => write!(f, "*")?,
            }
        }
        Ok(())
    }
}

pub trait AccessPort: Send + Sync {
    fn lookup(&self, pattern: &TriplePattern) -> Result<TripleIter<'_>>;

    /// Answers many patterns in one call. The default issues one lookup per
    /// pattern as the sequence is pulled; backends that can do better override it.
    fn lookup_batch(&self, patterns: Vec<TriplePattern>) -> Result<BatchIter<'_>> {
        Ok(Box::new(patterns.into_iter().enumerate().flat_map(move |(index, pattern)| {
            match self.lookup(&pattern) {
                Ok(matches) => Box::new(matches.map(move |triple| triple.map(|t| (t, index)))) as BatchIter<'_>,
                Err(e) => Box::new(std::iter::once(Err(e))) as BatchIter<'_>,
            }
        })))
    }

    /// Whether the candidate is stored. A candidate without context matches
    /// the same statement in any context.
    fn exists(&self, candidate: &Triple) -> Result<bool>;
}

/// The bound end a transitive closure is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Subject(Value),
    Object(Value),
}

pub trait ClosureResolver: Send + Sync {
    /// Every triple `(start, predicate, reached)` (or `(reached, predicate, start)`
    /// for an object endpoint) where `reached` is connected to the endpoint by a
    /// path of one or more `predicate` edges.
    fn transitive_closure(
        &self,
        endpoint: &Endpoint,
        predicate: &Value,
        context: Option<&Value>,
    ) -> Result<Vec<Triple>>;
}

pub trait TripleSink: Send + Sync {
    /// Stores the batch and returns how many were new. Triples already present
    /// are not an error.
    fn insert_batch(&self, triples: &[Triple]) -> Result<usize>;
}

pub trait PipelineExecutor: Send + Sync {
    /// Runs a compiled plan, yielding one JSON record per output triple.
    fn aggregate<'a>(&'a self, plan: &'a PipelinePlan, options: &AggregateOptions) -> Result<RecordIter<'a>>;
}
