//! An in-memory triple store implementing every storage seam.
//!
//! Triples are kept once each, in insertion order, and identified by their
//! position. Every term position has an index from term to the set of triple
//! ids holding it, so a lookup is the intersection of the sets for its fixed
//! slots. The store is append-only.
//!
//! Locks are taken per call and per pulled triple, never for the lifetime of a
//! returned sequence, so a writer can commit while a lookup is being consumed.
//! A batched lookup resolves all of its patterns against the indexes under one
//! lock, reusing the intersection for repeated patterns.
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

// since every triple has an id we can use bitsets to "join" the indexes
use roaring::RoaringTreemap;
use tracing::debug;

use crate::access::{
    AccessPort, BatchIter, ClosureResolver, Endpoint, PipelineExecutor, RecordIter, TripleIter, TriplePattern,
    TripleSink,
};
use crate::aggregate;
use crate::construct::{Metadata, OtherHasher, Timestamp, Triple, Value};
use crate::error::Result;
use crate::pipeline::{AggregateOptions, PipelinePlan};

pub type TripleId = u64;

pub const DEFAULT_INTERMEDIATE_LIMIT: usize = 100_000;

#[derive(Debug, Default)]
struct Index {
    index: HashMap<Value, RoaringTreemap, OtherHasher>,
}
impl Index {
    fn insert(&mut self, key: &Value, id: TripleId) {
        self.index.entry(key.clone()).or_default().insert(id);
    }
    fn lookup(&self, key: &Value) -> Option<&RoaringTreemap> {
        self.index.get(key)
    }
}

#[derive(Debug, Default)]
struct Kept {
    triples: Vec<Triple>,
    kept: HashMap<Triple, TripleId, OtherHasher>,
    subjects: Index,
    predicates: Index,
    objects: Index,
    contexts: Index,
}
impl Kept {
    /// Keeps the triple unless an equal one is kept already, returning its id
    /// and whether it was previously kept.
    fn keep(&mut self, triple: Triple) -> (TripleId, bool) {
        let id = self.triples.len() as TripleId;
        match self.kept.entry(triple) {
            Entry::Occupied(e) => (*e.get(), true),
            Entry::Vacant(e) => {
                let triple = e.key().clone();
                e.insert(id);
                self.subjects.insert(triple.subject(), id);
                self.predicates.insert(triple.predicate(), id);
                self.objects.insert(triple.object(), id);
                if let Some(context) = triple.context() {
                    self.contexts.insert(context, id);
                }
                self.triples.push(triple);
                (id, false)
            }
        }
    }

    /// Ids of the triples matching the pattern, or `None` when no slot is fixed.
    fn candidates(&self, pattern: &TriplePattern) -> Option<RoaringTreemap> {
        let slots = [
            (&pattern.subject, &self.subjects),
            (&pattern.predicate, &self.predicates),
            (&pattern.object, &self.objects),
            (&pattern.context, &self.contexts),
        ];
        let mut result: Option<RoaringTreemap> = None;
        for (slot, index) in slots {
            let Some(value) = slot else { continue };
            let ids = match index.lookup(value) {
                Some(ids) => ids,
                None => return Some(RoaringTreemap::new()),
            };
            result = Some(match result.take() {
                Some(mut narrowed) => {
                    narrowed &= ids;
                    narrowed
                }
                None => ids.clone(),
            });
        }
        result
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    kept: RwLock<Kept>,
    intermediate_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { kept: RwLock::new(Kept::default()), intermediate_limit: DEFAULT_INTERMEDIATE_LIMIT }
    }

    /// Caps the distinct outputs of a pipeline run when the caller does not
    /// allow large intermediate results.
    pub fn with_intermediate_limit(mut self, limit: usize) -> Self {
        self.intermediate_limit = limit;
        self
    }

    /// Stores the triple, stamping it with the insertion time unless it
    /// already carries a timestamp. Returns false if it was present already.
    pub fn insert(&self, triple: Triple) -> Result<bool> {
        let (_, previously_kept) = self.kept.write()?.keep(stamped(triple, Timestamp::now()));
        Ok(!previously_kept)
    }

    pub fn extend<I: IntoIterator<Item = Triple>>(&self, triples: I) -> Result<usize> {
        let now = Timestamp::now();
        let mut kept = self.kept.write()?;
        Ok(triples
            .into_iter()
            .map(|t| kept.keep(stamped(t, now)).1)
            .filter(|previously_kept| !previously_kept)
            .count())
    }

    /// Asserts a base fact: derivation level 0, stamped now.
    pub fn assert(&self, subject: Value, predicate: Value, object: Value) -> Result<bool> {
        self.insert(Triple::new(subject, predicate, object).with_metadata(Metadata::asserted(Timestamp::now())))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.kept.read()?.triples.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The stored copy, metadata included.
    pub fn get(&self, triple: &Triple) -> Result<Option<Triple>> {
        let kept = self.kept.read()?;
        Ok(kept.kept.get(triple).map(|id| kept.triples[*id as usize].clone()))
    }

    /// Everything stored, in insertion order.
    pub fn triples(&self) -> Result<Vec<Triple>> {
        Ok(self.kept.read()?.triples.clone())
    }

    fn fetch(&self, id: TripleId) -> Result<Option<Triple>> {
        Ok(self.kept.read()?.triples.get(id as usize).cloned())
    }
}

// unstamped triples get the insertion time, everything else keeps its metadata
fn stamped(triple: Triple, now: Timestamp) -> Triple {
    if triple.timestamp() != Timestamp::MIN {
        return triple;
    }
    let metadata = Metadata::new(triple.derivation_level(), now, triple.metadata().visibility().clone());
    triple.with_metadata(metadata)
}

/// Yields the triples behind a sequence of ids, each tagged with the pattern
/// it answers, taking the read lock once per pull.
struct Cursor<'a> {
    store: &'a MemoryStore,
    ids: Box<dyn Iterator<Item = (TripleId, usize)> + 'a>,
}
impl Iterator for Cursor<'_> {
    type Item = Result<(Triple, usize)>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, origin) = self.ids.next()?;
            match self.store.fetch(id) {
                Ok(Some(triple)) => return Some(Ok((triple, origin))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

type TaggedIds = Box<dyn Iterator<Item = (TripleId, usize)>>;

fn tagged(candidates: Option<RoaringTreemap>, stored: TripleId, origin: usize) -> TaggedIds {
    match candidates {
        Some(ids) => Box::new(ids.into_iter().map(move |id| (id, origin))),
        None => Box::new((0..stored).map(move |id| (id, origin))),
    }
}

impl AccessPort for MemoryStore {
    fn lookup(&self, pattern: &TriplePattern) -> Result<TripleIter<'_>> {
        let kept = self.kept.read()?;
        let ids = tagged(kept.candidates(pattern), kept.triples.len() as TripleId, 0);
        Ok(Box::new(Cursor { store: self, ids }.map(|found| found.map(|(triple, _)| triple))))
    }

    /// Intersects the indexes once per distinct pattern under a single read
    /// lock. The triples themselves are fetched as the sequence is pulled.
    fn lookup_batch(&self, patterns: Vec<TriplePattern>) -> Result<BatchIter<'_>> {
        let kept = self.kept.read()?;
        let stored = kept.triples.len() as TripleId;
        let mut intersected: HashMap<&TriplePattern, Option<RoaringTreemap>, OtherHasher> = HashMap::default();
        let mut ids: Vec<TaggedIds> = Vec::with_capacity(patterns.len());
        for (origin, pattern) in patterns.iter().enumerate() {
            let candidates = intersected.entry(pattern).or_insert_with(|| kept.candidates(pattern)).clone();
            ids.push(tagged(candidates, stored, origin));
        }
        debug!(patterns = patterns.len(), distinct = intersected.len(), "batched index lookup");
        Ok(Box::new(Cursor { store: self, ids: Box::new(ids.into_iter().flatten()) }))
    }

    fn exists(&self, candidate: &Triple) -> Result<bool> {
        let kept = self.kept.read()?;
        if kept.kept.contains_key(candidate) {
            return Ok(true);
        }
        if candidate.context().is_some() {
            return Ok(false);
        }
        let pattern = TriplePattern {
            subject: Some(candidate.subject().clone()),
            predicate: Some(candidate.predicate().clone()),
            object: Some(candidate.object().clone()),
            context: None,
        };
        Ok(kept.candidates(&pattern).is_some_and(|ids| !ids.is_empty()))
    }
}

impl ClosureResolver for MemoryStore {
    fn transitive_closure(&self, endpoint: &Endpoint, predicate: &Value, context: Option<&Value>) -> Result<Vec<Triple>> {
        let (start, forward) = match endpoint {
            Endpoint::Subject(start) => (start, true),
            Endpoint::Object(start) => (start, false),
        };
        let mut reached: HashSet<Value, OtherHasher> = HashSet::default();
        let mut closure = Vec::new();
        let mut frontier = VecDeque::from([start.clone()]);
        while let Some(node) = frontier.pop_front() {
            let step = TriplePattern {
                subject: forward.then(|| node.clone()),
                predicate: Some(predicate.clone()),
                object: (!forward).then(|| node.clone()),
                context: context.cloned(),
            };
            for edge in self.lookup(&step)? {
                let edge = edge?;
                let next = if forward { edge.object() } else { edge.subject() };
                if !reached.insert(next.clone()) {
                    continue;
                }
                let triple = if forward {
                    Triple::new(start.clone(), predicate.clone(), next.clone())
                } else {
                    Triple::new(next.clone(), predicate.clone(), start.clone())
                };
                closure.push(triple.in_context(context.cloned()));
                frontier.push_back(next.clone());
            }
        }
        debug!(start = %start, predicate = %predicate, reached = closure.len(), "transitive closure");
        Ok(closure)
    }
}

impl TripleSink for MemoryStore {
    fn insert_batch(&self, triples: &[Triple]) -> Result<usize> {
        let now = Timestamp::now();
        let mut kept = self.kept.write()?;
        Ok(triples
            .iter()
            .map(|t| kept.keep(stamped(t.clone(), now)).1)
            .filter(|previously_kept| !previously_kept)
            .count())
    }
}

impl PipelineExecutor for MemoryStore {
    fn aggregate<'a>(&'a self, plan: &'a PipelinePlan, options: &AggregateOptions) -> Result<RecordIter<'a>> {
        Ok(aggregate::run(self, plan, options, self.intermediate_limit))
    }
}
