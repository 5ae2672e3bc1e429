//! Runs a [`PipelinePlan`] on top of any [`AccessPort`].
//!
//! Rows are streamed through the steps lazily, each row carrying the highest
//! derivation level and the latest timestamp of the facts it was joined from.
//! The distinct stage is the only one that holds state; its size is what the
//! intermediate result limit applies to.
use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::access::{AccessPort, RecordIter};
use crate::algebra::StatementPattern;
use crate::binding::BindingSet;
use crate::construct::{OtherHasher, Timestamp, Triple};
use crate::error::{ChainError, Result};
use crate::pipeline::{AggregateOptions, PipelinePlan, Step, TripleDocument};

type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

#[derive(Debug, Clone)]
struct Row {
    bindings: BindingSet,
    max_level: u32,
    max_timestamp: Timestamp,
}
impl Row {
    fn start() -> Self {
        Self { bindings: BindingSet::new(), max_level: 0, max_timestamp: Timestamp::MIN }
    }
    fn joined(&self, bindings: BindingSet, source: &Triple) -> Self {
        Self {
            bindings,
            max_level: self.max_level.max(source.derivation_level()),
            max_timestamp: self.max_timestamp.max(source.timestamp()),
        }
    }
}

/// Streams the plan's output as [`TripleDocument`] records. When large
/// intermediate results are not allowed, more than `intermediate_limit`
/// distinct outputs end the stream with [`ChainError::BackendQuery`].
pub fn run<'a>(
    access: &'a dyn AccessPort,
    plan: &'a PipelinePlan,
    options: &AggregateOptions,
    intermediate_limit: usize,
) -> RecordIter<'a> {
    let mut rows: RowIter<'a> = Box::new(std::iter::once(Ok(Row::start())));
    for step in &plan.steps {
        rows = match step {
            Step::Match(pattern) | Step::Lookup(pattern) => {
                Box::new(rows.flat_map(move |row| expand(access, pattern, row)))
            }
            Step::Filter(expr) => {
                Box::new(rows.filter(move |row| row.as_ref().map_or(true, |r| expr.accepts(&r.bindings))))
            }
        };
    }
    if let Some(level) = plan.min_source_level {
        rows = Box::new(rows.filter(move |row| row.as_ref().map_or(true, |r| r.max_level >= level)));
    }
    if let Some(watermark) = plan.min_source_timestamp {
        rows = Box::new(rows.filter(move |row| row.as_ref().map_or(true, |r| r.max_timestamp >= watermark)));
    }

    let timestamp = plan.timestamp;
    let documents = rows.flat_map(move |row| -> Vec<Result<(Triple, u32)>> {
        match row {
            Ok(row) => plan
                .templates
                .iter()
                .filter_map(|template| template.instantiate(&row.bindings))
                .map(|triple| Ok((triple, row.max_level + 1)))
                .collect(),
            Err(e) => vec![Err(e)],
        }
    });

    let allow_large = options.allow_large_intermediate_results;
    let mut seen: HashSet<Triple, OtherHasher> = HashSet::default();
    let distinct = plan.distinct;
    let records = documents
        .filter_map(move |document| match document {
            Ok((triple, level)) => {
                if distinct {
                    if !seen.insert(triple.clone()) {
                        return None;
                    }
                    if !allow_large && seen.len() > intermediate_limit {
                        return Some(Err(ChainError::BackendQuery(format!(
                            "more than {} intermediate results and large intermediate results are not allowed",
                            intermediate_limit
                        ))));
                    }
                }
                let record = TripleDocument::from_triple(&triple, level, timestamp);
                Some(serde_json::to_value(record).map_err(ChainError::from))
            }
            Err(e) => Some(Err(e)),
        });

    Box::new(BatchedCursor::new(Box::new(records), options.batch_size, plan))
}

fn expand<'a>(access: &'a dyn AccessPort, pattern: &'a StatementPattern, row: Result<Row>) -> RowIter<'a> {
    let row = match row {
        Ok(row) => row,
        Err(e) => return Box::new(std::iter::once(Err(e))),
    };
    let Some(lookup) = pattern.to_triple_pattern(&row.bindings) else {
        return Box::new(std::iter::empty());
    };
    match access.lookup(&lookup) {
        Ok(matches) => Box::new(matches.filter_map(move |triple| match triple {
            Ok(triple) => pattern
                .bind(&row.bindings, &triple)
                .ok()
                .map(|bindings| Ok(row.joined(bindings, &triple))),
            Err(e) => Some(Err(e)),
        })),
        Err(e) => Box::new(std::iter::once(Err(e))),
    }
}

/// Pulls records from the pipeline `batch_size` at a time.
struct BatchedCursor<'a> {
    inner: RecordIter<'a>,
    buffer: VecDeque<Result<serde_json::Value>>,
    batch_size: usize,
    batches: usize,
    exhausted: bool,
    plan: &'a PipelinePlan,
}
impl<'a> BatchedCursor<'a> {
    fn new(inner: RecordIter<'a>, batch_size: usize, plan: &'a PipelinePlan) -> Self {
        Self {
            inner,
            buffer: VecDeque::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            batches: 0,
            exhausted: false,
            plan,
        }
    }
    fn fill(&mut self) {
        while self.buffer.len() < self.batch_size {
            match self.inner.next() {
                Some(Err(e)) => {
                    self.buffer.push_back(Err(e));
                    self.exhausted = true;
                    break;
                }
                Some(record) => self.buffer.push_back(record),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if !self.buffer.is_empty() {
            self.batches += 1;
            debug!(rule = %self.plan.rule, batch = self.batches, records = self.buffer.len(), "pipeline batch");
        }
    }
}
impl Iterator for BatchedCursor<'_> {
    type Item = Result<serde_json::Value>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        self.buffer.pop_front()
    }
}
