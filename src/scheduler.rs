//! Forward chaining to a fixpoint.
//!
//! A session runs passes over the rule set. In pass `k` only rows joined from
//! at least one fact of derivation level `k` or above are considered, and each
//! rule skips rows made only of facts older than its previous run. The session
//! ends when a whole pass derives nothing, or when the configured number of
//! passes has been run.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::access::{AccessPort, ClosureResolver, PipelineExecutor, TripleSink};
use crate::algebra::{Rule, RuleId};
use crate::config::EngineConfig;
use crate::construct::{Metadata, OtherHasher, Timestamp, Visibility};
use crate::error::{ChainError, Result};
use crate::evaluate::{EvaluationOptions, Evaluator};
use crate::pipeline::AggregateOptions;
use crate::store::MemoryStore;
use crate::strategy::{ExecutionStrategy, FallbackStrategy, PipelineStrategy};

/// Per rule, the start time of its latest successful run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRecords {
    watermarks: HashMap<RuleId, Timestamp, OtherHasher>,
}
impl ExecutionRecords {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn watermark(&self, rule: &RuleId) -> Option<Timestamp> {
        self.watermarks.get(rule).copied()
    }
    /// Moves the watermark forward; an older timestamp leaves it as is.
    pub fn advance(&mut self, rule: &RuleId, timestamp: Timestamp) {
        self.watermarks
            .entry(rule.clone())
            .and_modify(|watermark| *watermark = (*watermark).max(timestamp))
            .or_insert(timestamp);
    }
    pub fn len(&self) -> usize {
        self.watermarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.watermarks.is_empty()
    }
}

/// Hands out start timestamps from the wall clock that also stamps asserted
/// facts. Ticks never go backwards and never run ahead of that clock, so two
/// runs within one millisecond share a stamp.
#[derive(Debug, Default)]
pub struct SessionClock {
    last: Option<Timestamp>,
}
impl SessionClock {
    pub fn tick(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let tick = self.last.map_or(now, |last| last.max(now));
        self.last = Some(tick);
        tick
    }
}

/// The storage a session works against.
#[derive(Clone)]
pub struct Backend {
    pub access: Arc<dyn AccessPort>,
    pub closure: Option<Arc<dyn ClosureResolver>>,
    pub executor: Option<Arc<dyn PipelineExecutor>>,
    pub sink: Arc<dyn TripleSink>,
}
impl Backend {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            access: store.clone(),
            closure: Some(store.clone()),
            executor: Some(store.clone()),
            sink: store,
        }
    }
}

pub struct FixpointScheduler {
    strategy: ExecutionStrategy,
    records: ExecutionRecords,
    clock: SessionClock,
    visibility: Visibility,
    max_passes: Option<usize>,
}

impl FixpointScheduler {
    pub fn new(strategy: ExecutionStrategy, visibility: Visibility, max_passes: Option<usize>) -> Self {
        Self { strategy, records: ExecutionRecords::new(), clock: SessionClock::default(), visibility, max_passes }
    }

    /// Picks the pipeline when it is enabled and the backend can run plans,
    /// row-by-row evaluation otherwise.
    pub fn from_config(backend: &Backend, config: &EngineConfig) -> Result<Self> {
        let evaluator = Evaluator::new(
            Arc::clone(&backend.access),
            backend.closure.clone(),
            EvaluationOptions::from_config(&config.evaluation),
        );
        let fallback =
            FallbackStrategy::new(evaluator, Arc::clone(&backend.access), Arc::clone(&backend.sink), config.writer.clone());
        let strategy = match (&backend.executor, config.pipeline.enabled) {
            (Some(executor), true) => {
                let options = AggregateOptions {
                    allow_large_intermediate_results: config.pipeline.allow_large_intermediate_results,
                    batch_size: config.pipeline.batch_size,
                };
                ExecutionStrategy::Pipeline(PipelineStrategy::new(
                    Arc::clone(executor),
                    Arc::clone(&backend.access),
                    Arc::clone(&backend.sink),
                    options,
                    &config.writer,
                    Some(fallback),
                )?)
            }
            (None, true) => {
                info!("backend cannot run pipelines, evaluating rules row by row");
                ExecutionStrategy::Fallback(fallback)
            }
            (_, false) => ExecutionStrategy::Fallback(fallback),
        };
        Ok(Self::new(strategy, Visibility::new(config.scheduler.visibility.clone()), config.scheduler.max_passes))
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    pub fn records(&self) -> &ExecutionRecords {
        &self.records
    }

    pub fn used_fallback(&self) -> bool {
        self.strategy.used_fallback()
    }

    /// Runs one rule with caller supplied metadata.
    pub fn execute_rule(&mut self, rule: &Rule, metadata: &Metadata) -> Result<u64> {
        self.strategy
            .execute_rule(rule, metadata, &mut self.records)
            .map_err(|e| ChainError::RuleExecution { rule: rule.id().to_string(), source: Box::new(e) })
    }

    /// Applies the rules until nothing new is derived and returns the total
    /// number of derived facts.
    pub fn run_to_fixpoint(&mut self, rules: &[Rule]) -> Result<u64> {
        let mut total = 0;
        let mut pass: u32 = 0;
        loop {
            if self.max_passes.is_some_and(|max| pass as usize >= max) {
                warn!(passes = pass, derived = total, "stopped before reaching a fixpoint");
                break;
            }
            self.strategy.set_required_level(pass);
            let mut derived = 0;
            for rule in rules {
                let metadata = Metadata::new(pass.saturating_add(1), self.clock.tick(), self.visibility.clone());
                derived += self.execute_rule(rule, &metadata)?;
            }
            total += derived;
            info!(pass, derived, total, "inference pass finished");
            if derived == 0 {
                break;
            }
            pass = pass.saturating_add(1);
        }
        Ok(total)
    }

    /// Flushes pending writes and releases the strategy. Safe to call again.
    pub fn shutdown(&mut self) -> Result<()> {
        self.strategy.shutdown()
    }
}
