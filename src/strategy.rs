//! How a single rule is executed.
//!
//! [`PipelineStrategy`] compiles the rule and lets the backend run it in bulk.
//! When a rule cannot be compiled it hands the rule to its
//! [`FallbackStrategy`], which evaluates the body row by row, and from then on
//! it stops trusting derivation levels for the rest of the session.
//!
//! Both stage new facts into a [`BatchWriter`], skipping any the store already
//! holds, and flush before reporting how many they derived.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::access::{AccessPort, PipelineExecutor, TripleSink};
use crate::algebra::Rule;
use crate::binding::BindingSet;
use crate::config::WriterConfig;
use crate::construct::{Metadata, OtherHasher, Triple};
use crate::error::{ChainError, Result};
use crate::evaluate::Evaluator;
use crate::pipeline::{self, AggregateOptions, TripleDocument};
use crate::scheduler::ExecutionRecords;
use crate::writer::BatchWriter;

pub enum ExecutionStrategy {
    Pipeline(PipelineStrategy),
    Fallback(FallbackStrategy),
}

impl ExecutionStrategy {
    /// Runs the rule once and returns the number of new facts.
    pub fn execute_rule(&mut self, rule: &Rule, metadata: &Metadata, records: &mut ExecutionRecords) -> Result<u64> {
        match self {
            ExecutionStrategy::Pipeline(strategy) => strategy.execute(rule, metadata, records),
            ExecutionStrategy::Fallback(strategy) => strategy.execute(rule, metadata, records),
        }
    }

    /// The derivation level a source must reach for a row to be worth
    /// evaluating. Only the pipeline makes use of it.
    pub fn set_required_level(&mut self, level: u32) {
        if let ExecutionStrategy::Pipeline(strategy) = self {
            strategy.required_level = level;
        }
    }

    /// Whether any rule was evaluated row by row in this session.
    pub fn used_fallback(&self) -> bool {
        match self {
            ExecutionStrategy::Pipeline(strategy) => strategy.used_fallback,
            ExecutionStrategy::Fallback(_) => true,
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self {
            ExecutionStrategy::Pipeline(strategy) => strategy.shutdown(),
            ExecutionStrategy::Fallback(strategy) => strategy.shutdown(),
        }
    }
}

// ------------- Pipeline -------------
pub struct PipelineStrategy {
    executor: Arc<dyn PipelineExecutor>,
    access: Arc<dyn AccessPort>,
    writer: BatchWriter,
    options: AggregateOptions,
    required_level: u32,
    used_fallback: bool,
    fallback: Option<FallbackStrategy>,
}

impl PipelineStrategy {
    pub fn new(
        executor: Arc<dyn PipelineExecutor>,
        access: Arc<dyn AccessPort>,
        sink: Arc<dyn TripleSink>,
        options: AggregateOptions,
        writer_config: &WriterConfig,
        fallback: Option<FallbackStrategy>,
    ) -> Result<Self> {
        Ok(Self {
            executor,
            access,
            writer: BatchWriter::start(sink, writer_config)?,
            options,
            required_level: 0,
            used_fallback: false,
            fallback,
        })
    }

    pub fn required_level(&self) -> u32 {
        self.required_level
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn execute(&mut self, rule: &Rule, metadata: &Metadata, records: &mut ExecutionRecords) -> Result<u64> {
        // levels written by row-at-a-time runs cannot be relied on
        let min_source_level = if self.used_fallback { 0 } else { self.required_level };
        let plan = match pipeline::compile(rule, min_source_level, metadata.timestamp(), records.watermark(rule.id())) {
            Ok(plan) => plan,
            Err(not_expressible) => {
                let Some(fallback) = self.fallback.as_mut() else {
                    return Err(ChainError::PipelineNotExpressible(not_expressible.reason));
                };
                debug!(rule = %rule.id(), reason = %not_expressible, "pipeline not expressible, evaluating row by row");
                self.used_fallback = true;
                return fallback.execute(rule, metadata, records);
            }
        };
        debug!(
            rule = %rule.id(),
            steps = plan.steps.len(),
            min_source_level = ?plan.min_source_level,
            min_source_timestamp = ?plan.min_source_timestamp,
            "running pipeline"
        );

        let mut derived = 0;
        for record in self.executor.aggregate(&plan, &self.options)? {
            let document: TripleDocument = match serde_json::from_value(record?) {
                Ok(document) => document,
                Err(e) => {
                    warn!(rule = %rule.id(), error = %e, "skipping unreadable pipeline record");
                    continue;
                }
            };
            let triple = document.into_triple(metadata.visibility());
            if !triple.is_well_formed() {
                warn!(rule = %rule.id(), triple = %triple, "skipping ill-formed pipeline record");
                continue;
            }
            if self.access.exists(&triple)? {
                continue;
            }
            self.writer.stage(triple)?;
            derived += 1;
        }
        self.writer.flush()?;
        records.advance(rule.id(), metadata.timestamp());
        info!(rule = %rule.id(), derived, "pipeline execution finished");
        Ok(derived)
    }

    /// Shuts down the fallback first, then the writer.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.shutdown()?;
        }
        self.writer.shutdown()?;
        Ok(())
    }
}

// ------------- Fallback -------------
pub struct FallbackStrategy {
    evaluator: Evaluator,
    access: Arc<dyn AccessPort>,
    sink: Arc<dyn TripleSink>,
    writer_config: WriterConfig,
    // started on first use
    writer: Option<BatchWriter>,
}

impl FallbackStrategy {
    pub fn new(evaluator: Evaluator, access: Arc<dyn AccessPort>, sink: Arc<dyn TripleSink>, writer_config: WriterConfig) -> Self {
        Self { evaluator, access, sink, writer_config, writer: None }
    }

    pub fn execute(&mut self, rule: &Rule, metadata: &Metadata, records: &mut ExecutionRecords) -> Result<u64> {
        if self.writer.is_none() {
            self.writer = Some(BatchWriter::start(Arc::clone(&self.sink), &self.writer_config)?);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ChainError::Invariant("fallback writer missing after start".to_owned()))?;

        let mut seen: HashSet<Triple, OtherHasher> = HashSet::default();
        let mut derived = 0;
        for solution in self.evaluator.evaluate(rule.antecedent(), BindingSet::new()) {
            let solution = solution?;
            for template in rule.consequent() {
                let Some(triple) = template.instantiate(&solution) else {
                    continue;
                };
                if seen.contains(&triple) || self.access.exists(&triple)? {
                    continue;
                }
                seen.insert(triple.clone());
                writer.stage(triple.with_metadata(metadata.clone()))?;
                derived += 1;
            }
        }
        writer.flush()?;
        records.advance(rule.id(), metadata.timestamp());
        info!(rule = %rule.id(), derived, "row-by-row execution finished");
        Ok(derived)
    }

    /// Flushes and stops the writer if one was started. Safe to call again.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown()?;
        }
        Ok(())
    }
}
