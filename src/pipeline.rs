//! Compilation of a rule into a bulk pipeline the backend can run on its own.
//!
//! A plan is an ordered list of steps over rows of bindings. Each row also
//! remembers the highest derivation level and the latest timestamp among the
//! facts it was joined from; the two guards prune rows on those. Compilation is
//! all or nothing: a rule with any part the steps cannot express is reported as
//! [`NotExpressible`] and left to row-at-a-time evaluation.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algebra::{AlgebraNode, FilterExpr, PatternKind, Rule, RuleId, StatementPattern, TripleTemplate};
use crate::construct::{Metadata, Timestamp, Triple, Value, Visibility};

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Seeds the rows from the facts matching a pattern.
    Match(StatementPattern),
    /// Joins every row with the facts matching the pattern under its bindings.
    Lookup(StatementPattern),
    Filter(FilterExpr),
}
impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Match(pattern) => write!(f, "$match {}", pattern),
            Step::Lookup(pattern) => write!(f, "$lookup {}", pattern),
            Step::Filter(expr) => write!(f, "$filter {}", expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    pub rule: RuleId,
    pub steps: Vec<Step>,
    /// Projection of each surviving row.
    pub templates: Vec<TripleTemplate>,
    /// Keep rows with at least one source at this derivation level or above.
    pub min_source_level: Option<u32>,
    /// Keep rows with at least one source stamped at or after this time.
    pub min_source_timestamp: Option<Timestamp>,
    pub distinct: bool,
    /// Stamped on every output.
    pub timestamp: Timestamp,
}

/// Hints passed along with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub allow_large_intermediate_results: bool,
    pub batch_size: usize,
}
impl Default for AggregateOptions {
    fn default() -> Self {
        Self { allow_large_intermediate_results: true, batch_size: 1000 }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct NotExpressible {
    pub reason: String,
}
impl NotExpressible {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Compiles `rule` into a plan. A `min_source_level` of 0 and an absent
/// `watermark` add no guard. The same inputs always give the same plan.
pub fn compile(
    rule: &Rule,
    min_source_level: u32,
    timestamp: Timestamp,
    watermark: Option<Timestamp>,
) -> Result<PipelinePlan, NotExpressible> {
    let mut steps = Vec::new();
    rewrite(rule.antecedent(), &mut steps)?;
    Ok(PipelinePlan {
        rule: rule.id().clone(),
        steps,
        templates: rule.consequent().to_vec(),
        min_source_level: (min_source_level > 0).then_some(min_source_level),
        min_source_timestamp: watermark,
        distinct: true,
        timestamp,
    })
}

fn rewrite(node: &AlgebraNode, steps: &mut Vec<Step>) -> Result<(), NotExpressible> {
    match node {
        AlgebraNode::StatementPattern(pattern) => match pattern.kind {
            PatternKind::Ordinary if steps.is_empty() => steps.push(Step::Match(pattern.clone())),
            PatternKind::Ordinary => steps.push(Step::Lookup(pattern.clone())),
            PatternKind::Fixed(_) => return Err(NotExpressible::new(format!("fixed pattern {}", pattern))),
            PatternKind::Transitive => return Err(NotExpressible::new(format!("transitive pattern {}", pattern))),
        },
        AlgebraNode::Join(left, right) => {
            rewrite(left, steps)?;
            rewrite(right, steps)?;
        }
        AlgebraNode::Filter(expr, child) => {
            if expr.contains_regex() {
                return Err(NotExpressible::new(format!("regular expression in filter {}", expr)));
            }
            rewrite(child, steps)?;
            steps.push(Step::Filter(expr.clone()));
        }
        AlgebraNode::Slice { .. } => return Err(NotExpressible::new("slice")),
    }
    Ok(())
}

/// One output record of a pipeline run, as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleDocument {
    pub subject: Value,
    pub predicate: Value,
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub derivation_level: u32,
    pub timestamp: Timestamp,
}
impl TripleDocument {
    pub fn from_triple(triple: &Triple, derivation_level: u32, timestamp: Timestamp) -> Self {
        Self {
            subject: triple.subject().clone(),
            predicate: triple.predicate().clone(),
            object: triple.object().clone(),
            context: triple.context().cloned(),
            derivation_level,
            timestamp,
        }
    }
    pub fn into_triple(self, visibility: &Visibility) -> Triple {
        Triple::new(self.subject, self.predicate, self.object)
            .in_context(self.context)
            .with_metadata(Metadata::new(self.derivation_level, self.timestamp, visibility.clone()))
    }
}
