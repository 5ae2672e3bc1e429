//! The operator tree a query or rule body is made of, plus rules themselves.
//!
//! Trees are immutable once built; evaluating the same tree with different
//! input bindings has no side effects on it.
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::access::TriplePattern;
use crate::binding::BindingSet;
use crate::construct::{Triple, Value, Variable};
use crate::error::{BindingConflict, ChainError, Result};

// ------------- Slot -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Constant(Value),
    Variable(Variable),
}
impl Slot {
    pub fn var(name: impl Into<String>) -> Self {
        Slot::Variable(Variable::new(name))
    }
    pub fn constant(value: Value) -> Self {
        Slot::Constant(value)
    }
    pub fn variable(&self) -> Option<&Variable> {
        match self {
            Slot::Variable(variable) => Some(variable),
            Slot::Constant(_) => None,
        }
    }
    /// The constant, or the variable's current binding.
    pub fn resolve(&self, binding: &BindingSet) -> Option<Value> {
        match self {
            Slot::Constant(value) => Some(value.clone()),
            Slot::Variable(variable) => binding.get(variable.name()).cloned(),
        }
    }
}
impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Constant(value)
    }
}
impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Constant(value) => write!(f, "{}", value),
            Slot::Variable(variable) => write!(f, "{}", variable),
        }
    }
}

// ------------- StatementPattern -------------
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Answered by the access port.
    Ordinary,
    /// Answered from a candidate list computed elsewhere.
    Fixed(Arc<Vec<Triple>>),
    /// Answered by the closure resolver over the predicate.
    Transitive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementPattern {
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
    pub context: Option<Slot>,
    pub kind: PatternKind,
}
impl StatementPattern {
    pub fn new(subject: impl Into<Slot>, predicate: impl Into<Slot>, object: impl Into<Slot>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            context: None,
            kind: PatternKind::Ordinary,
        }
    }
    pub fn in_context(mut self, context: impl Into<Slot>) -> Self {
        self.context = Some(context.into());
        self
    }
    pub fn fixed(mut self, candidates: Vec<Triple>) -> Self {
        self.kind = PatternKind::Fixed(Arc::new(candidates));
        self
    }
    pub fn transitive(mut self) -> Self {
        self.kind = PatternKind::Transitive;
        self
    }
    pub fn is_ordinary(&self) -> bool {
        self.kind == PatternKind::Ordinary
    }

    /// Substitutes the binding into the slots. `None` when a substituted subject
    /// cannot be a subject or a substituted predicate cannot be a predicate.
    pub fn to_triple_pattern(&self, binding: &BindingSet) -> Option<TriplePattern> {
        let subject = self.subject.resolve(binding);
        let predicate = self.predicate.resolve(binding);
        if subject.as_ref().is_some_and(|s| !s.is_resource())
            || predicate.as_ref().is_some_and(|p| !p.is_iri())
        {
            return None;
        }
        Some(TriplePattern {
            subject,
            predicate,
            object: self.object.resolve(binding),
            context: self.context.as_ref().and_then(|c| c.resolve(binding)),
        })
    }

    /// Extends `binding` with the matched triple's components for every variable
    /// slot. Variables bound already must agree with the triple. The context
    /// variable stays unbound when the triple has no context.
    pub fn bind(&self, binding: &BindingSet, triple: &Triple) -> std::result::Result<BindingSet, BindingConflict> {
        let mut extended = binding.clone();
        let slots = [
            (Some(&self.subject), Some(triple.subject())),
            (Some(&self.predicate), Some(triple.predicate())),
            (Some(&self.object), Some(triple.object())),
            (self.context.as_ref(), triple.context()),
        ];
        for (slot, component) in slots {
            if let (Some(Slot::Variable(variable)), Some(component)) = (slot, component) {
                extended.insert(variable, component)?;
            }
        }
        Ok(extended)
    }
}
impl fmt::Display for StatementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " {}", context)?;
        }
        match self.kind {
            PatternKind::Ordinary => Ok(()),
            PatternKind::Fixed(ref candidates) => write!(f, " [fixed: {}]", candidates.len()),
            PatternKind::Transitive => write!(f, " [transitive]"),
        }
    }
}

// ------------- FilterExpr -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Variable(Variable),
    Constant(Value),
}
impl Operand {
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Variable(Variable::new(name))
    }
    fn resolve<'b>(&'b self, binding: &'b BindingSet) -> Option<&'b Value> {
        match self {
            Operand::Variable(variable) => binding.get(variable.name()),
            Operand::Constant(value) => Some(value),
        }
    }
}
impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Constant(value)
    }
}
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(variable) => write!(f, "{}", variable),
            Operand::Constant(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FilterExpr {
    Equal(Operand, Operand),
    NotEqual(Operand, Operand),
    Bound(Variable),
    IsIri(Operand),
    IsLiteral(Operand),
    Regex(Operand, Regex),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}
impl FilterExpr {
    pub fn regex(operand: Operand, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| ChainError::Parse { message: e.to_string() })?;
        Ok(FilterExpr::Regex(operand, regex))
    }
    pub fn and(self, other: FilterExpr) -> Self {
        FilterExpr::And(Box::new(self), Box::new(other))
    }
    pub fn or(self, other: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }
    pub fn negate(self) -> Self {
        FilterExpr::Not(Box::new(self))
    }

    /// Whether a solution passes. An expression that cannot be evaluated, for
    /// example over an unbound variable, rejects it.
    pub fn accepts(&self, binding: &BindingSet) -> bool {
        self.evaluate(binding).unwrap_or(false)
    }

    pub fn contains_regex(&self) -> bool {
        match self {
            FilterExpr::Regex(..) => true,
            FilterExpr::And(a, b) | FilterExpr::Or(a, b) => a.contains_regex() || b.contains_regex(),
            FilterExpr::Not(inner) => inner.contains_regex(),
            _ => false,
        }
    }

    // None is an evaluation error
    fn evaluate(&self, binding: &BindingSet) -> Option<bool> {
        match self {
            FilterExpr::Equal(a, b) => Some(a.resolve(binding)? == b.resolve(binding)?),
            FilterExpr::NotEqual(a, b) => Some(a.resolve(binding)? != b.resolve(binding)?),
            FilterExpr::Bound(variable) => Some(binding.is_bound(variable.name())),
            FilterExpr::IsIri(operand) => Some(operand.resolve(binding)?.is_iri()),
            FilterExpr::IsLiteral(operand) => Some(operand.resolve(binding)?.is_literal()),
            FilterExpr::Regex(operand, regex) => match operand.resolve(binding)? {
                Value::Blank(_) => None,
                value => Some(regex.is_match(value.lexical_form())),
            },
            FilterExpr::And(a, b) => match (a.evaluate(binding), b.evaluate(binding)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            FilterExpr::Or(a, b) => match (a.evaluate(binding), b.evaluate(binding)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            FilterExpr::Not(inner) => inner.evaluate(binding).map(|b| !b),
        }
    }
}
impl PartialEq for FilterExpr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterExpr::Equal(a1, b1), FilterExpr::Equal(a2, b2))
            | (FilterExpr::NotEqual(a1, b1), FilterExpr::NotEqual(a2, b2)) => a1 == a2 && b1 == b2,
            (FilterExpr::Bound(v1), FilterExpr::Bound(v2)) => v1 == v2,
            (FilterExpr::IsIri(o1), FilterExpr::IsIri(o2))
            | (FilterExpr::IsLiteral(o1), FilterExpr::IsLiteral(o2)) => o1 == o2,
            // compiled regexes compare by their source pattern
            (FilterExpr::Regex(o1, r1), FilterExpr::Regex(o2, r2)) => o1 == o2 && r1.as_str() == r2.as_str(),
            (FilterExpr::And(a1, b1), FilterExpr::And(a2, b2))
            | (FilterExpr::Or(a1, b1), FilterExpr::Or(a2, b2)) => a1 == a2 && b1 == b2,
            (FilterExpr::Not(i1), FilterExpr::Not(i2)) => i1 == i2,
            _ => false,
        }
    }
}
impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Equal(a, b) => write!(f, "({} = {})", a, b),
            FilterExpr::NotEqual(a, b) => write!(f, "({} != {})", a, b),
            FilterExpr::Bound(variable) => write!(f, "bound({})", variable),
            FilterExpr::IsIri(operand) => write!(f, "isIRI({})", operand),
            FilterExpr::IsLiteral(operand) => write!(f, "isLiteral({})", operand),
            FilterExpr::Regex(operand, regex) => write!(f, "regex({}, \"{}\")", operand, regex.as_str()),
            FilterExpr::And(a, b) => write!(f, "({} && {})", a, b),
            FilterExpr::Or(a, b) => write!(f, "({} || {})", a, b),
            FilterExpr::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

// ------------- AlgebraNode -------------
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraNode {
    Join(Box<AlgebraNode>, Box<AlgebraNode>),
    Filter(FilterExpr, Box<AlgebraNode>),
    Slice {
        offset: Option<usize>,
        limit: Option<usize>,
        child: Box<AlgebraNode>,
    },
    StatementPattern(StatementPattern),
}
impl AlgebraNode {
    pub fn join(left: AlgebraNode, right: AlgebraNode) -> Self {
        AlgebraNode::Join(Box::new(left), Box::new(right))
    }
    pub fn filter(predicate: FilterExpr, child: AlgebraNode) -> Self {
        AlgebraNode::Filter(predicate, Box::new(child))
    }
    pub fn slice(offset: Option<usize>, limit: Option<usize>, child: AlgebraNode) -> Self {
        AlgebraNode::Slice { offset, limit, child: Box::new(child) }
    }
    pub fn pattern(pattern: StatementPattern) -> Self {
        AlgebraNode::StatementPattern(pattern)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "   ".repeat(depth);
        match self {
            AlgebraNode::Join(left, right) => {
                writeln!(f, "{}Join", indent)?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
            AlgebraNode::Filter(predicate, child) => {
                writeln!(f, "{}Filter {}", indent, predicate)?;
                child.fmt_indented(f, depth + 1)
            }
            AlgebraNode::Slice { offset, limit, child } => {
                write!(f, "{}Slice", indent)?;
                if let Some(offset) = offset {
                    write!(f, " offset={}", offset)?;
                }
                if let Some(limit) = limit {
                    write!(f, " limit={}", limit)?;
                }
                writeln!(f)?;
                child.fmt_indented(f, depth + 1)
            }
            AlgebraNode::StatementPattern(pattern) => writeln!(f, "{}StatementPattern {}", indent, pattern),
        }
    }
}
impl From<StatementPattern> for AlgebraNode {
    fn from(pattern: StatementPattern) -> Self {
        AlgebraNode::StatementPattern(pattern)
    }
}
impl fmt::Display for AlgebraNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

// ------------- Rule -------------
/// One triple of a CONSTRUCT clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripleTemplate {
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
    pub context: Option<Slot>,
}
impl TripleTemplate {
    pub fn new(subject: impl Into<Slot>, predicate: impl Into<Slot>, object: impl Into<Slot>) -> Self {
        Self { subject: subject.into(), predicate: predicate.into(), object: object.into(), context: None }
    }
    pub fn in_context(mut self, context: impl Into<Slot>) -> Self {
        self.context = Some(context.into());
        self
    }
    /// The triple this template produces for one solution, if every slot is
    /// bound and the result is a well formed triple.
    pub fn instantiate(&self, binding: &BindingSet) -> Option<Triple> {
        let context = match &self.context {
            Some(slot) => Some(slot.resolve(binding)?),
            None => None,
        };
        let triple = Triple::new(
            self.subject.resolve(binding)?,
            self.predicate.resolve(binding)?,
            self.object.resolve(binding)?,
        )
        .in_context(context);
        triple.is_well_formed().then_some(triple)
    }
}
impl fmt::Display for TripleTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " {}", context)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(String);
impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
impl From<String> for RuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A CONSTRUCT rule: for every solution of the antecedent, the consequent
/// templates are instantiated into new facts.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    id: RuleId,
    antecedent: AlgebraNode,
    consequent: Vec<TripleTemplate>,
}
impl Rule {
    pub fn new(id: impl Into<RuleId>, antecedent: AlgebraNode, consequent: TripleTemplate) -> Self {
        Self { id: id.into(), antecedent, consequent: vec![consequent] }
    }
    pub fn and_construct(mut self, template: TripleTemplate) -> Self {
        self.consequent.push(template);
        self
    }
    pub fn id(&self) -> &RuleId {
        &self.id
    }
    pub fn antecedent(&self) -> &AlgebraNode {
        &self.antecedent
    }
    pub fn consequent(&self) -> &[TripleTemplate] {
        &self.consequent
    }
}
