//! Variable bindings flowing through query evaluation.
//!
//! A [`BindingSet`] maps variables to values. A variable may also be present
//! but bound to "no value" (see [`BindingSet::insert_null`]); such entries are
//! stripped by [`BindingSet::sanitized`] before a query starts, since they would
//! otherwise conflict with every concrete value a pattern tries to bind.
use std::collections::HashMap;
use std::fmt;

use crate::construct::{OtherHasher, Value, Variable};
use crate::error::BindingConflict;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    bindings: HashMap<Variable, Option<Value>, OtherHasher>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used mostly by callers seeding an evaluation.
    pub fn with(mut self, variable: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(Variable::new(variable), Some(value));
        self
    }

    /// The bound value, or `None` when the variable is absent or bound to "no value".
    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.bindings.get(variable).and_then(Option::as_ref)
    }

    pub fn is_bound(&self, variable: &str) -> bool {
        self.get(variable).is_some()
    }

    /// True also for variables bound to "no value".
    pub fn contains(&self, variable: &str) -> bool {
        self.bindings.contains_key(variable)
    }

    /// Binds `variable` unless it already holds a different value.
    pub fn insert(&mut self, variable: &Variable, value: &Value) -> Result<(), BindingConflict> {
        match self.bindings.get(variable) {
            Some(Some(existing)) if existing == value => Ok(()),
            Some(_) => Err(BindingConflict { variable: variable.name().to_owned() }),
            None => {
                self.bindings.insert(variable.clone(), Some(value.clone()));
                Ok(())
            }
        }
    }

    pub fn insert_null(&mut self, variable: impl Into<String>) {
        self.bindings.insert(Variable::new(variable), None);
    }

    /// Union of both sets, provided they agree on every shared variable.
    pub fn merge(&self, other: &BindingSet) -> Result<BindingSet, BindingConflict> {
        let mut merged = self.clone();
        for (variable, value) in &other.bindings {
            match merged.bindings.get(variable) {
                Some(existing) if existing != value => {
                    return Err(BindingConflict { variable: variable.name().to_owned() });
                }
                Some(_) => (),
                None => {
                    merged.bindings.insert(variable.clone(), value.clone());
                }
            }
        }
        Ok(merged)
    }

    /// A copy without the variables bound to "no value".
    pub fn sanitized(&self) -> BindingSet {
        BindingSet {
            bindings: self
                .bindings
                .iter()
                .filter(|(_, value)| value.is_some())
                .map(|(variable, value)| (variable.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Option<&Value>)> {
        self.bindings.iter().map(|(variable, value)| (variable, value.as_ref()))
    }
}

impl FromIterator<(Variable, Value)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (Variable, Value)>>(iter: I) -> Self {
        BindingSet {
            bindings: iter.into_iter().map(|(variable, value)| (variable, Some(value))).collect(),
        }
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.bindings.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{")?;
        for (i, (variable, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Some(value) => write!(f, "{}={}", variable, value)?,
                None => write!(f, "{}=UNDEF", variable)?,
            }
        }
        write!(f, "}}")
    }
}
