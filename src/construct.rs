// used to keep the internal maps fast, same as for any map where keys are not ids
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// triples hash on their terms only, variables borrow as plain names
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// used to print out readable forms of a construct
use std::fmt;

// terms are parsed from their textual form with regular expressions
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref IRI: Regex = Regex::new(r#"^<([^<>"\s]*)>$"#).unwrap();
    static ref BLANK: Regex = Regex::new(r"^_:([A-Za-z0-9_][A-Za-z0-9_.\-]*)$").unwrap();
    static ref LITERAL: Regex = Regex::new(
        r#"^"((?:[^"\\]|\\.)*)"(?:@([A-Za-z]+(?:-[A-Za-z0-9]+)*)|\^\^<([^<>"\s]*)>)?$"#
    )
    .unwrap();
}

// ------------- Value -------------
/// An RDF term. Equality is identity of the term, nothing is normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}
impl Value {
    pub fn iri(iri: impl Into<String>) -> Self {
        Value::Iri(iri.into())
    }
    pub fn blank(label: impl Into<String>) -> Self {
        Value::Blank(label.into())
    }
    pub fn literal(lexical: impl Into<String>) -> Self {
        Value::Literal { lexical: lexical.into(), datatype: None, language: None }
    }
    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Value::Literal { lexical: lexical.into(), datatype: Some(datatype.into()), language: None }
    }
    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Value::Literal { lexical: lexical.into(), datatype: None, language: Some(language.into()) }
    }
    /// May appear in subject (or context) position.
    pub fn is_resource(&self) -> bool {
        matches!(self, Value::Iri(_) | Value::Blank(_))
    }
    /// May appear in predicate position.
    pub fn is_iri(&self) -> bool {
        matches!(self, Value::Iri(_))
    }
    pub fn is_literal(&self) -> bool {
        matches!(self, Value::Literal { .. })
    }
    /// The string a regular expression is matched against.
    pub fn lexical_form(&self) -> &str {
        match self {
            Value::Iri(iri) => iri,
            Value::Blank(label) => label,
            Value::Literal { lexical, .. } => lexical,
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Iri(iri) => write!(f, "<{}>", iri),
            Value::Blank(label) => write!(f, "_:{}", label),
            Value::Literal { lexical, datatype, language } => {
                let escaped = lexical.replace('\\', "\\\\").replace('"', "\\\"");
                match (datatype, language) {
                    (_, Some(language)) => write!(f, "\"{}\"@{}", escaped, language),
                    (Some(datatype), None) => write!(f, "\"{}\"^^<{}>", escaped, datatype),
                    (None, None) => write!(f, "\"{}\"", escaped),
                }
            }
        }
    }
}
impl FromStr for Value {
    type Err = ChainError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(captures) = IRI.captures(s) {
            return Ok(Value::Iri(captures[1].to_owned()));
        }
        if let Some(captures) = BLANK.captures(s) {
            return Ok(Value::Blank(captures[1].to_owned()));
        }
        if let Some(captures) = LITERAL.captures(s) {
            let lexical = captures[1].replace("\\\"", "\"").replace("\\\\", "\\");
            return Ok(Value::Literal {
                lexical,
                datatype: captures.get(3).map(|m| m.as_str().to_owned()),
                language: captures.get(2).map(|m| m.as_str().to_owned()),
            });
        }
        Err(ChainError::Parse { message: format!("not an RDF term: {}", s) })
    }
}

// ------------- Variable -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);
impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn name(&self) -> &str {
        &self.0
    }
}
impl Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

// ------------- Timestamp -------------
/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);
impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }
    pub fn millis(&self) -> i64 {
        self.0
    }
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ------------- Visibility -------------
/// Access label carried along with every triple; never interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Visibility(String);
impl Visibility {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ------------- Metadata -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    derivation_level: u32,
    timestamp: Timestamp,
    visibility: Visibility,
}
impl Metadata {
    pub fn new(derivation_level: u32, timestamp: Timestamp, visibility: Visibility) -> Self {
        Self { derivation_level, timestamp, visibility }
    }
    /// Metadata of an explicitly asserted fact.
    pub fn asserted(timestamp: Timestamp) -> Self {
        Self::new(0, timestamp, Visibility::default())
    }
    pub fn derivation_level(&self) -> u32 {
        self.derivation_level
    }
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }
}
impl Default for Metadata {
    fn default() -> Self {
        Self::asserted(Timestamp::MIN)
    }
}

// ------------- Triple -------------
/// A fact. Identity is (subject, predicate, object, context); the metadata
/// travels with it but takes no part in equality or hashing.
#[derive(Debug, Clone)]
pub struct Triple {
    subject: Value,
    predicate: Value,
    object: Value,
    context: Option<Value>,
    metadata: Metadata,
}
impl Triple {
    pub fn new(subject: Value, predicate: Value, object: Value) -> Self {
        Self { subject, predicate, object, context: None, metadata: Metadata::default() }
    }
    pub fn in_context(mut self, context: Option<Value>) -> Self {
        self.context = context;
        self
    }
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
    pub fn subject(&self) -> &Value {
        &self.subject
    }
    pub fn predicate(&self) -> &Value {
        &self.predicate
    }
    pub fn object(&self) -> &Value {
        &self.object
    }
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    pub fn derivation_level(&self) -> u32 {
        self.metadata.derivation_level
    }
    pub fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }
    pub fn is_well_formed(&self) -> bool {
        self.subject.is_resource()
            && self.predicate.is_iri()
            && self.context.as_ref().is_none_or(Value::is_resource)
    }
}
impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
            && self.context == other.context
    }
}
impl Eq for Triple {}
impl Hash for Triple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
        self.predicate.hash(state);
        self.object.hash(state);
        self.context.hash(state);
    }
}
impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " {}", context)?;
        }
        write!(f, " .")
    }
}
