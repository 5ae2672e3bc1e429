use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Unsupported pattern shape: {pattern}")]
    UnsupportedPatternShape { pattern: String },
    #[error("Pipeline not expressible: {0}")]
    PipelineNotExpressible(String),
    #[error("Backend query failed: {0}")]
    BackendQuery(String),
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Rule {rule} failed: {source}")]
    RuleExecution { rule: String, #[source] source: Box<ChainError> },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Two binding sets disagree on a shared variable. Never surfaces to callers;
/// the evaluator treats it as "no match".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("variable ?{variable} is already bound to a different value")]
pub struct BindingConflict {
    pub variable: String,
}

// Helper conversions
impl From<config::ConfigError> for ChainError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self { Self::Parse { message: e.to_string() } }
}
impl<T> From<std::sync::PoisonError<T>> for ChainError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
