//! Chainstore – query evaluation and forward-chaining inference over an RDF triple store.
//!
//! Chainstore centers on two activities:
//! * Evaluating a tree of relational operators ([`algebra::AlgebraNode`]: joins,
//!   filters, slices and statement patterns) against a triple index, producing a
//!   lazy sequence of [`binding::BindingSet`]s.
//! * Applying CONSTRUCT-style [`algebra::Rule`]s over and over until no new facts
//!   appear, tagging every derived [`construct::Triple`] with its derivation level
//!   and the time it was derived so that later passes only revisit fresh facts.
//!
//! The storage layer is reached only through the traits in [`access`]; the
//! in-memory [`store::MemoryStore`] implements all of them.
//!
//! ## Modules
//! * [`construct`] – Terms, triples and their metadata.
//! * [`binding`] – Variable bindings.
//! * [`algebra`] – Operator trees, filter expressions and rules.
//! * [`access`] – Storage seams: lookups, closures, writes and pipeline execution.
//! * [`evaluate`] – Row-at-a-time evaluation with batched joins.
//! * [`pipeline`] – Compilation of a rule into a bulk plan.
//! * [`aggregate`] – Execution of such a plan over any access port.
//! * [`strategy`] – Pipeline and fallback rule execution.
//! * [`scheduler`] – The fixpoint loop and its bookkeeping.
//! * [`writer`] – Background batch writer.
//! * [`store`] – In-memory triple store.
//! * [`config`] – Settings and logging.
//!
//! ## Rule Execution
//! A rule is first compiled into a [`pipeline::PipelinePlan`] the backend runs in
//! bulk. Rules the plan steps cannot express (slices, transitive or fixed
//! patterns, regular expressions) are evaluated row by row instead. Once that has
//! happened in a session, derivation levels are no longer used for pruning.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use chainstore::algebra::{AlgebraNode, Rule, Slot, StatementPattern, TripleTemplate};
//! use chainstore::config::EngineConfig;
//! use chainstore::construct::Value;
//! use chainstore::scheduler::{Backend, FixpointScheduler};
//! use chainstore::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let father = Value::iri("http://example.org/father");
//! let grandfather = Value::iri("http://example.org/grandfather");
//! store.assert(Value::iri("http://example.org/A"), father.clone(), Value::iri("http://example.org/B")).unwrap();
//! store.assert(Value::iri("http://example.org/B"), father.clone(), Value::iri("http://example.org/C")).unwrap();
//!
//! let rule = Rule::new(
//!     "grandfather",
//!     AlgebraNode::join(
//!         StatementPattern::new(Slot::var("x"), father.clone(), Slot::var("z")).into(),
//!         StatementPattern::new(Slot::var("z"), father.clone(), Slot::var("y")).into(),
//!     ),
//!     TripleTemplate::new(Slot::var("x"), grandfather, Slot::var("y")),
//! );
//! let mut scheduler = FixpointScheduler::from_config(&Backend::memory(store.clone()), &EngineConfig::default()).unwrap();
//! assert_eq!(scheduler.run_to_fixpoint(&[rule]).unwrap(), 1);
//! scheduler.shutdown().unwrap();
//! ```
//!
//! ## Status
//! Deletion of facts and truth maintenance are not supported; the store is
//! append-only and derived facts stay derived.

pub mod access;
pub mod aggregate;
pub mod algebra;
pub mod binding;
pub mod config;
pub mod construct;
pub mod error;
pub mod evaluate;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod writer;

pub use error::{ChainError, Result};
