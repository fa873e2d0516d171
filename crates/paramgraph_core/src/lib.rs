/// The `paramgraph_core` crate keeps the typed parameters ("attributes") of
/// simulation components consistent with each other. An attribute holds a
/// literal or is defined by an expression over other attributes, which is
/// evaluated through a symbolic algebra engine.
///
/// Key components:
/// - **Value**: `Value`/`DataType` tagged storage with backup and narrowing.
/// - **Graph**: `AttributeGraph`, an arena of owners and attributes with
///   symmetric subject/observer edges.
/// - **Binder**: turns configuration text into bound expressions.
/// - **Evaluator**: substitutes subject values, differentiates and evaluates.
/// - **Equation Engine**: the default `AlgebraEngine`, a parser, symbolic
///   differentiator and complex-valued bytecode VM.
/// - **Propagate**: notifies the owning component tree of updates.
pub mod binder;
pub mod config;
pub mod equation_engine;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod propagate;
pub mod traits;
pub mod value;

pub use config::GraphSettings;
pub use equation_engine::SymbolicEngine;
pub use error::{AttributeError, EngineError};
pub use graph::{AttrId, Attribute, AttributeGraph, OwnerId};
pub use propagate::notify_owner_of_update;
pub use traits::{AlgebraEngine, EvalContext, PrepareMode, PrototypeRole, PrototypeTree};
pub use value::{AttributeType, DataType, PulseAxis, Value, ValueStore};
