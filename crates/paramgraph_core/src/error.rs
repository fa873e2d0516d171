use crate::value::DataType;
use thiserror::Error;

/// Failures raised by an algebra engine while parsing, transforming or
/// numerically evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("free symbol '{0}' has no value")]
    UnresolvedSymbol(String),
    #[error("differentiation requested without a differentiation variable")]
    MissingDifferentiationVariable,
    #[error("Vector({index}) is out of range for a vector of length {len}")]
    VectorIndex { index: i64, len: usize },
    #[error("expression evaluated to a non-finite value ({0})")]
    NonFinite(String),
    #[error("evaluation stack underflow")]
    StackUnderflow,
}

/// Failures of the attribute graph itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttributeError {
    #[error("type mismatch: attribute holds {found:?}, caller used {expected:?}")]
    TypeMismatch { expected: DataType, found: DataType },
    #[error("attribute handle {0} refers to a removed attribute")]
    StaleAttribute(usize),
    #[error("owner handle {0} refers to an unknown owner")]
    UnknownOwner(usize),
    #[error("an owner named '{0}' is already declared")]
    DuplicateOwner(String),
    #[error("owner '{owner}' already declares an attribute named '{name}'")]
    DuplicateAttribute { owner: String, name: String },
    #[error("differentiation order {order} exceeds the configured maximum of {max}")]
    DifferentiationOrder { order: u32, max: u32 },
    #[error("dependency cycle through attribute '{0}'")]
    DependencyCycle(String),
    #[error(
        "{owner}: attribute {attribute} can not evaluate its expression E = {expression}. Reason: {reason}"
    )]
    Binding {
        owner: String,
        attribute: String,
        expression: String,
        reason: String,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}
