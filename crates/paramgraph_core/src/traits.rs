use crate::error::EngineError;
use crate::graph::OwnerId;
use num_complex::Complex64;
use std::fmt::Debug;

/// Per-call evaluation context handed down to the engine.
///
/// Carries the owning component's numeric vector so that `Vector(k)` can be
/// resolved without any process-wide state.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub vector: Option<&'a [f64]>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(vector: &'a [f64]) -> Self {
        Self {
            vector: Some(vector),
        }
    }
}

/// A symbolic algebra backend.
pub trait AlgebraEngine {
    type Expr: Clone + Debug;

    /// Parses `text`. Identifiers in `symbols` are the bound attribute symbols.
    fn parse(&self, text: &str, symbols: &[String]) -> Result<Self::Expr, EngineError>;

    /// Differentiates `order` times with respect to `variable`.
    fn differentiate(
        &self,
        expr: &Self::Expr,
        variable: &str,
        order: u32,
    ) -> Result<Self::Expr, EngineError>;

    /// Replaces each `symbols[i]` with `values[i]`.
    fn substitute(&self, expr: &Self::Expr, symbols: &[String], values: &[f64]) -> Self::Expr;

    /// Fully numeric evaluation. Fails if a free symbol remains.
    fn evaluate_numeric(
        &self,
        expr: &Self::Expr,
        ctx: &EvalContext<'_>,
    ) -> Result<Complex64, EngineError>;
}

/// Role tag of an owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrototypeRole {
    Sequence,
    Pulse,
    Other,
}

/// Reason passed to a component's prepare hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepareMode {
    Update,
}

/// The host's component tree, as seen from the attribute graph.
pub trait PrototypeTree {
    /// Generic "prepare" hook of a component.
    fn prepare(&mut self, owner: OwnerId, mode: PrepareMode) -> anyhow::Result<()>;

    fn role(&self, owner: OwnerId) -> PrototypeRole;

    fn parent(&self, owner: OwnerId) -> Option<OwnerId>;

    /// Asks a sequence container to recollect its time points of interest.
    fn collect_time_points(&mut self, sequence: OwnerId);

    fn vector(&self, _owner: OwnerId) -> Option<&[f64]> {
        None
    }
}
