//! # Planner Errors
//!
//! Every planning operation returns a [`Result`] rather than panicking. The
//! variants separate internal invariant violations (a collaborator that should
//! have been there is missing) from resource failures and from programming
//! errors such as traversing an expression that does not support it.
//!
//! None of these errors are fatal to the process. The plan-search driver above
//! this layer decides whether to abort planning or to try another plan shape.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A required reference (plan, statement, child operator, synthetic
    /// expression) is missing.
    #[error("unexpected null: {0}")]
    UnexpectedNull(String),

    /// An internal invariant does not hold (e.g. parallel degree below one).
    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    /// A collection could not grow or a node could not be constructed.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The recursion guard tripped at the given depth limit.
    #[error("recursion limit exceeded: maximum depth {0}")]
    RecursionLimitExceeded(usize),

    /// The operation is not supported by this expression variant.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The cost model rejected its input.
    #[error("invalid cost input: {0}")]
    InvalidCostInput(String),

    /// Result-type resolution failed.
    #[error("type resolution failed: {0}")]
    TypeResolution(String),
}

impl PlanError {
    pub fn unexpected_null(what: impl Into<String>) -> Self {
        Self::UnexpectedNull(what.into())
    }

    pub fn unexpected_state(what: impl Into<String>) -> Self {
        Self::UnexpectedState(what.into())
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }
}

impl From<std::collections::TryReserveError> for PlanError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure(err.to_string())
    }
}

pub type Result<T, E = PlanError> = std::result::Result<T, E>;
