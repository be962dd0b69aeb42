// Error types for the allocation engine
// Infeasible stays and pricing gaps are results, not errors; only
// invalid input, store failures and broken invariants end up here.

use thiserror::Error;

/// Main error type for the allocation engine
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The requested stay cannot be evaluated as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The booking store could not be reached or the query failed
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A record loaded from the store does not describe a valid unit,
    /// reservation or tariff
    #[error("Malformed record: {0}")]
    InvalidRecord(String),

    /// A combination failed its post-allocation check
    #[error("Allocation invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result type alias for allocation operations
pub type AllocResult<T> = Result<T, AllocationError>;
