use thiserror::Error;

use crate::order::OrderStatus;

/// Errors from the swap aggregator. The orchestrator owns retry policy;
/// these only classify.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("aggregator rate limit hit")]
    RateLimited,

    #[error("insufficient liquidity for requested amount")]
    InsufficientLiquidity,

    #[error("transient aggregator error: {0}")]
    Transient(String),

    #[error("malformed aggregator response: {0}")]
    Decode(String),
}

impl QuoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuoteError::RateLimited | QuoteError::Transient(_))
    }

    /// Stable identifier recorded as the order's failure reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            QuoteError::RateLimited => "QuoteError:RateLimited",
            QuoteError::InsufficientLiquidity => "QuoteError:InsufficientLiquidity",
            QuoteError::Transient(_) => "QuoteError:Transient",
            QuoteError::Decode(_) => "QuoteError:Decode",
        }
    }
}

/// Errors from on-chain transaction submission.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("transaction reverted on-chain")]
    Reverted,

    #[error("timed out waiting for confirmation")]
    Timeout,

    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::Timeout | ExecutionError::RpcUnavailable(_)
        )
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            ExecutionError::Reverted => "ExecutionError:Reverted",
            ExecutionError::Timeout => "ExecutionError:Timeout",
            ExecutionError::RpcUnavailable(_) => "ExecutionError:RpcUnavailable",
        }
    }
}

/// Errors from the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),

    /// Another writer already advanced the order past `expected`. Callers
    /// treat this as success-by-other-writer, not a failure.
    #[error("conflicting transition for order {correlation_id}: expected {expected}, found {actual}")]
    Conflict {
        correlation_id: String,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("storage error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Internal gas-oracle failures. Always recoverable via the configured
/// default plan; never surfaced to callers of the estimator.
#[derive(Debug, Error)]
pub enum GasOracleError {
    #[error("oracle request failed: {0}")]
    Http(String),

    #[error("malformed oracle response: {0}")]
    Decode(String),

    #[error("oracle returned unusable fees")]
    UnusableFees,
}

/// Top-level orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("order {correlation_id} failed: {reason}")]
    OrderFailed {
        correlation_id: String,
        reason: String,
    },
}
