use std::time::Duration;

use alloy::primitives::{address, Address};

use crate::gas::GasPlan;

/// Polygon mainnet chain ID.
pub const POLYGON_CHAIN_ID: u64 = 137;

/// Aggregator sentinel for the chain's native asset. Native transfers need no
/// ERC-20 approval, so the approval step is skipped for this address.
pub const NATIVE_ASSET: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Wrapped MATIC, the default source token on Polygon.
pub const WMATIC: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");

/// USDC, the default payout token on Polygon.
pub const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

/// Default aggregator API base (chain id is appended per request).
pub const AGGREGATOR_BASE_URL: &str = "https://api.1inch.exchange/v3.0";

/// Polygon gas station, tiered EIP-1559 fee suggestions in gwei.
pub const GAS_ORACLE_URL: &str = "https://gasstation-mainnet.matic.network/v2";

/// Runtime configuration for the payout pipeline. Every component receives
/// this at construction — there are no implicit globals or hard-coded
/// credentials.
#[derive(Debug, Clone)]
pub struct RampConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub aggregator_base_url: String,
    pub gas_oracle_url: String,
    /// Token the service holds and swaps out of.
    pub source_token: Address,
    /// Token forwarded to the buyer after the swap.
    pub output_token: Address,
    /// Aggregator slippage tolerance, percent.
    pub slippage: f64,
    /// Used verbatim whenever the gas oracle is unreachable.
    pub default_gas_plan: GasPlan,
    /// Timeout for each aggregator and oracle HTTP call.
    pub http_timeout: Duration,
    /// Maximum attempts for any retryable step. Retries are never infinite.
    pub retry_ceiling: u32,
    /// Base delay between retries; doubles per attempt.
    pub retry_backoff: Duration,
    /// Timeout for broadcasting a transaction.
    pub send_timeout: Duration,
    /// Receipt polling bound: attempts x interval caps the confirmation wait.
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval: Duration,
}

impl Default for RampConfig {
    /// Defaults to the Polygon mainnet WMATIC -> USDC configuration.
    fn default() -> Self {
        Self {
            chain_id: POLYGON_CHAIN_ID,
            rpc_url: "https://polygon-rpc.com".to_string(),
            aggregator_base_url: AGGREGATOR_BASE_URL.to_string(),
            gas_oracle_url: GAS_ORACLE_URL.to_string(),
            source_token: WMATIC,
            output_token: USDC,
            slippage: 0.1,
            default_gas_plan: GasPlan {
                gas_limit: 1_000_000,
                max_fee_per_gas: 40_000_000_000,
                max_priority_fee_per_gas: 40_000_000_000,
            },
            http_timeout: Duration::from_secs(10),
            retry_ceiling: 3,
            retry_backoff: Duration::from_millis(500),
            send_timeout: Duration::from_secs(30),
            receipt_poll_attempts: 30,
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

impl RampConfig {
    /// Total time budget for waiting on a receipt.
    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_poll_interval * self.receipt_poll_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gas_plan_is_priced() {
        let config = RampConfig::default();
        assert!(config.default_gas_plan.is_priced());
    }

    #[test]
    fn test_receipt_timeout_bounded() {
        let config = RampConfig::default();
        assert_eq!(config.receipt_timeout(), Duration::from_secs(60));
    }
}
