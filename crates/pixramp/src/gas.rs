use std::time::Duration;

use serde::Deserialize;

use crate::config::RampConfig;
use crate::error::GasOracleError;

/// EIP-1559 fee parameters for one pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub gas_limit: u64,
    /// Wei.
    pub max_fee_per_gas: u128,
    /// Wei.
    pub max_priority_fee_per_gas: u128,
}

impl GasPlan {
    /// A plan must never carry a zero fee or zero gas limit.
    pub fn is_priced(&self) -> bool {
        self.gas_limit > 0 && self.max_fee_per_gas > 0 && self.max_priority_fee_per_gas > 0
    }
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    fast: OracleTier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleTier {
    /// Gwei.
    max_fee: f64,
    /// Gwei.
    max_priority_fee: f64,
}

fn gwei_to_wei(gwei: f64) -> u128 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return 0;
    }
    (gwei * 1e9) as u128
}

/// Computes gas parameters from the network oracle's fast tier, falling back
/// to the configured default plan whenever the oracle is unreachable or
/// returns garbage. The fallback is mandatory: [`estimate`](Self::estimate)
/// never fails and never blocks beyond the bounded HTTP timeout, so a dead
/// oracle cannot fail or stall a payout.
pub struct GasEstimator {
    http: reqwest::Client,
    oracle_url: String,
    timeout: Duration,
    default_plan: GasPlan,
}

impl GasEstimator {
    pub fn new(http: reqwest::Client, config: &RampConfig) -> Self {
        Self {
            http,
            oracle_url: config.gas_oracle_url.clone(),
            timeout: config.http_timeout,
            default_plan: config.default_gas_plan,
        }
    }

    pub async fn estimate(&self) -> GasPlan {
        match self.fetch_oracle().await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "gas oracle unavailable, using default plan");
                self.default_plan
            }
        }
    }

    async fn fetch_oracle(&self) -> Result<GasPlan, GasOracleError> {
        let response = self
            .http
            .get(&self.oracle_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GasOracleError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GasOracleError::Http(format!(
                "oracle returned {}",
                response.status()
            )));
        }

        let body: OracleResponse = response
            .json()
            .await
            .map_err(|e| GasOracleError::Decode(e.to_string()))?;

        let max_fee = gwei_to_wei(body.fast.max_fee);
        // Priority fee can never exceed the fee cap.
        let max_priority_fee = gwei_to_wei(body.fast.max_priority_fee).min(max_fee);

        let plan = GasPlan {
            gas_limit: self.default_plan.gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: max_priority_fee,
        };
        if !plan.is_priced() {
            return Err(GasOracleError::UnusableFees);
        }

        tracing::debug!(
            max_fee_per_gas = plan.max_fee_per_gas,
            max_priority_fee_per_gas = plan.max_priority_fee_per_gas,
            "gas plan from oracle fast tier"
        );
        Ok(plan)
    }
}
