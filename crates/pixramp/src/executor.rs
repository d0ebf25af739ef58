use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::RampConfig;
use crate::error::ExecutionError;
use crate::gas::GasPlan;
use crate::IERC20;

/// Target, call-data and attached value for one contract invocation. The
/// call-data is opaque — usually produced by the aggregator.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// One on-chain submission, surfaced to the orchestrator as success plus
/// hash for audit linkage.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub tx_hash: TxHash,
    pub to: Address,
    pub confirmed: bool,
}

/// Build ERC-20 `transfer(recipient, amount)` call-data for the payout leg.
pub fn erc20_transfer_call(token: Address, recipient: Address, amount: U256) -> CallRequest {
    let data = IERC20::transferCall {
        to: recipient,
        value: amount,
    }
    .abi_encode();
    CallRequest {
        to: token,
        data: data.into(),
        value: U256::ZERO,
    }
}

/// Chain seam used by the orchestrator; [`ChainExecutor`] is the live
/// implementation.
pub trait Executor: Send + Sync {
    /// Broadcast exactly one transaction and wait for its confirmation.
    /// Callers must not re-submit the same logical step without first
    /// observing that the prior attempt failed.
    fn submit(
        &self,
        call: &CallRequest,
        plan: &GasPlan,
    ) -> impl std::future::Future<Output = Result<TransactionRecord, ExecutionError>> + Send;

    /// ERC-20 balance read, used to measure the realized swap output.
    fn erc20_balance_of(
        &self,
        token: Address,
        owner: Address,
    ) -> impl std::future::Future<Output = Result<U256, ExecutionError>> + Send;

    /// The signing account transactions are sent from (and swaps routed
    /// through).
    fn signer_address(&self) -> Address;
}

/// Submits transactions through an alloy wallet provider and polls for
/// confirmation within a bounded window.
pub struct ChainExecutor<P> {
    provider: P,
    signer_address: Address,
    /// Per-account mutex: one in-flight transaction per signing account at a
    /// time, so concurrent orders cannot collide on a nonce.
    account_locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
    send_timeout: Duration,
    receipt_timeout: Duration,
}

impl<P> ChainExecutor<P> {
    pub fn new(provider: P, signer_address: Address, config: &RampConfig) -> Self {
        Self {
            provider,
            signer_address,
            account_locks: Arc::new(DashMap::new()),
            send_timeout: config.send_timeout,
            receipt_timeout: config.receipt_timeout(),
        }
    }

    fn account_lock(&self, account: Address) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl<P> Executor for ChainExecutor<P>
where
    P: Provider + Send + Sync,
{
    async fn submit(
        &self,
        call: &CallRequest,
        plan: &GasPlan,
    ) -> Result<TransactionRecord, ExecutionError> {
        // Held across send + receipt so the nonce filler never races itself.
        let lock = self.account_lock(self.signer_address);
        let _guard = lock.lock().await;

        let tx = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(call.to)
            .with_input(call.data.clone())
            .with_value(call.value)
            .with_gas_limit(plan.gas_limit)
            .with_max_fee_per_gas(plan.max_fee_per_gas)
            .with_max_priority_fee_per_gas(plan.max_priority_fee_per_gas);

        let pending = tokio::time::timeout(self.send_timeout, self.provider.send_transaction(tx))
            .await
            .map_err(|_| ExecutionError::Timeout)?
            .map_err(|e| ExecutionError::RpcUnavailable(format!("send failed: {e}")))?;

        let tx_hash = *pending.tx_hash();
        tracing::debug!(tx = %tx_hash, to = %call.to, "transaction broadcast");

        let receipt = tokio::time::timeout(self.receipt_timeout, pending.get_receipt())
            .await
            .map_err(|_| ExecutionError::Timeout)?
            .map_err(|e| ExecutionError::RpcUnavailable(format!("receipt failed: {e}")))?;

        if !receipt.status() {
            tracing::warn!(tx = %tx_hash, to = %call.to, "transaction reverted");
            return Err(ExecutionError::Reverted);
        }

        Ok(TransactionRecord {
            tx_hash: receipt.transaction_hash,
            to: call.to,
            confirmed: true,
        })
    }

    async fn erc20_balance_of(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<U256, ExecutionError> {
        let contract = IERC20::new(token, &self.provider);
        contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ExecutionError::RpcUnavailable(format!("balanceOf failed: {e}")))
    }

    fn signer_address(&self) -> Address {
        self.signer_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_transfer_calldata_layout() {
        let token = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        let recipient = address!("EBc1B90A3a026C3E1FBeBDFBcd103667e539A94f");
        let call = erc20_transfer_call(token, recipient, U256::from(98_700u64));

        assert_eq!(call.to, token);
        assert_eq!(call.value, U256::ZERO);
        // 4-byte selector + two 32-byte words
        assert_eq!(call.data.len(), 68);
        assert_eq!(&call.data[..4], &IERC20::transferCall::SELECTOR);
    }
}
