use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};

use crate::config::{RampConfig, NATIVE_ASSET};
use crate::error::{ExecutionError, OrchestrationError, QuoteError, StoreError};
use crate::executor::{erc20_transfer_call, CallRequest, Executor, TransactionRecord};
use crate::gas::GasEstimator;
use crate::ledger::TransferLedger;
use crate::order::{Order, OrderStatus, TransitionExtra};
use crate::quote::{QuoteApi, SwapQuote};
use crate::store::OrderStore;

/// Retry a step up to `ceiling` attempts with doubling backoff. Only errors
/// the classifier marks retryable are retried; retries are never infinite.
async fn with_retries<T, E, Fut>(
    ceiling: u32,
    base_delay: Duration,
    what: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: impl FnMut() -> Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = base_delay;
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < ceiling && retryable(&e) => {
                tracing::warn!(attempt, error = %e, "{} failed, backing off", what);
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drives an order through
/// `PaymentConfirmed → Quoted → Approved → Swapped → Transferred → Completed`.
///
/// Every step begins with a compare-and-swap claim against the order store,
/// so concurrent deliveries of the same webhook can race freely: exactly one
/// runner wins each transition and the loser exits without touching the chain.
/// A terminal failure records its reason on the order — orders are never
/// silently abandoned.
pub struct PayoutOrchestrator<Q, E> {
    store: Arc<dyn OrderStore>,
    quotes: Q,
    gas: GasEstimator,
    executor: E,
    ledger: Arc<TransferLedger>,
    config: RampConfig,
}

impl<Q, E> PayoutOrchestrator<Q, E>
where
    Q: QuoteApi,
    E: Executor,
{
    pub fn new(
        store: Arc<dyn OrderStore>,
        quotes: Q,
        gas: GasEstimator,
        executor: E,
        ledger: Arc<TransferLedger>,
        config: RampConfig,
    ) -> Self {
        Self {
            store,
            quotes,
            gas,
            executor,
            ledger,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// `Created → PaymentConfirmed`, called once the webhook signature has
    /// been verified. A lost race means another delivery of the same payment
    /// already confirmed it; the replay is acknowledged with the current
    /// record and no side effects.
    pub fn confirm_payment(&self, correlation_id: &str) -> Result<Order, OrchestrationError> {
        match self.store.transition(
            correlation_id,
            OrderStatus::Created,
            OrderStatus::PaymentConfirmed,
            TransitionExtra::default(),
        ) {
            Ok(order) => {
                tracing::info!(correlation_id, "payment confirmed");
                Ok(order)
            }
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::info!(
                    correlation_id,
                    status = %actual,
                    "duplicate payment confirmation ignored"
                );
                Ok(self.store.get(correlation_id)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the payout pipeline for a confirmed order. Safe to call from any
    /// number of concurrent deliveries; the store's compare-and-swap
    /// discipline guarantees at most one runner per step.
    pub async fn run_payout(&self, correlation_id: &str) -> Result<Order, OrchestrationError> {
        // Claim the order. Losing here means another runner is (or was)
        // already driving this payout.
        if let Some(order) = self.claim_step(
            correlation_id,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Quoted,
            TransitionExtra::default(),
        )? {
            return Ok(order);
        }
        let order = self.store.get(correlation_id)?;
        let mut current = OrderStatus::Quoted;

        let wallet: Address = match order.wallet.parse() {
            Ok(w) => w,
            Err(_) => {
                return Err(self.fail(
                    correlation_id,
                    current,
                    format!("invalid buyer wallet {:?}", order.wallet),
                ))
            }
        };
        let amount: U256 = match order.quantity.parse() {
            Ok(a) => a,
            Err(_) => {
                return Err(self.fail(
                    correlation_id,
                    current,
                    format!("invalid quantity {:?}", order.quantity),
                ))
            }
        };
        let payout_account = self.executor.signer_address();

        let mut quote = match self.quote_with_retry(amount, payout_account).await {
            Ok(q) => q,
            Err(e) => {
                return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
            }
        };
        tracing::info!(
            correlation_id,
            estimated_out = %quote.to_token_amount,
            "swap quote obtained"
        );

        // Approval — skipped when the source is the chain's native asset.
        if self.config.source_token != NATIVE_ASSET {
            if let Some(order) = self.claim_step(
                correlation_id,
                current,
                OrderStatus::Approved,
                TransitionExtra::default(),
            )? {
                return Ok(order);
            }
            current = OrderStatus::Approved;

            let approval = match self.approval_with_retry(amount).await {
                Ok(call) => call,
                Err(e) => {
                    return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
                }
            };
            let record = match self.submit_with_retry(&approval).await {
                Ok(r) => r,
                Err(e) => {
                    return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
                }
            };
            self.ledger.record(correlation_id, "approval", &record);
            tracing::info!(correlation_id, tx = %record.tx_hash, "approval confirmed");
        }

        if let Some(order) = self.claim_step(
            correlation_id,
            current,
            OrderStatus::Swapped,
            TransitionExtra::default(),
        )? {
            return Ok(order);
        }
        current = OrderStatus::Swapped;

        // The payout must forward what the swap actually produced, not the
        // aggregator's estimate, so bracket the swap with balance reads.
        let balance_before = match self
            .balance_with_retry(self.config.output_token, payout_account)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
            }
        };

        let swap_record = match self.submit_with_retry(&quote.call).await {
            Ok(r) => r,
            Err(ExecutionError::Reverted) => {
                // A revert is the staleness signal: the call-data expired
                // between quoting and execution. One fresh quote, one
                // resubmission — never an unbounded loop.
                tracing::warn!(correlation_id, "swap reverted, re-quoting once");
                quote = match self.quote_with_retry(amount, payout_account).await {
                    Ok(q) => q,
                    Err(e) => {
                        return Err(self.fail(
                            correlation_id,
                            current,
                            e.reason_code().to_string(),
                        ))
                    }
                };
                match self.submit_with_retry(&quote.call).await {
                    Ok(r) => r,
                    Err(e) => {
                        return Err(self.fail(
                            correlation_id,
                            current,
                            e.reason_code().to_string(),
                        ))
                    }
                }
            }
            Err(e) => {
                return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
            }
        };
        self.ledger.record(correlation_id, "swap", &swap_record);

        let balance_after = match self
            .balance_with_retry(self.config.output_token, payout_account)
            .await
        {
            Ok(b) => b,
            Err(e) => {
                return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
            }
        };
        let realized = balance_after.saturating_sub(balance_before);
        if realized.is_zero() {
            return Err(self.fail(
                correlation_id,
                current,
                "swap produced no measurable output".to_string(),
            ));
        }
        tracing::info!(
            correlation_id,
            tx = %swap_record.tx_hash,
            estimated_out = %quote.to_token_amount,
            realized_out = %realized,
            "swap confirmed"
        );

        if let Some(order) = self.claim_step(
            correlation_id,
            current,
            OrderStatus::Transferred,
            TransitionExtra::with_tx(format!("{}", swap_record.tx_hash)),
        )? {
            return Ok(order);
        }
        current = OrderStatus::Transferred;

        let transfer = erc20_transfer_call(self.config.output_token, wallet, realized);
        let transfer_record = match self.submit_with_retry(&transfer).await {
            Ok(r) => r,
            Err(e) => {
                return Err(self.fail(correlation_id, current, e.reason_code().to_string()))
            }
        };
        self.ledger.record(correlation_id, "transfer", &transfer_record);

        let order = match self.store.transition(
            correlation_id,
            OrderStatus::Transferred,
            OrderStatus::Completed,
            TransitionExtra::with_tx(format!("{}", transfer_record.tx_hash)),
        ) {
            Ok(order) => order,
            // Already completed elsewhere — idempotent.
            Err(StoreError::Conflict { .. }) => self.store.get(correlation_id)?,
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            correlation_id,
            tx = %transfer_record.tx_hash,
            wallet = %wallet,
            amount = %realized,
            "payout completed"
        );
        Ok(order)
    }

    /// Compare-and-swap claim for the next step. `Ok(Some(order))` means
    /// another runner already advanced this order; the caller exits without
    /// side effects.
    fn claim_step(
        &self,
        correlation_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        extra: TransitionExtra,
    ) -> Result<Option<Order>, StoreError> {
        match self.store.transition(correlation_id, from, to, extra) {
            Ok(_) => Ok(None),
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::info!(
                    correlation_id,
                    status = %actual,
                    "step already claimed by another runner"
                );
                Ok(Some(self.store.get(correlation_id)?))
            }
            Err(e) => Err(e),
        }
    }

    /// Terminal failure: record the reason on the order and stop the pipeline.
    fn fail(&self, correlation_id: &str, from: OrderStatus, reason: String) -> OrchestrationError {
        tracing::error!(correlation_id, reason = %reason, "payout failed");
        if let Err(e) = self.store.transition(
            correlation_id,
            from,
            OrderStatus::Failed,
            TransitionExtra::with_reason(reason.clone()),
        ) {
            tracing::error!(correlation_id, error = %e, "could not record payout failure");
        }
        OrchestrationError::OrderFailed {
            correlation_id: correlation_id.to_string(),
            reason,
        }
    }

    async fn quote_with_retry(
        &self,
        amount: U256,
        from_address: Address,
    ) -> Result<SwapQuote, QuoteError> {
        with_retries(
            self.config.retry_ceiling,
            self.config.retry_backoff,
            "swap quote",
            QuoteError::is_retryable,
            || {
                self.quotes.get_swap_quote(
                    self.config.source_token,
                    self.config.output_token,
                    amount,
                    from_address,
                )
            },
        )
        .await
    }

    async fn approval_with_retry(&self, amount: U256) -> Result<CallRequest, QuoteError> {
        with_retries(
            self.config.retry_ceiling,
            self.config.retry_backoff,
            "approval call-data",
            QuoteError::is_retryable,
            || self.quotes.get_approval(self.config.source_token, amount),
        )
        .await
    }

    async fn submit_with_retry(
        &self,
        call: &CallRequest,
    ) -> Result<TransactionRecord, ExecutionError> {
        with_retries(
            self.config.retry_ceiling,
            self.config.retry_backoff,
            "transaction submission",
            ExecutionError::is_retryable,
            || async {
                // Fresh gas plan per attempt; oracle failure falls back to
                // the configured default and never blocks the submission.
                let plan = self.gas.estimate().await;
                self.executor.submit(call, &plan).await
            },
        )
        .await
    }

    async fn balance_with_retry(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<U256, ExecutionError> {
        with_retries(
            self.config.retry_ceiling,
            self.config.retry_backoff,
            "balance read",
            ExecutionError::is_retryable,
            || self.executor.erc20_balance_of(token, owner),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::GasPlan;
    use crate::order::NewOrder;
    use crate::store::InMemoryOrderStore;
    use alloy::primitives::{address, Bytes, TxHash};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const BUYER: Address = address!("EBc1B90A3a026C3E1FBeBDFBcd103667e539A94f");
    const SIGNER: Address = address!("9ecDC9aF2a8254DdE8bbce8778eFAe695044cC9F");
    const ROUTER: Address = address!("1111111254fb6c44bAC0beD2854e76F90643097d");

    fn dummy_call(tag: u8) -> CallRequest {
        CallRequest {
            to: ROUTER,
            data: Bytes::from(vec![tag; 4]),
            value: U256::ZERO,
        }
    }

    fn dummy_quote(estimate: u64) -> SwapQuote {
        SwapQuote {
            from_token: crate::config::WMATIC,
            to_token: crate::config::USDC,
            from_amount: U256::from(100_000_000_000_000_000u64),
            to_token_amount: U256::from(estimate),
            call: dummy_call(0x5a),
        }
    }

    fn ok_record(byte: u8) -> TransactionRecord {
        TransactionRecord {
            tx_hash: TxHash::new([byte; 32]),
            to: ROUTER,
            confirmed: true,
        }
    }

    #[derive(Default)]
    struct ScriptedQuotes {
        /// Popped per get_swap_quote call; empty means success with a
        /// default quote.
        swap_script: Mutex<VecDeque<Result<SwapQuote, QuoteError>>>,
        swap_calls: AtomicU32,
        approval_calls: AtomicU32,
        always_rate_limited: bool,
    }

    impl QuoteApi for ScriptedQuotes {
        async fn get_approval(
            &self,
            _token: Address,
            _amount: U256,
        ) -> Result<CallRequest, QuoteError> {
            self.approval_calls.fetch_add(1, Ordering::SeqCst);
            Ok(dummy_call(0xa1))
        }

        async fn get_swap_quote(
            &self,
            _from: Address,
            _to: Address,
            _amount: U256,
            _from_address: Address,
        ) -> Result<SwapQuote, QuoteError> {
            self.swap_calls.fetch_add(1, Ordering::SeqCst);
            if self.always_rate_limited {
                return Err(QuoteError::RateLimited);
            }
            match self.swap_script.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(dummy_quote(100_000)),
            }
        }
    }

    #[derive(Default)]
    struct ScriptedExecutor {
        /// Popped per submit; empty means success.
        submit_script: Mutex<VecDeque<Result<TransactionRecord, ExecutionError>>>,
        /// Popped per balance read; empty means zero.
        balances: Mutex<VecDeque<U256>>,
        submitted: Mutex<Vec<CallRequest>>,
        submit_calls: AtomicU32,
        always_timeout: bool,
    }

    impl Executor for ScriptedExecutor {
        async fn submit(
            &self,
            call: &CallRequest,
            plan: &GasPlan,
        ) -> Result<TransactionRecord, ExecutionError> {
            assert!(plan.is_priced(), "executor must never see an unpriced plan");
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
            self.submitted.lock().unwrap().push(call.clone());
            if self.always_timeout {
                return Err(ExecutionError::Timeout);
            }
            match self.submit_script.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(ok_record(n as u8 + 1)),
            }
        }

        async fn erc20_balance_of(
            &self,
            _token: Address,
            _owner: Address,
        ) -> Result<U256, ExecutionError> {
            Ok(self
                .balances
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(U256::ZERO))
        }

        fn signer_address(&self) -> Address {
            SIGNER
        }
    }

    fn test_config() -> RampConfig {
        let mut config = RampConfig::default();
        config.retry_backoff = Duration::from_millis(1);
        config.http_timeout = Duration::from_millis(100);
        // Unreachable oracle — gas planning exercises the fallback.
        config.gas_oracle_url = "http://127.0.0.1:1".to_string();
        config
    }

    fn orchestrator(
        quotes: ScriptedQuotes,
        executor: ScriptedExecutor,
        config: RampConfig,
    ) -> PayoutOrchestrator<ScriptedQuotes, ScriptedExecutor> {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        store
            .create_if_absent(NewOrder {
                correlation_id: "932211291312100109".to_string(),
                wallet: format!("{BUYER}"),
                quantity: "100000000000000000".to_string(),
            })
            .unwrap();
        PayoutOrchestrator::new(
            store,
            quotes,
            GasEstimator::new(reqwest::Client::new(), &config),
            executor,
            Arc::new(TransferLedger::open_in_memory().unwrap()),
            config,
        )
    }

    fn balances_around_swap(before: u64, after: u64) -> Mutex<VecDeque<U256>> {
        Mutex::new(VecDeque::from(vec![U256::from(before), U256::from(after)]))
    }

    const ID: &str = "932211291312100109";

    #[tokio::test]
    async fn test_happy_path_completes() {
        let executor = ScriptedExecutor {
            balances: balances_around_swap(1_000, 1_000 + 98_700),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        let order = orch.run_payout(ID).await.unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.failure_reason.is_none());
        assert!(order.last_tx.is_some());
        // approval + swap + transfer
        assert_eq!(orch.executor.submit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.ledger.events_for(ID), 3);
    }

    #[tokio::test]
    async fn test_replayed_delivery_runs_payout_once() {
        let executor = ScriptedExecutor {
            balances: balances_around_swap(0, 98_700),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        let first = orch.run_payout(ID).await.unwrap();
        assert_eq!(first.status, OrderStatus::Completed);

        // Same webhook delivered again: confirmation is a no-op and the
        // second runner loses the claim immediately.
        let replay = orch.confirm_payment(ID).unwrap();
        assert_eq!(replay.status, OrderStatus::Completed);
        let second = orch.run_payout(ID).await.unwrap();
        assert_eq!(second.status, OrderStatus::Completed);

        assert_eq!(orch.executor.submit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.ledger.events_for(ID), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_hits_retry_ceiling_then_fails() {
        let quotes = ScriptedQuotes {
            always_rate_limited: true,
            ..Default::default()
        };
        let orch = orchestrator(quotes, ScriptedExecutor::default(), test_config());

        orch.confirm_payment(ID).unwrap();
        let err = orch.run_payout(ID).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderFailed { .. }));

        // Exactly the configured ceiling, no more.
        assert_eq!(orch.quotes.swap_calls.load(Ordering::SeqCst), 3);
        let order = orch.store.get(ID).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("QuoteError:RateLimited"));
    }

    #[tokio::test]
    async fn test_insufficient_liquidity_fails_without_retry() {
        let quotes = ScriptedQuotes::default();
        quotes
            .swap_script
            .lock()
            .unwrap()
            .push_back(Err(QuoteError::InsufficientLiquidity));
        let orch = orchestrator(quotes, ScriptedExecutor::default(), test_config());

        orch.confirm_payment(ID).unwrap();
        orch.run_payout(ID).await.unwrap_err();

        assert_eq!(orch.quotes.swap_calls.load(Ordering::SeqCst), 1);
        let order = orch.store.get(ID).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(
            order.failure_reason.as_deref(),
            Some("QuoteError:InsufficientLiquidity")
        );
    }

    #[tokio::test]
    async fn test_stale_quote_requoted_exactly_once() {
        let executor = ScriptedExecutor {
            submit_script: Mutex::new(VecDeque::from(vec![
                Ok(ok_record(1)),             // approval
                Err(ExecutionError::Reverted), // stale swap call-data
                Ok(ok_record(2)),             // swap with fresh quote
                Ok(ok_record(3)),             // transfer
            ])),
            balances: balances_around_swap(0, 98_700),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        let order = orch.run_payout(ID).await.unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        // Initial quote + one re-quote.
        assert_eq!(orch.quotes.swap_calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.executor.submit_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_second_swap_revert_is_terminal() {
        let executor = ScriptedExecutor {
            submit_script: Mutex::new(VecDeque::from(vec![
                Ok(ok_record(1)),
                Err(ExecutionError::Reverted),
                Err(ExecutionError::Reverted),
            ])),
            balances: balances_around_swap(0, 0),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        orch.run_payout(ID).await.unwrap_err();

        // One re-quote, not an unbounded loop.
        assert_eq!(orch.quotes.swap_calls.load(Ordering::SeqCst), 2);
        let order = orch.store.get(ID).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(
            order.failure_reason.as_deref(),
            Some("ExecutionError:Reverted")
        );
    }

    #[tokio::test]
    async fn test_native_source_skips_approval() {
        let mut config = test_config();
        config.source_token = NATIVE_ASSET;
        let executor = ScriptedExecutor {
            balances: balances_around_swap(0, 50_000),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, config);

        orch.confirm_payment(ID).unwrap();
        let order = orch.run_payout(ID).await.unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(orch.quotes.approval_calls.load(Ordering::SeqCst), 0);
        // swap + transfer only
        assert_eq!(orch.executor.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transfer_sends_realized_not_quoted_amount() {
        // Quote estimates 100_000 but the swap realizes 98_700.
        let executor = ScriptedExecutor {
            balances: balances_around_swap(1_000, 1_000 + 98_700),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        orch.run_payout(ID).await.unwrap();

        let submitted = orch.executor.submitted.lock().unwrap();
        let transfer = submitted.last().unwrap();
        let expected =
            erc20_transfer_call(crate::config::USDC, BUYER, U256::from(98_700u64));
        assert_eq!(transfer.to, expected.to);
        assert_eq!(transfer.data, expected.data);
    }

    #[tokio::test]
    async fn test_zero_realized_output_is_terminal() {
        let executor = ScriptedExecutor {
            balances: balances_around_swap(5_000, 5_000),
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        orch.run_payout(ID).await.unwrap_err();

        let order = orch.store.get(ID).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(
            order.failure_reason.as_deref(),
            Some("swap produced no measurable output")
        );
    }

    #[tokio::test]
    async fn test_rpc_timeout_retries_then_fails() {
        let executor = ScriptedExecutor {
            always_timeout: true,
            ..Default::default()
        };
        let orch = orchestrator(ScriptedQuotes::default(), executor, test_config());

        orch.confirm_payment(ID).unwrap();
        orch.run_payout(ID).await.unwrap_err();

        // The approval submission is retried to the ceiling and no further
        // transaction is attempted.
        assert_eq!(orch.executor.submit_calls.load(Ordering::SeqCst), 3);
        let order = orch.store.get(ID).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(
            order.failure_reason.as_deref(),
            Some("ExecutionError:Timeout")
        );
    }

    #[tokio::test]
    async fn test_confirm_unknown_order_is_not_found() {
        let orch = orchestrator(
            ScriptedQuotes::default(),
            ScriptedExecutor::default(),
            test_config(),
        );
        let err = orch.confirm_payment("no-such-order").unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Store(StoreError::NotFound(_))
        ));
    }
}
