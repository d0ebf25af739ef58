//! pixramp — drives a confirmed fiat payment through to an on-chain token payout.
//!
//! The pipeline receives payment-confirmation webhooks from the processor,
//! verifies them with a shared HMAC secret, records the purchase order exactly
//! once, buys the output token through a swap aggregator and forwards the
//! realized output to the buyer's wallet. Every state transition is a
//! compare-and-swap against the order store, so at-least-once webhook delivery
//! never duplicates an approval, a swap or a payout.
//!
//! # Modules
//!
//! - [`signature`] — HMAC verification of inbound webhook payloads
//! - [`store`] — durable, idempotent order records keyed by correlation id
//! - [`quote`] — swap quotes and approval call-data from the aggregator
//! - [`gas`] — EIP-1559 gas planning with an oracle fallback
//! - [`executor`] — transaction submission and confirmation polling
//! - [`orchestrator`] — the Verify → Record → Quote → Approve → Swap →
//!   Transfer → Complete state machine
//! - [`ledger`] — hash-deduplicated bookkeeping of confirmed transactions

pub mod config;
pub mod error;
pub mod executor;
pub mod gas;
pub mod ledger;
pub mod orchestrator;
pub mod order;
pub mod quote;
pub mod security;
pub mod signature;
pub mod store;

use alloy::sol;

// ERC-20 interface. The payout path only needs balance reads (to measure the
// realized swap output) and transfer (to forward it to the buyer).
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 value) external returns (bool);
    }
}

// Re-exports
pub use config::RampConfig;
pub use error::{ExecutionError, OrchestrationError, QuoteError, StoreError};
pub use executor::{CallRequest, ChainExecutor, Executor, TransactionRecord};
pub use gas::{GasEstimator, GasPlan};
pub use ledger::TransferLedger;
pub use orchestrator::PayoutOrchestrator;
pub use order::{NewOrder, Order, OrderStatus, TransitionExtra};
pub use quote::{QuoteApi, QuoteClient, SwapQuote};
pub use store::{InMemoryOrderStore, OrderStore, SqliteOrderStore};
