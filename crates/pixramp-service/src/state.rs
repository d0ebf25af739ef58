use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity, RootProvider,
};

use pixramp::{ChainExecutor, OrderStore, PayoutOrchestrator, QuoteClient};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

pub type Orchestrator = PayoutOrchestrator<QuoteClient, ChainExecutor<WalletProvider>>;

/// Shared application state for the payout service.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Same store the orchestrator drives; used directly for order
    /// creation and lookup.
    pub store: Arc<dyn OrderStore>,
    /// Used by /health to check RPC connectivity.
    pub provider: WalletProvider,
    /// Shared secret for webhook signature verification.
    /// This is mandatory — the service will not start without it.
    pub webhook_secret: Vec<u8>,
    /// Separate bearer token for the /metrics endpoint (not the webhook secret).
    pub metrics_token: Option<Vec<u8>>,
}
