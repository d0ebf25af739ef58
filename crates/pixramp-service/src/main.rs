use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixramp::{
    ChainExecutor, GasEstimator, OrderStore, PayoutOrchestrator, QuoteClient, RampConfig,
    SqliteOrderStore, TransferLedger,
};
use pixramp_service::routes;
use pixramp_service::state::AppState;

fn parse_cors_origins() -> Vec<String> {
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) => origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => vec![],
    }
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-payment-signature"])
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method()
            .allowed_headers(vec!["content-type", "authorization", "x-payment-signature"])
            .max_age(3600)
    }
}

fn env_address(name: &str) -> Option<Address> {
    std::env::var(name).ok().map(|s| {
        s.parse().unwrap_or_else(|_| {
            tracing::error!("invalid {name}: {s}");
            std::process::exit(1);
        })
    })
}

fn build_config() -> RampConfig {
    let mut config = RampConfig::default();
    if let Ok(url) = std::env::var("RPC_URL") {
        config.rpc_url = url;
    }
    if let Ok(url) = std::env::var("AGGREGATOR_BASE_URL") {
        config.aggregator_base_url = url;
    }
    if let Ok(url) = std::env::var("GAS_ORACLE_URL") {
        config.gas_oracle_url = url;
    }
    if let Some(token) = env_address("SOURCE_TOKEN") {
        config.source_token = token;
    }
    if let Some(token) = env_address("OUTPUT_TOKEN") {
        config.output_token = token;
    }
    if let Ok(slippage) = std::env::var("SLIPPAGE") {
        match slippage.parse::<f64>() {
            Ok(s) if s > 0.0 && s <= 50.0 => config.slippage = s,
            _ => {
                tracing::error!("invalid SLIPPAGE: {slippage}");
                std::process::exit(1);
            }
        }
    }
    config
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let webhook_secret: Vec<u8> = match std::env::var("WEBHOOK_SHARED_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
    {
        Some(s) => {
            let bytes = s.into_bytes();
            if bytes.len() < 32 {
                tracing::warn!(
                    "WEBHOOK_SHARED_SECRET is only {} bytes (minimum 32 recommended) — \
                     use `openssl rand -hex 32` to generate a secure secret",
                    bytes.len()
                );
            }
            bytes
        }
        None => {
            tracing::error!(
                "WEBHOOK_SHARED_SECRET is required. It must match the secret the payment \
                 processor signs webhook deliveries with."
            );
            std::process::exit(1);
        }
    };

    let key = std::env::var("PAYOUT_PRIVATE_KEY")
        .expect("PAYOUT_PRIVATE_KEY environment variable is required");
    let signer: PrivateKeySigner = key.parse().expect("invalid PAYOUT_PRIVATE_KEY");
    let payout_address = signer.address();

    let config = build_config();

    let provider = ProviderBuilder::new()
        .wallet(alloy::network::EthereumWallet::from(signer))
        .connect_http(config.rpc_url.parse().expect("invalid RPC_URL"));

    let order_db_path =
        std::env::var("ORDER_DB_PATH").unwrap_or_else(|_| "./pixramp-orders.db".to_string());

    let store: Arc<dyn OrderStore> = match SqliteOrderStore::open(&order_db_path) {
        Ok(store) => {
            tracing::info!("Order store: SQLite at {order_db_path}");
            Arc::new(store)
        }
        Err(e) => {
            // CRITICAL: Do not fall back to in-memory. In-memory orders are
            // lost on restart, so a redelivered webhook could pay out twice.
            tracing::error!("Failed to open SQLite order store at {order_db_path}: {e}");
            tracing::error!("Refusing to start — in-memory fallback would allow duplicate payouts");
            std::process::exit(1);
        }
    };

    let ledger_db_path =
        std::env::var("LEDGER_DB_PATH").unwrap_or_else(|_| "./pixramp-ledger.db".to_string());
    let ledger = match TransferLedger::open(&ledger_db_path) {
        Ok(ledger) => {
            tracing::info!("Transfer ledger: SQLite at {ledger_db_path}");
            Arc::new(ledger)
        }
        Err(e) => {
            tracing::error!("Failed to open transfer ledger at {ledger_db_path}: {e}");
            std::process::exit(1);
        }
    };

    let metrics_token = std::env::var("METRICS_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.into_bytes());
    if metrics_token.is_none() {
        tracing::warn!("METRICS_TOKEN not set — /metrics requires PIXRAMP_PUBLIC_METRICS=true");
    }

    let http = reqwest::Client::new();
    let orchestrator = Arc::new(PayoutOrchestrator::new(
        store.clone(),
        QuoteClient::new(http.clone(), &config),
        GasEstimator::new(http, &config),
        ChainExecutor::new(provider.clone(), payout_address, &config),
        ledger,
        config.clone(),
    ));

    let state = web::Data::new(AppState {
        orchestrator,
        store,
        provider,
        webhook_secret,
        metrics_token,
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4090);

    let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(120);

    let cors_origins = parse_cors_origins();

    tracing::info!("pixramp service listening on port {port}");
    tracing::info!("Payout account: {payout_address}");
    tracing::info!(
        "Swap route: {} -> {} on chain {}",
        config.source_token,
        config.output_token,
        config.chain_id
    );
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  POST http://localhost:{port}/webhook/payment");
    tracing::info!("  POST http://localhost:{port}/orders");
    tracing::info!("  GET  http://localhost:{port}/orders/{{correlationID}}");

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::payment_webhook)
            .service(routes::create_order)
            .service(routes::get_order)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
