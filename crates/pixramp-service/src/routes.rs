use actix_web::{get, post, web, HttpRequest, HttpResponse};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use serde::Deserialize;

use pixramp::error::{OrchestrationError, StoreError};
use pixramp::{signature, NewOrder, OrderStore};

use crate::metrics;
use crate::state::AppState;

/// The only webhook event that triggers a payout. Other events are
/// acknowledged and ignored.
const CHARGE_COMPLETED_EVENT: &str = "OPENPIX:CHARGE_COMPLETED";

#[derive(Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub event: Option<String>,
    pub charge: WebhookCharge,
}

#[derive(Deserialize)]
pub struct WebhookCharge {
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
    pub wallet: String,
    pub quantity: String,
}

/// Validate the signature header on an incoming webhook.
/// Verification is always required and runs over the raw body bytes, before
/// the body is parsed or any order state is touched.
fn validate_signature(
    req: &HttpRequest,
    body_bytes: &[u8],
    state: &AppState,
) -> Result<(), HttpResponse> {
    let header_value = req
        .headers()
        .get("x-payment-signature")
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(sig) => {
            if signature::verify_signature(&state.webhook_secret, body_bytes, sig) {
                Ok(())
            } else {
                tracing::warn!("webhook signature mismatch");
                metrics::SIGNATURE_FAILURES
                    .with_label_values(&["invalid"])
                    .inc();
                Err(HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "authentication failed"
                })))
            }
        }
        None => {
            tracing::warn!("webhook delivered without signature header");
            metrics::SIGNATURE_FAILURES
                .with_label_values(&["missing"])
                .inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

#[post("/webhook/payment")]
pub async fn payment_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(resp) = validate_signature(&req, &body, &state) {
        metrics::WEBHOOK_REQUESTS
            .with_label_values(&["unauthorized"])
            .inc();
        return resp;
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => {
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&["bad_request"])
                .inc();
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid request body"
            }));
        }
    };

    if let Some(event) = parsed.event.as_deref() {
        if event != CHARGE_COMPLETED_EVENT {
            tracing::info!(event, "ignoring non-completion webhook event");
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&["ignored"])
                .inc();
            return HttpResponse::Ok().json(serde_json::json!({ "status": "ignored" }));
        }
    }

    let correlation_id = parsed.charge.correlation_id;

    match state.orchestrator.confirm_payment(&correlation_id) {
        Ok(order) if order.status.is_terminal() => {
            // Redelivery for an order that already finished.
            metrics::WEBHOOK_REQUESTS.with_label_values(&["replay"]).inc();
            HttpResponse::Ok().json(serde_json::json!({
                "status": order.status,
                "correlationID": correlation_id,
            }))
        }
        Ok(_) => {
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&["accepted"])
                .inc();

            // Acknowledge promptly; the payout runs in the background. A
            // concurrent redelivery spawns a second runner that loses the
            // first claim and exits.
            let orchestrator = state.orchestrator.clone();
            let id = correlation_id.clone();
            tokio::spawn(async move {
                let start = std::time::Instant::now();
                match orchestrator.run_payout(&id).await {
                    Ok(order) => {
                        let elapsed = start.elapsed().as_secs_f64();
                        metrics::PAYOUTS.with_label_values(&["success"]).inc();
                        metrics::PAYOUT_LATENCY
                            .with_label_values(&["success"])
                            .observe(elapsed);
                        tracing::info!(
                            correlation_id = %id,
                            status = %order.status,
                            "payout run finished"
                        );
                    }
                    Err(e) => {
                        let elapsed = start.elapsed().as_secs_f64();
                        metrics::PAYOUTS.with_label_values(&["failed"]).inc();
                        metrics::PAYOUT_LATENCY
                            .with_label_values(&["failed"])
                            .observe(elapsed);
                        tracing::error!(correlation_id = %id, error = %e, "payout run failed");
                    }
                }
            });

            HttpResponse::Ok().json(serde_json::json!({
                "status": "accepted",
                "correlationID": correlation_id,
            }))
        }
        Err(OrchestrationError::Store(StoreError::NotFound(_))) => {
            // A payment with no matching order. Acknowledge so the processor
            // stops redelivering; the mismatch is an operator concern.
            tracing::warn!(correlation_id = %correlation_id, "payment for unknown order");
            metrics::WEBHOOK_REQUESTS
                .with_label_values(&["unknown_order"])
                .inc();
            HttpResponse::Ok().json(serde_json::json!({
                "status": "unknownOrder",
                "correlationID": correlation_id,
            }))
        }
        Err(e) => {
            tracing::error!(correlation_id = %correlation_id, error = %e, "webhook processing error");
            metrics::WEBHOOK_REQUESTS.with_label_values(&["error"]).inc();
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal error"
            }))
        }
    }
}

#[post("/orders")]
pub async fn create_order(
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    if body.correlation_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "correlationID is required"
        }));
    }
    if body.wallet.parse::<Address>().is_err() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "wallet is not a valid address"
        }));
    }
    if body.quantity.parse::<U256>().is_err() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "quantity is not a valid base-unit amount"
        }));
    }

    match state.store.create_if_absent(NewOrder {
        correlation_id: body.correlation_id.clone(),
        wallet: body.wallet.clone(),
        quantity: body.quantity.clone(),
    }) {
        Ok((order, true)) => {
            tracing::info!(correlation_id = %order.correlation_id, "order created");
            HttpResponse::Created().json(order)
        }
        // Duplicate creation returns the existing record untouched.
        Ok((order, false)) => HttpResponse::Ok().json(order),
        Err(e) => {
            tracing::error!(error = %e, "order creation failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal error"
            }))
        }
    }
}

#[get("/orders/{correlation_id}")]
pub async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let correlation_id = path.into_inner();
    match state.store.get(&correlation_id) {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(StoreError::NotFound(_)) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "order not found"
        })),
        Err(e) => {
            tracing::error!(error = %e, "order lookup failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "internal error"
            }))
        }
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.provider.get_block_number().await {
        Ok(block) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "pixramp-service",
            "latestBlock": block.to_string(),
        })),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "pixramp-service",
            "error": "RPC unreachable",
        })),
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    // Separate METRICS_TOKEN for metrics auth (not the webhook secret).
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| pixramp::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            // No token configured — metrics stay protected unless the
            // operator explicitly opts in to unauthenticated access.
            let public_metrics = std::env::var("PIXRAMP_PUBLIC_METRICS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if !public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or PIXRAMP_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
