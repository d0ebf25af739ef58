//! HTTP surface for the pixramp payout pipeline.
//!
//! Exposes the payment-confirmation webhook, order creation and lookup,
//! health and Prometheus metrics. All pipeline logic lives in the `pixramp`
//! crate; this crate only authenticates requests, maps them onto the
//! orchestrator and acknowledges promptly so the processor stops redelivery.

pub mod metrics;
pub mod routes;
pub mod state;
