use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static WEBHOOK_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "pixramp_webhook_requests_total",
        "Payment webhook deliveries by outcome",
        &["result"]
    )
    .unwrap()
});

pub static SIGNATURE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "pixramp_signature_failures_total",
        "Webhook signature verification failures",
        &["reason"]
    )
    .unwrap()
});

pub static PAYOUTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "pixramp_payouts_total",
        "Payout pipeline runs by outcome",
        &["result"]
    )
    .unwrap()
});

pub static PAYOUT_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "pixramp_payout_duration_seconds",
        "End-to-end payout latency in seconds",
        &["result"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
