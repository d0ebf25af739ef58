use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of an order. Orders only move forward, except that any
/// non-terminal state may drop to `Failed`. `Completed` and `Failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Created,
    PaymentConfirmed,
    Quoted,
    Approved,
    Swapped,
    Transferred,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PaymentConfirmed => "paymentConfirmed",
            OrderStatus::Quoted => "quoted",
            OrderStatus::Approved => "approved",
            OrderStatus::Swapped => "swapped",
            OrderStatus::Transferred => "transferred",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(OrderStatus::Created),
            "paymentConfirmed" => Some(OrderStatus::PaymentConfirmed),
            "quoted" => Some(OrderStatus::Quoted),
            "approved" => Some(OrderStatus::Approved),
            "swapped" => Some(OrderStatus::Swapped),
            "transferred" => Some(OrderStatus::Transferred),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One buyer's purchase, keyed by the correlation id the payment processor
/// assigned at charge creation. Never deleted — terminal orders remain as the
/// audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub correlation_id: String,
    /// Destination wallet for the payout.
    pub wallet: String,
    /// Source-token amount in base units, as a decimal string.
    pub quantity: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Hash of the most recent confirmed transaction for this order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tx: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields supplied when an order is first recorded.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub correlation_id: String,
    pub wallet: String,
    pub quantity: String,
}

/// Optional fields written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionExtra {
    pub failure_reason: Option<String>,
    pub last_tx: Option<String>,
}

impl TransitionExtra {
    pub fn with_tx(tx_hash: impl Into<String>) -> Self {
        Self {
            failure_reason: None,
            last_tx: Some(tx_hash.into()),
        }
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            last_tx: None,
        }
    }
}
