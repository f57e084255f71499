//! Invoice / Top-Up entity (spec.md §3, §4.7).
//!
//! Approval is terminal and monotonic: once `Approved`, no other code path
//! may revert it (enforced in
//! `infrastructure::provider` and the reconciler's invoice sweep).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Expired,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: String,
    pub client_id: String,
    pub provider_order_id: String,
    pub amount_requested: i64,
    pub amount_paid: Option<i64>,
    pub status: InvoiceStatus,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}
