//! ChargingSession entity — the central aggregate of the lifecycle engine
//! (spec.md §3, §4.3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Energy,
    Amount,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Amount => "amount",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "energy" => Some(Self::Energy),
            "amount" => Some(Self::Amount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Starting,
    Active,
    Stopping,
    Stopped,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "starting" => Some(Self::Starting),
            "active" => Some(Self::Active),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// States counted against the "at most one active charge" invariants
    /// (spec.md §3, §8).
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Starting | Self::Active | Self::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Expired)
    }
}

#[derive(Debug, Clone)]
pub struct ChargingSession {
    pub id: String,
    pub client_id: String,
    pub station_id: String,
    pub connector_id: i32,
    pub limit_kind: LimitKind,
    pub limit_value: Decimal,
    pub reserved_amount: i64,
    pub id_tag: String,
    pub ocpp_tx_id: Option<i64>,
    pub meter_start: Option<i64>,
    pub meter_stop: Option<i64>,
    pub energy_delivered_wh: Option<i64>,
    pub amount_charged: Option<i64>,
    pub refund_amount: Option<i64>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl ChargingSession {
    /// `amount_charged + refund_amount = reserved_amount` once stopped
    /// (spec.md §3 invariant, §8 "Reservation exactness").
    pub fn reservation_is_exact(&self) -> bool {
        match (self.amount_charged, self.refund_amount) {
            (Some(charged), Some(refund)) => {
                charged >= 0 && refund >= 0 && charged + refund == self.reserved_amount
            }
            _ => self.status != SessionStatus::Stopped,
        }
    }
}
