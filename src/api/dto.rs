//! Request/response bodies for the REST Surface (spec.md §4.8).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{ChargingSession, Invoice, LimitKind};
use crate::shared::errors::{DomainError, DomainResult};

/// `POST /charging/start` (spec.md §4.8). Mirrors the source's two
/// alternative limit inputs (`energy_kwh` / `amount`) rather than the
/// engine's single `limit_kind` field, so the "exactly one" validation
/// required by SPEC_FULL.md §5 happens here, before the engine ever sees it.
#[derive(Debug, Deserialize)]
pub struct StartChargeRequest {
    pub station_id: String,
    pub connector_id: i32,
    pub energy_kwh: Option<Decimal>,
    pub amount: Option<Decimal>,
}

impl StartChargeRequest {
    pub fn resolve_limit(&self) -> DomainResult<(LimitKind, Decimal)> {
        match (self.energy_kwh, self.amount) {
            (Some(_), Some(_)) => Err(DomainError::InvalidArgument(
                "supply exactly one of energy_kwh or amount, not both".into(),
            )),
            (Some(energy), None) => Ok((LimitKind::Energy, energy)),
            (None, Some(amount)) => Ok((LimitKind::Amount, amount)),
            (None, None) => Err(DomainError::InvalidArgument(
                "one of energy_kwh or amount is required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartChargeResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StopChargeRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChargingSessionDto {
    pub id: String,
    pub client_id: String,
    pub station_id: String,
    pub connector_id: i32,
    pub limit_kind: &'static str,
    pub limit_value: Decimal,
    pub reserved_amount: i64,
    pub ocpp_tx_id: Option<i64>,
    pub meter_start: Option<i64>,
    pub meter_stop: Option<i64>,
    pub energy_delivered_wh: Option<i64>,
    pub amount_charged: Option<i64>,
    pub refund_amount: Option<i64>,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl From<ChargingSession> for ChargingSessionDto {
    fn from(s: ChargingSession) -> Self {
        Self {
            id: s.id,
            client_id: s.client_id,
            station_id: s.station_id,
            connector_id: s.connector_id,
            limit_kind: s.limit_kind.as_str(),
            limit_value: s.limit_value,
            reserved_amount: s.reserved_amount,
            ocpp_tx_id: s.ocpp_tx_id,
            meter_start: s.meter_start,
            meter_stop: s.meter_stop,
            energy_delivered_wh: s.energy_delivered_wh,
            amount_charged: s.amount_charged,
            refund_amount: s.refund_amount,
            status: s.status.as_str(),
            created_at: s.created_at,
            started_at: s.started_at,
            stopped_at: s.stopped_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub invoice_id: String,
    pub provider_order_id: String,
    pub qr_payload: Option<String>,
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl From<crate::charging::topup::TopUpResult> for TopUpResponse {
    fn from(r: crate::charging::topup::TopUpResult) -> Self {
        let invoice: Invoice = r.invoice;
        Self {
            invoice_id: invoice.id,
            provider_order_id: invoice.provider_order_id,
            qr_payload: r.qr_payload,
            status: invoice.status.as_str(),
            expires_at: invoice.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_limit_rejects_both_fields_set() {
        let req = StartChargeRequest {
            station_id: "CP1".into(),
            connector_id: 1,
            energy_kwh: Some(Decimal::new(10, 0)),
            amount: Some(Decimal::new(100, 0)),
        };
        assert!(req.resolve_limit().is_err());
    }

    #[test]
    fn resolve_limit_rejects_neither_field_set() {
        let req = StartChargeRequest {
            station_id: "CP1".into(),
            connector_id: 1,
            energy_kwh: None,
            amount: None,
        };
        assert!(req.resolve_limit().is_err());
    }

    #[test]
    fn resolve_limit_accepts_energy_only() {
        let req = StartChargeRequest {
            station_id: "CP1".into(),
            connector_id: 1,
            energy_kwh: Some(Decimal::new(10, 0)),
            amount: None,
        };
        let (kind, value) = req.resolve_limit().unwrap();
        assert_eq!(kind, LimitKind::Energy);
        assert_eq!(value, Decimal::new(10, 0));
    }

    #[test]
    fn resolve_limit_accepts_amount_only() {
        let req = StartChargeRequest {
            station_id: "CP1".into(),
            connector_id: 1,
            energy_kwh: None,
            amount: Some(Decimal::new(100, 0)),
        };
        let (kind, value) = req.resolve_limit().unwrap();
        assert_eq!(kind, LimitKind::Amount);
        assert_eq!(value, Decimal::new(100, 0));
    }
}
