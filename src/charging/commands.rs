//! Outbound OCPP 1.6 actions the control plane may issue to a station
//! (spec.md §6), and the envelope the Command Router pushes over the Bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutboundAction {
    RemoteStartTransaction { connector_id: i32, id_tag: String },
    RemoteStopTransaction { transaction_id: i64 },
    Reset { reset_type: String },
    ChangeConfiguration { key: String, value: String },
    GetConfiguration { keys: Option<Vec<String>> },
    TriggerMessage { requested_message: String, connector_id: Option<i32> },
    ReserveNow {
        connector_id: i32,
        expiry_date: DateTime<Utc>,
        id_tag: String,
        reservation_id: i32,
    },
    CancelReservation { reservation_id: i32 },
}

impl OutboundAction {
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::RemoteStartTransaction { .. } => "RemoteStartTransaction",
            Self::RemoteStopTransaction { .. } => "RemoteStopTransaction",
            Self::Reset { .. } => "Reset",
            Self::ChangeConfiguration { .. } => "ChangeConfiguration",
            Self::GetConfiguration { .. } => "GetConfiguration",
            Self::TriggerMessage { .. } => "TriggerMessage",
            Self::ReserveNow { .. } => "ReserveNow",
            Self::CancelReservation { .. } => "CancelReservation",
        }
    }

    /// OCPP 1.6 camelCase payload for this action.
    pub fn payload(&self) -> Value {
        match self {
            Self::RemoteStartTransaction { connector_id, id_tag } => json!({
                "connectorId": connector_id,
                "idTag": id_tag,
            }),
            Self::RemoteStopTransaction { transaction_id } => json!({
                "transactionId": transaction_id,
            }),
            Self::Reset { reset_type } => json!({ "type": reset_type }),
            Self::ChangeConfiguration { key, value } => json!({
                "key": key,
                "value": value,
            }),
            Self::GetConfiguration { keys } => json!({ "key": keys }),
            Self::TriggerMessage { requested_message, connector_id } => json!({
                "requestedMessage": requested_message,
                "connectorId": connector_id,
            }),
            Self::ReserveNow { connector_id, expiry_date, id_tag, reservation_id } => json!({
                "connectorId": connector_id,
                "expiryDate": expiry_date.to_rfc3339(),
                "idTag": id_tag,
                "reservationId": reservation_id,
            }),
            Self::CancelReservation { reservation_id } => json!({
                "reservationId": reservation_id,
            }),
        }
    }
}

/// Envelope carried over the Cache/Bus topic `commands:{station_id}`
/// (spec.md §4.4): a monotonically increasing nonce lets the Session Handler
/// deduplicate at-least-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedCommand {
    pub nonce: u64,
    pub station_id: String,
    pub action: OutboundAction,
}
