//! Inbound OCPP 1.6 Action dispatch for one station (spec.md §4.2;
//! SPEC_FULL.md §3.6). Parses typed `rust_ocpp::v1_6` request structs the
//! way the teacher's `ocpp_v16_handler.rs`/`action_matcher` do, but routes
//! the resulting domain events into the Charging Lifecycle Engine instead of
//! the teacher's `ChargePointService`/`BillingService`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{BootNotificationRequest, BootNotificationResponse};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{StartTransactionRequest, StartTransactionResponse};
use rust_ocpp::v1_6::messages::status_notification::{StatusNotificationRequest, StatusNotificationResponse};
use rust_ocpp::v1_6::messages::stop_transaction::{StopTransactionRequest, StopTransactionResponse};
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, ChargePointStatus, DataTransferStatus, IdTagInfo, Measurand, RegistrationStatus,
    UnitOfMeasure,
};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::charging::{ChargingLifecycleEngine, OcppCallError, StationConnection};
use crate::domain::repositories::{ChargingSessionRepository, StationRepository};
use crate::domain::{ConnectorStatus, OcppMeterSample, RepositoryProvider, StationStatus};
use crate::shared::errors::DomainError;
use crate::shared::ocpp_frame::OcppFrame;

static NEXT_TX_ID: std::sync::atomic::AtomicI64 = std::sync::atomic::AtomicI64::new(1);

fn next_transaction_id() -> i64 {
    NEXT_TX_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// What the caller (the WS recv loop) should do with a raw inbound message.
pub enum InboundOutcome {
    /// Send this serialized frame back to the station.
    Reply(String),
    /// A CallResult/CallError for an outbound Call we sent; routed
    /// internally to `StationConnection`, nothing to send.
    NoReply,
    /// The frame didn't parse as OCPP-J at all.
    Malformed,
}

fn domain_error_to_call_error(e: &DomainError) -> OcppCallError {
    let code = match e {
        DomainError::InvalidArgument(_) => "FormationViolation",
        DomainError::NotFound { .. } => "GenericError",
        DomainError::Internal(_) => "InternalError",
        _ => "GenericError",
    };
    OcppCallError {
        code: code.to_owned(),
        description: e.to_string(),
    }
}

/// Three consecutive rejected BootNotifications close the socket (spec.md §4.2).
const MAX_CONSECUTIVE_BOOT_REJECTS: u32 = 3;

/// Owns the domain-facing side of one station's connection: dispatches
/// inbound Calls to the Charging Lifecycle Engine and the Data-Access
/// Gateway, and routes inbound CallResult/CallError frames to the
/// connection's pending-call table.
///
/// Tracks the Connecting → Booted → Operational state spec.md §4.2
/// describes: `booted` flips on the first accepted BootNotification,
/// `operational` on the first non-Boot Call or Heartbeat after that.
/// Neither gate actually rejects calls received out of order (the teacher's
/// OCPP handler doesn't either) — they exist to drive the boot-reject
/// counter and the eventual socket close.
pub struct SessionHandler {
    station_id: String,
    repos: Arc<dyn RepositoryProvider>,
    lifecycle: Arc<ChargingLifecycleEngine>,
    connection: Arc<StationConnection>,
    boot_accept: bool,
    heartbeat_interval: i64,
    booted: AtomicBool,
    operational: AtomicBool,
    consecutive_boot_rejects: AtomicU32,
    close_requested: AtomicBool,
}

impl SessionHandler {
    pub fn new(
        station_id: String,
        repos: Arc<dyn RepositoryProvider>,
        lifecycle: Arc<ChargingLifecycleEngine>,
        connection: Arc<StationConnection>,
        boot_accept: bool,
        heartbeat_interval: i64,
    ) -> Self {
        Self {
            station_id,
            repos,
            lifecycle,
            connection,
            boot_accept,
            heartbeat_interval,
            booted: AtomicBool::new(false),
            operational: AtomicBool::new(false),
            consecutive_boot_rejects: AtomicU32::new(0),
            close_requested: AtomicBool::new(false),
        }
    }

    /// Set once three consecutive BootNotifications have been rejected; the
    /// WS recv loop checks this after every `Reply` and closes the socket.
    pub fn should_close(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    pub async fn handle(&self, text: &str) -> InboundOutcome {
        let frame = match OcppFrame::parse(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(station_id = self.station_id.as_str(), error = %e, "malformed OCPP frame");
                return InboundOutcome::Malformed;
            }
        };

        match frame {
            OcppFrame::Call { unique_id, action, payload } => {
                let reply = match self.dispatch(&action, payload).await {
                    Ok(response_payload) => OcppFrame::CallResult {
                        unique_id,
                        payload: response_payload,
                    },
                    Err(call_error) => OcppFrame::error_response(
                        unique_id,
                        call_error.code,
                        call_error.description,
                    ),
                };
                InboundOutcome::Reply(reply.serialize())
            }
            OcppFrame::CallResult { unique_id, payload } => {
                self.connection.on_call_result(&unique_id, payload);
                InboundOutcome::NoReply
            }
            OcppFrame::CallError { unique_id, error_code, error_description, .. } => {
                self.connection.on_call_error(&unique_id, error_code, error_description);
                InboundOutcome::NoReply
            }
        }
    }

    async fn dispatch(&self, action: &str, payload: Value) -> Result<Value, OcppCallError> {
        // Booted → Operational: any non-Boot Call, or the first Heartbeat (spec.md §4.2).
        if action != "BootNotification" && !self.operational.swap(true, Ordering::SeqCst) {
            info!(
                station_id = self.station_id.as_str(),
                booted = self.booted.load(Ordering::SeqCst),
                "station entered Operational state"
            );
        }
        match action {
            "BootNotification" => self.handle_boot_notification(payload).await,
            "Heartbeat" => Ok(self.handle_heartbeat().await),
            "StatusNotification" => self.handle_status_notification(payload).await,
            "Authorize" => self.handle_authorize(payload).await,
            "StartTransaction" => self.handle_start_transaction(payload).await,
            "StopTransaction" => self.handle_stop_transaction(payload).await,
            "MeterValues" => self.handle_meter_values(payload).await,
            "DataTransfer" => self.handle_data_transfer(payload).await,
            "FirmwareStatusNotification" => Ok(self.handle_firmware_status_notification(payload)),
            "DiagnosticsStatusNotification" => Ok(self.handle_diagnostics_status_notification(payload)),
            other => {
                warn!(station_id = self.station_id.as_str(), action = other, "unsupported OCPP action");
                Err(OcppCallError {
                    code: "NotImplemented".to_owned(),
                    description: format!("action {other} is not supported"),
                })
            }
        }
    }

    fn parse_req<T: serde::de::DeserializeOwned>(&self, action: &str, payload: Value) -> Result<T, OcppCallError> {
        serde_json::from_value(payload).map_err(|e| {
            error!(station_id = self.station_id.as_str(), action, error = %e, "failed to parse request");
            OcppCallError {
                code: "FormationViolation".to_owned(),
                description: format!("{action}: {e}"),
            }
        })
    }

    async fn handle_boot_notification(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: BootNotificationRequest = self.parse_req("BootNotification", payload.clone())?;
        info!(
            station_id = self.station_id.as_str(),
            vendor = req.charge_point_vendor.as_str(),
            model = req.charge_point_model.as_str(),
            "BootNotification"
        );

        let status = if self.boot_accept {
            StationStatus::Available
        } else {
            StationStatus::Unavailable
        };
        self.repos
            .stations()
            .upsert_boot(&self.station_id, payload, status)
            .await
            .map_err(|e| domain_error_to_call_error(&e))?;

        let registration_status = if self.boot_accept {
            self.booted.store(true, Ordering::SeqCst);
            self.consecutive_boot_rejects.store(0, Ordering::SeqCst);
            RegistrationStatus::Accepted
        } else {
            let rejects = self.consecutive_boot_rejects.fetch_add(1, Ordering::SeqCst) + 1;
            if rejects >= MAX_CONSECUTIVE_BOOT_REJECTS {
                warn!(
                    station_id = self.station_id.as_str(),
                    rejects, "closing socket after repeated BootNotification rejects"
                );
                self.close_requested.store(true, Ordering::SeqCst);
            }
            RegistrationStatus::Rejected
        };
        let response = BootNotificationResponse {
            current_time: Utc::now(),
            interval: self.heartbeat_interval as i32,
            status: registration_status,
        };
        Ok(serde_json::to_value(&response).unwrap_or_default())
    }

    async fn handle_heartbeat(&self) -> Value {
        let now = Utc::now();
        if let Err(e) = self.repos.stations().touch_heartbeat(&self.station_id, now).await {
            warn!(station_id = self.station_id.as_str(), error = %e, "failed to record heartbeat");
        }
        serde_json::to_value(&HeartbeatResponse { current_time: now }).unwrap_or_default()
    }

    async fn handle_status_notification(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: StatusNotificationRequest = self.parse_req("StatusNotification", payload)?;
        info!(
            station_id = self.station_id.as_str(),
            connector_id = req.connector_id,
            status = ?req.status,
            "StatusNotification"
        );

        let connector_id = req.connector_id as i32;
        let connector_status = match req.status {
            ChargePointStatus::Available => ConnectorStatus::Available,
            ChargePointStatus::Preparing
            | ChargePointStatus::Charging
            | ChargePointStatus::SuspendedEV
            | ChargePointStatus::SuspendedEVSE
            | ChargePointStatus::Finishing => ConnectorStatus::Occupied,
            ChargePointStatus::Reserved => ConnectorStatus::Reserved,
            ChargePointStatus::Unavailable => ConnectorStatus::Unavailable,
            ChargePointStatus::Faulted => ConnectorStatus::Faulted,
        };

        if connector_id == 0 {
            let station_status = match connector_status {
                ConnectorStatus::Faulted => StationStatus::Faulted,
                ConnectorStatus::Unavailable => StationStatus::Unavailable,
                _ => StationStatus::Available,
            };
            self.repos
                .stations()
                .set_status(&self.station_id, station_status)
                .await
                .map_err(|e| domain_error_to_call_error(&e))?;
        } else if connector_status == ConnectorStatus::Faulted {
            self.lifecycle
                .on_connector_faulted(&self.station_id, connector_id)
                .await
                .map_err(|e| domain_error_to_call_error(&e))?;
        } else {
            self.repos
                .connectors()
                .upsert_status(&self.station_id, connector_id, connector_status)
                .await
                .map_err(|e| domain_error_to_call_error(&e))?;
        }

        Ok(serde_json::to_value(&StatusNotificationResponse {}).unwrap_or_default())
    }

    async fn handle_authorize(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: AuthorizeRequest = self.parse_req("Authorize", payload)?;
        info!(station_id = self.station_id.as_str(), id_tag = req.id_tag.as_str(), "Authorize");

        let session = self
            .repos
            .charging_sessions()
            .find_by_id_tag(&req.id_tag)
            .await
            .map_err(|e| domain_error_to_call_error(&e))?;

        let client = match &session {
            Some(session) => self
                .repos
                .clients()
                .find_by_id(&session.client_id)
                .await
                .map_err(|e| domain_error_to_call_error(&e))?,
            None => None,
        };

        // spec.md §4.2: idTag maps to a client with balance > 0, else Blocked.
        let status = match client {
            Some(client) if client.balance > 0 => AuthorizationStatus::Accepted,
            Some(_) => AuthorizationStatus::Blocked,
            None => AuthorizationStatus::Invalid,
        };
        let response = AuthorizeResponse {
            id_tag_info: IdTagInfo {
                status,
                expiry_date: None,
                parent_id_tag: None,
            },
        };
        Ok(serde_json::to_value(&response).unwrap_or_default())
    }

    async fn handle_start_transaction(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: StartTransactionRequest = self.parse_req("StartTransaction", payload)?;
        info!(
            station_id = self.station_id.as_str(),
            connector_id = req.connector_id,
            id_tag = req.id_tag.as_str(),
            meter_start = req.meter_start,
            "StartTransaction"
        );

        let tx_id = next_transaction_id();
        let bound = self
            .lifecycle
            .on_start_transaction(&req.id_tag, tx_id, req.meter_start as i64, req.timestamp)
            .await
            .map_err(|e| domain_error_to_call_error(&e))?;

        let response = match bound {
            Some(_) => StartTransactionResponse {
                transaction_id: tx_id as i32,
                id_tag_info: IdTagInfo {
                    status: AuthorizationStatus::Accepted,
                    expiry_date: None,
                    parent_id_tag: None,
                },
            },
            None => {
                warn!(
                    station_id = self.station_id.as_str(),
                    id_tag = req.id_tag.as_str(),
                    "StartTransaction for unknown or already-bound id_tag"
                );
                StartTransactionResponse {
                    transaction_id: 0,
                    id_tag_info: IdTagInfo {
                        status: AuthorizationStatus::Invalid,
                        expiry_date: None,
                        parent_id_tag: None,
                    },
                }
            }
        };
        Ok(serde_json::to_value(&response).unwrap_or_default())
    }

    async fn handle_meter_values(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: MeterValuesRequest = self.parse_req("MeterValues", payload)?;
        info!(
            station_id = self.station_id.as_str(),
            connector_id = req.connector_id,
            transaction_id = ?req.transaction_id,
            samples = req.meter_value.len(),
            "MeterValues"
        );

        for meter_value in &req.meter_value {
            for sampled in &meter_value.sampled_value {
                let Ok(value) = sampled.value.parse::<f64>() else {
                    continue;
                };
                let measurand = sampled.measurand.clone().unwrap_or(Measurand::EnergyActiveImportRegister);
                if !matches!(measurand, Measurand::EnergyActiveImportRegister) {
                    continue;
                }
                let meter_wh = match sampled.unit.as_ref() {
                    Some(UnitOfMeasure::KWh) => (value * 1000.0).round() as i64,
                    _ => value.round() as i64,
                };

                let session_id = if let Some(tx_id) = req.transaction_id {
                    self.repos
                        .charging_sessions()
                        .find_by_ocpp_tx_id(&self.station_id, tx_id as i64)
                        .await
                        .map_err(|e| domain_error_to_call_error(&e))?
                        .map(|s| s.id)
                } else {
                    None
                };
                if let Some(session_id) = session_id {
                    let sample = OcppMeterSample {
                        session_id,
                        timestamp: meter_value.timestamp,
                        meter_wh,
                        measurand: "EnergyActiveImportRegister".to_owned(),
                        unit: "Wh".to_owned(),
                    };
                    self.repos
                        .meter_samples()
                        .append(sample)
                        .await
                        .map_err(|e| domain_error_to_call_error(&e))?;
                }

                if let Some(tx_id) = req.transaction_id {
                    self.lifecycle
                        .on_meter_values(&self.station_id, tx_id as i64, meter_wh, meter_value.timestamp)
                        .await
                        .map_err(|e| domain_error_to_call_error(&e))?;
                }
            }
        }

        Ok(serde_json::to_value(&MeterValuesResponse {}).unwrap_or_default())
    }

    async fn handle_stop_transaction(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: StopTransactionRequest = self.parse_req("StopTransaction", payload)?;
        info!(
            station_id = self.station_id.as_str(),
            transaction_id = req.transaction_id,
            meter_stop = req.meter_stop,
            "StopTransaction"
        );

        let session = self
            .lifecycle
            .on_stop_transaction(&self.station_id, req.transaction_id as i64, req.meter_stop as i64, req.timestamp)
            .await
            .map_err(|e| domain_error_to_call_error(&e))?;

        let response = StopTransactionResponse {
            id_tag_info: session.map(|_| IdTagInfo {
                status: AuthorizationStatus::Accepted,
                expiry_date: None,
                parent_id_tag: None,
            }),
        };
        Ok(serde_json::to_value(&response).unwrap_or_default())
    }

    async fn handle_data_transfer(&self, payload: Value) -> Result<Value, OcppCallError> {
        let req: DataTransferRequest = self.parse_req("DataTransfer", payload)?;
        info!(
            station_id = self.station_id.as_str(),
            vendor_id = req.vendor_string.as_str(),
            message_id = ?req.message_id,
            "DataTransfer"
        );
        // No vendor extensions are implemented; acknowledge without acting on it.
        let response = DataTransferResponse {
            status: DataTransferStatus::Accepted,
            data: None,
        };
        Ok(serde_json::to_value(&response).unwrap_or_default())
    }

    fn handle_firmware_status_notification(&self, payload: Value) -> Value {
        match serde_json::from_value::<FirmwareStatusNotificationRequest>(payload) {
            Ok(req) => {
                info!(station_id = self.station_id.as_str(), status = ?req.status, "FirmwareStatusNotification")
            }
            Err(e) => error!(station_id = self.station_id.as_str(), error = %e, "failed to parse FirmwareStatusNotification"),
        }
        serde_json::to_value(&FirmwareStatusNotificationResponse {}).unwrap_or_default()
    }

    fn handle_diagnostics_status_notification(&self, payload: Value) -> Value {
        match serde_json::from_value::<DiagnosticsStatusNotificationRequest>(payload) {
            Ok(req) => {
                info!(station_id = self.station_id.as_str(), status = ?req.status, "DiagnosticsStatusNotification")
            }
            Err(e) => error!(station_id = self.station_id.as_str(), error = %e, "failed to parse DiagnosticsStatusNotification"),
        }
        serde_json::to_value(&DiagnosticsStatusNotificationResponse {}).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charging::command_router::CommandRouter;
    use crate::charging::registry::StationRegistry;
    use crate::infrastructure::bus::InProcessBus;
    use crate::infrastructure::db::entities::client;
    use crate::infrastructure::db::{connect_and_migrate, repositories::repository_provider::SeaOrmRepositoryProvider};
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, Set};
    use serde_json::json;

    async fn test_handler(repos: Arc<dyn RepositoryProvider>, boot_accept: bool) -> SessionHandler {
        let bus = InProcessBus::shared();
        let registry = Arc::new(StationRegistry::new(bus.clone()));
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let lifecycle = Arc::new(ChargingLifecycleEngine::new(
            repos.clone(),
            registry,
            command_router,
            bus,
            Decimal::new(15, 0),
        ));
        let (write_tx, _write_rx) = tokio::sync::mpsc::channel(8);
        let connection = Arc::new(StationConnection::new(write_tx, std::time::Duration::from_secs(30)));
        SessionHandler::new("CP1".to_owned(), repos, lifecycle, connection, boot_accept, 300)
    }

    async fn seeded_repos() -> Arc<dyn RepositoryProvider> {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        client::ActiveModel {
            id: Set("client-1".to_owned()),
            balance: Set(1000),
            currency: Set("som".to_owned()),
        }
        .insert(&db)
        .await
        .unwrap();
        Arc::new(SeaOrmRepositoryProvider::new(db))
    }

    fn boot_frame(unique_id: &str) -> String {
        format!(
            r#"[2,"{unique_id}","BootNotification",{{"chargePointVendor":"Acme","chargePointModel":"X1"}}]"#
        )
    }

    #[tokio::test]
    async fn boot_notification_accepted_returns_heartbeat_interval() {
        let handler = test_handler(seeded_repos().await, true).await;
        let InboundOutcome::Reply(reply) = handler.handle(&boot_frame("1")).await else {
            panic!("expected a reply");
        };
        let frame = OcppFrame::parse(&reply).unwrap();
        let OcppFrame::CallResult { payload, .. } = frame else {
            panic!("expected a CallResult");
        };
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 300);
        assert!(!handler.should_close());
    }

    /// Three consecutive rejected BootNotifications close the socket
    /// (spec.md §4.2).
    #[tokio::test]
    async fn three_rejected_boots_close_the_socket() {
        let handler = test_handler(seeded_repos().await, false).await;
        for i in 1..=3 {
            let InboundOutcome::Reply(reply) = handler.handle(&boot_frame(&i.to_string())).await else {
                panic!("expected a reply");
            };
            let frame = OcppFrame::parse(&reply).unwrap();
            let OcppFrame::CallResult { payload, .. } = frame else {
                panic!("expected a CallResult");
            };
            assert_eq!(payload["status"], "Rejected");
        }
        assert!(handler.should_close());
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_without_a_reply() {
        let handler = test_handler(seeded_repos().await, true).await;
        assert!(matches!(handler.handle("not json at all").await, InboundOutcome::Malformed));
    }

    #[tokio::test]
    async fn unknown_action_returns_call_error_without_closing() {
        let handler = test_handler(seeded_repos().await, true).await;
        let frame = r#"[2,"1","SomeVendorAction",{}]"#;
        let InboundOutcome::Reply(reply) = handler.handle(frame).await else {
            panic!("expected a reply");
        };
        let parsed = OcppFrame::parse(&reply).unwrap();
        assert!(parsed.is_call_error());
        assert!(!handler.should_close());
    }

    #[tokio::test]
    async fn authorize_accepts_client_with_positive_balance() {
        let repos = seeded_repos().await;
        let handler = test_handler(repos.clone(), true).await;

        // Reserve a session so the idTag exists and is bound to client-1.
        let bus = InProcessBus::shared();
        let registry = Arc::new(StationRegistry::new(bus.clone()));
        bus.mark_connected("CP1", std::time::Duration::from_secs(600));
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let _rx = command_router.subscribe("CP1");
        let lifecycle = ChargingLifecycleEngine::new(
            repos.clone(),
            registry,
            command_router,
            bus,
            Decimal::new(15, 0),
        );
        let session_id = lifecycle
            .start_charge("client-1", "CP1", 1, crate::domain::LimitKind::Amount, Decimal::new(100, 0))
            .await
            .unwrap();
        let session = repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();

        let frame = format!(r#"[2,"1","Authorize",{{"idTag":"{}"}}]"#, session.id_tag);
        let InboundOutcome::Reply(reply) = handler.handle(&frame).await else {
            panic!("expected a reply");
        };
        let parsed = OcppFrame::parse(&reply).unwrap();
        let OcppFrame::CallResult { payload, .. } = parsed else {
            panic!("expected a CallResult");
        };
        assert_eq!(payload["idTagInfo"]["status"], "Accepted");
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_id_tag_as_invalid() {
        let handler = test_handler(seeded_repos().await, true).await;
        let frame = json!([2, "1", "Authorize", {"idTag": "does-not-exist"}]).to_string();
        let InboundOutcome::Reply(reply) = handler.handle(&frame).await else {
            panic!("expected a reply");
        };
        let parsed = OcppFrame::parse(&reply).unwrap();
        let OcppFrame::CallResult { payload, .. } = parsed else {
            panic!("expected a CallResult");
        };
        assert_eq!(payload["idTagInfo"]["status"], "Invalid");
    }
}
