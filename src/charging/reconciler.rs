//! Reconciler (spec.md §4.6; SPEC_FULL.md §3.9) — a single-leader background
//! scheduler that closes hung sessions, expires stale invoices, and marks
//! stations offline after a missed-heartbeat window. Grounded on the
//! teacher's `reservation_expiry.rs` (interval-tick task pattern) and
//! `heartbeat_monitor.rs` (status-transition sweep pattern), generalized
//! with leader election since those teacher tasks assumed a single process.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::charging::command_router::CommandRouter;
use crate::charging::commands::OutboundAction;
use crate::config::ReconcilerConfig;
use crate::domain::repositories::{
    ChargingSessionRepository, ClientRepository, InvoiceRepository, StationRepository, TariffRepository,
};
use crate::domain::{RepositoryProvider, StationStatus};
use crate::infrastructure::bus::SharedBus;
use crate::shared::shutdown::ShutdownSignal;

/// Invoice sweep cadence (spec.md §4.6). Not one of the §6-enumerated
/// config keys — only `invoice_expiry` (the TTL) is configurable, the sweep
/// interval itself is fixed.
const INVOICE_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Per-sweep deadline (spec.md §5): a sweep that overruns this is logged and
/// abandoned without releasing leadership early.
const SWEEP_DEADLINE: Duration = Duration::from_secs(5 * 60);

const LEADER_LOCK_KEY: &str = "reconciler-leader";

pub struct Reconciler {
    repos: Arc<dyn RepositoryProvider>,
    command_router: Arc<CommandRouter>,
    bus: SharedBus,
    default_tariff_price: Decimal,
    heartbeat_tolerance_secs: i64,
    config: ReconcilerConfig,
    node_id: String,
}

impl Reconciler {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        command_router: Arc<CommandRouter>,
        bus: SharedBus,
        default_tariff_price: Decimal,
        heartbeat_tolerance_secs: i64,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            repos,
            command_router,
            bus,
            default_tariff_price,
            heartbeat_tolerance_secs,
            config,
            node_id: Uuid::new_v4().to_string(),
        }
    }

    /// Runs both sweeps until `shutdown` fires. Leadership is acquired via a
    /// Cache/Bus lock with `2 × sweep-period` TTL, renewed each tick
    /// (spec.md §4.6); a process that fails to acquire it simply keeps
    /// retrying on the next tick rather than sweeping redundantly.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let hung_interval = Duration::from_secs(self.config.hung_session_check_interval as u64);
        let invoice_interval = Duration::from_secs(INVOICE_SWEEP_INTERVAL_SECS);

        let mut hung_ticker = tokio::time::interval(hung_interval);
        let mut invoice_ticker = tokio::time::interval(invoice_interval);
        hung_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        invoice_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(node_id = self.node_id.as_str(), "reconciler started");

        loop {
            tokio::select! {
                _ = hung_ticker.tick() => {
                    self.with_leadership(hung_interval, |this| Box::pin(this.run_hung_session_and_station_sweep())).await;
                }
                _ = invoice_ticker.tick() => {
                    self.with_leadership(invoice_interval, |this| Box::pin(this.run_invoice_sweep())).await;
                }
                _ = shutdown.notified().wait() => {
                    info!(node_id = self.node_id.as_str(), "reconciler shutting down");
                    break;
                }
            }
        }
    }

    async fn with_leadership<F>(&self, sweep_period: Duration, sweep: F)
    where
        F: for<'a> FnOnce(&'a Self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>>,
    {
        let Some(_guard) = self.bus.lock(LEADER_LOCK_KEY, &self.node_id, sweep_period * 2) else {
            return;
        };
        match tokio::time::timeout(SWEEP_DEADLINE, sweep(self)).await {
            Ok(()) => {}
            Err(_) => warn!(node_id = self.node_id.as_str(), "sweep exceeded its deadline, abandoning this tick"),
        }
    }

    async fn run_hung_session_and_station_sweep(&self) {
        if let Err(e) = self.expire_no_plug_sessions().await {
            warn!(error = %e, "hung-session (no-plug) sweep failed");
        }
        if let Err(e) = self.reap_runaway_sessions().await {
            warn!(error = %e, "hung-session (runaway) sweep failed");
        }
        if let Err(e) = self.mark_stale_stations_offline().await {
            warn!(error = %e, "stale-station sweep failed");
        }
    }

    /// Sessions stuck in `starting` with no `ocpp_tx_id` past the no-plug
    /// grace window: mark `expired`, refund in full, best-effort stop
    /// (spec.md §4.6, §8 scenario 3). Never touches a session already
    /// `stopped` and never debits — only credits — satisfying "reconciler
    /// safety" (spec.md §8).
    async fn expire_no_plug_sessions(&self) -> Result<(), crate::shared::errors::DomainError> {
        let now = Utc::now();
        let threshold = now - chrono::Duration::seconds(self.config.hung_session_no_tx_grace);
        let hung = self.repos.charging_sessions().find_starting_older_than(threshold).await?;
        if hung.is_empty() {
            return Ok(());
        }
        info!(count = hung.len(), "expiring no-plug sessions");

        for session in hung {
            let expired = self
                .repos
                .settle_expired_session(&session.id, &session.client_id, session.reserved_amount)
                .await?;
            if !expired {
                // Already moved on (e.g. StartTransaction raced in) — no refund, no touch.
                continue;
            }
            let _ = self.command_router.publish(
                &session.station_id,
                OutboundAction::RemoteStopTransaction {
                    transaction_id: session.ocpp_tx_id.unwrap_or(0),
                },
            );
            info!(session_id = %session.id, refunded = session.reserved_amount, "no-plug session expired and refunded");
        }
        Ok(())
    }

    /// Sessions `active` past the runaway cap: first sweep publishes a
    /// best-effort `RemoteStopTransaction` and lets the normal Stop flow
    /// terminate them; if a session is still `active` a full sweep period
    /// later, force-stop it using the last known meter reading (spec.md
    /// §4.6, §8 scenario per "reconciler safety").
    async fn reap_runaway_sessions(&self) -> Result<(), crate::shared::errors::DomainError> {
        let now = Utc::now();
        let runaway_threshold = now - chrono::Duration::seconds(self.config.hung_session_max_active);
        let stale_threshold =
            runaway_threshold - chrono::Duration::seconds(self.config.hung_session_check_interval);

        let running = self.repos.charging_sessions().find_active_older_than(runaway_threshold).await?;
        if running.is_empty() {
            return Ok(());
        }

        for session in running {
            if session.created_at <= stale_threshold {
                self.force_stop_session(&session, now).await?;
            } else if let Some(ocpp_tx_id) = session.ocpp_tx_id {
                warn!(session_id = %session.id, "runaway session past cap, requesting stop");
                let _ = self
                    .command_router
                    .publish(&session.station_id, OutboundAction::RemoteStopTransaction { transaction_id: ocpp_tx_id });
            }
        }
        Ok(())
    }

    async fn force_stop_session(
        &self,
        session: &crate::domain::ChargingSession,
        now: DateTime<Utc>,
    ) -> Result<(), crate::shared::errors::DomainError> {
        let last_reading = self.repos.charging_sessions().last_meter_reading(&session.id).await?;
        let refund_amount = match (last_reading, session.meter_start) {
            (Some(last_wh), Some(meter_start)) => {
                let price = self
                    .repos
                    .tariffs()
                    .effective_price(&session.station_id, now, self.default_tariff_price)
                    .await?;
                let energy_wh = (last_wh - meter_start).max(0);
                let energy_kwh = Decimal::new(energy_wh, 0) / Decimal::new(1000, 0);
                let computed_charge = (energy_kwh * price).ceil().to_string().parse::<i64>().unwrap_or(0);
                (session.reserved_amount - computed_charge.min(session.reserved_amount)).max(0)
            }
            _ => session.reserved_amount,
        };

        let force_stopped = self
            .repos
            .settle_failed_session(&session.id, &session.client_id, Some(refund_amount))
            .await?;
        if !force_stopped {
            return Ok(());
        }
        warn!(session_id = %session.id, refund_amount, "runaway session force-stopped past one sweep period");
        Ok(())
    }

    /// `top_ups` in `pending` past `expires_at`: set `expired`. Never
    /// touches an already-terminal invoice — approval stays monotonic even
    /// if the webhook lands after this sweep ran (spec.md §4.6, §8 scenario
    /// 5: "webhook after cleanup").
    async fn run_invoice_sweep(&self) {
        if let Err(e) = self.expire_invoices().await {
            warn!(error = %e, "invoice sweep failed");
        }
    }

    async fn expire_invoices(&self) -> Result<(), crate::shared::errors::DomainError> {
        let now = Utc::now();
        let expired = self.repos.invoices().find_expired_pending(now).await?;
        if expired.is_empty() {
            return Ok(());
        }
        info!(count = expired.len(), "expiring overdue top-up invoices");
        for invoice in expired {
            self.repos.invoices().mark_expired(&invoice.id).await?;
        }
        Ok(())
    }

    async fn mark_stale_stations_offline(&self) -> Result<(), crate::shared::errors::DomainError> {
        let threshold = Utc::now() - chrono::Duration::seconds(self.heartbeat_tolerance_secs);
        let stale = self.repos.stations().find_stale(threshold).await?;
        if stale.is_empty() {
            return Ok(());
        }
        info!(count = stale.len(), "marking stale stations offline");
        for station in stale {
            self.repos.stations().set_status(&station.id, StationStatus::Offline).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargingSession, LimitKind, SessionStatus};
    use crate::infrastructure::bus::InProcessBus;
    use crate::infrastructure::db::entities::client;
    use crate::infrastructure::db::{connect_and_migrate, repositories::repository_provider::SeaOrmRepositoryProvider};
    use sea_orm::{ActiveModelTrait, Set};

    async fn seed_client(db: &sea_orm::DatabaseConnection, id: &str, balance: i64) {
        client::ActiveModel {
            id: Set(id.to_owned()),
            balance: Set(balance),
            currency: Set("som".to_owned()),
        }
        .insert(db)
        .await
        .expect("seed client");
    }

    fn pending_session(id: &str, client_id: &str, reserved: i64, created_at: DateTime<Utc>) -> ChargingSession {
        ChargingSession {
            id: id.to_owned(),
            client_id: client_id.to_owned(),
            station_id: "CP1".to_owned(),
            connector_id: 1,
            limit_kind: LimitKind::Amount,
            limit_value: Decimal::new(reserved, 0),
            reserved_amount: reserved,
            id_tag: format!("sess-{id}"),
            ocpp_tx_id: None,
            meter_start: None,
            meter_stop: None,
            energy_delivered_wh: None,
            amount_charged: None,
            refund_amount: None,
            status: SessionStatus::Pending,
            created_at,
            started_at: None,
            stopped_at: None,
        }
    }

    fn test_config() -> ReconcilerConfig {
        ReconcilerConfig {
            hung_session_check_interval: 1800,
            hung_session_no_tx_grace: 600,
            hung_session_max_active: 43_200,
            invoice_expiry: 300,
        }
    }

    /// Scenario 3 (spec.md §8): a session stuck `starting` past the no-plug
    /// grace window is expired and refunded in full.
    #[tokio::test]
    async fn expires_no_plug_session_and_refunds_in_full() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        seed_client(&db, "client-1", 800).await;
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db));

        let now = Utc::now();
        let stuck_created_at = now - chrono::Duration::seconds(700);
        repos
            .charging_sessions()
            .insert_pending(pending_session("sess-1", "client-1", 200, stuck_created_at))
            .await
            .unwrap();
        repos.charging_sessions().mark_starting("sess-1").await.unwrap();

        let bus = InProcessBus::shared();
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let reconciler = Reconciler::new(
            repos.clone(),
            command_router,
            bus,
            Decimal::new(15, 0),
            630,
            test_config(),
        );

        reconciler.expire_no_plug_sessions().await.unwrap();

        let session = repos.charging_sessions().find_by_id("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Expired);
        let client = repos.clients().find_by_id("client-1").await.unwrap().unwrap();
        assert_eq!(client.balance, 1000, "full reservation restored");
    }

    /// "Reconciler safety" (spec.md §8): a session already `starting` but
    /// still within its grace window must not be touched.
    #[tokio::test]
    async fn leaves_fresh_starting_session_untouched() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        seed_client(&db, "client-1", 800).await;
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db));

        let now = Utc::now();
        repos
            .charging_sessions()
            .insert_pending(pending_session("sess-1", "client-1", 200, now))
            .await
            .unwrap();
        repos.charging_sessions().mark_starting("sess-1").await.unwrap();

        let bus = InProcessBus::shared();
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let reconciler = Reconciler::new(repos.clone(), command_router, bus, Decimal::new(15, 0), 630, test_config());

        reconciler.expire_no_plug_sessions().await.unwrap();

        let session = repos.charging_sessions().find_by_id("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Starting);
        let client = repos.clients().find_by_id("client-1").await.unwrap().unwrap();
        assert_eq!(client.balance, 800, "no refund — session wasn't touched");
    }

    /// Reconciler safety: the hung-session sweep must never refund a session
    /// already `stopped` nor debit the client.
    #[tokio::test]
    async fn never_touches_an_already_stopped_session() {
        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        seed_client(&db, "client-1", 1000).await;
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db));

        let now = Utc::now();
        let stuck_created_at = now - chrono::Duration::seconds(700);
        repos
            .charging_sessions()
            .insert_pending(pending_session("sess-1", "client-1", 200, stuck_created_at))
            .await
            .unwrap();
        repos.charging_sessions().mark_starting("sess-1").await.unwrap();
        repos
            .charging_sessions()
            .mark_active("sess-1", 1, 1000, stuck_created_at)
            .await
            .unwrap();
        repos
            .charging_sessions()
            .mark_stopped(
                "sess-1",
                crate::domain::repositories::StopOutcome {
                    meter_stop: 2000,
                    energy_delivered_wh: 1000,
                    amount_charged: 200,
                    refund_amount: 0,
                    stopped_at: now,
                },
            )
            .await
            .unwrap();

        let bus = InProcessBus::shared();
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let reconciler = Reconciler::new(repos.clone(), command_router, bus, Decimal::new(15, 0), 630, test_config());

        reconciler.expire_no_plug_sessions().await.unwrap();

        let session = repos.charging_sessions().find_by_id("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Stopped, "already-stopped session is untouched");
        let client = repos.clients().find_by_id("client-1").await.unwrap().unwrap();
        assert_eq!(client.balance, 1000, "no double refund on an already-settled session");
    }

    /// Scenario 5 (spec.md §8): an invoice is expired by the sweep but a
    /// later webhook approval must still be able to override it — the sweep
    /// itself never touches an invoice that is already terminal.
    #[tokio::test]
    async fn invoice_sweep_only_expires_overdue_pending_invoices() {
        use crate::domain::{Invoice, InvoiceStatus};

        let db = connect_and_migrate("sqlite::memory:").await.unwrap();
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db));

        let now = Utc::now();
        repos
            .invoices()
            .insert_pending(Invoice {
                id: "inv-1".to_owned(),
                client_id: "client-1".to_owned(),
                provider_order_id: "order-1".to_owned(),
                amount_requested: 500,
                amount_paid: None,
                status: InvoiceStatus::Pending,
                expires_at: now - chrono::Duration::seconds(120),
                idempotency_key: None,
                created_at: now - chrono::Duration::seconds(300),
                paid_at: None,
            })
            .await
            .unwrap();

        let bus = InProcessBus::shared();
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let reconciler = Reconciler::new(repos.clone(), command_router, bus, Decimal::new(15, 0), 630, test_config());

        reconciler.expire_invoices().await.unwrap();

        let invoice = repos.invoices().find_by_id("inv-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Expired);

        // A webhook arriving after the sweep still approves, overriding expiry.
        let applied = repos.invoices().approve("order-1", 500, now).await.unwrap();
        assert!(applied);
        let invoice = repos.invoices().find_by_id("inv-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);

        // Running the sweep again must not revert the now-approved invoice.
        reconciler.expire_invoices().await.unwrap();
        let invoice = repos.invoices().find_by_id("inv-1").await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved, "approval is terminal and monotonic");
    }
}
